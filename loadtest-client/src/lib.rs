pub mod client;
pub mod connectors;
pub mod dns;
pub mod events;

pub use crate::client::{ClientError, Completed, HttpTransport, Transport};
pub use crate::events::{Event, EventCollector, EventSet};
use std::future::Future;
use std::pin::Pin;
pub type FutureResponse<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;
