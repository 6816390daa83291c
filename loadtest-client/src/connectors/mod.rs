mod http;
mod https;

pub use self::http::TracingConnector;
pub use self::https::{default_tls_config, TracingHttpsConnector};
