mod report;
mod statistics;

pub use self::report::{OutputFormat, RequestReport};
pub use self::statistics::DispatchSummary;
