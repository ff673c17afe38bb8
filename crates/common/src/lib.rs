//! Shared building blocks: exchange environment selection, bounded retry
//! policy, and process-wide logging setup.

mod backoff;
mod environment;
mod logging;

pub use backoff::RetryPolicy;
pub use environment::{FuturesEnvironment, ParseEnvironmentError};
pub use logging::{init_logging, LogConfig};
