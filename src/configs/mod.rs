pub mod base;
pub mod fetch;
pub mod logging;

pub use base::{Config, OutputConfig};
pub use fetch::FetchConfig;
pub use logging::LoggingConfig;
