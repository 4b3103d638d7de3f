pub mod assemble;
pub mod common;
pub mod configs;
pub mod controller;
pub mod fetch;
pub mod playlist;
pub mod progress;
pub mod sink;
pub mod validate;

#[cfg(test)]
pub mod testutil;

#[cfg(test)]
mod scenario_tests;

pub use common::{AnyError, AnyResult, DownloadError, DownloadResult, FormatHint, JobId};
pub use controller::{DownloadJob, JobOutcome, JobRegistry, PipelineController};
