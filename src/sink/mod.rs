pub mod file;

pub use file::FileSink;

use async_trait::async_trait;

use crate::common::DownloadError;

/// State machine enforced by every handle: `Idle -> Writing -> (Committing |
/// Aborting) -> Idle` (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Idle,
    Writing,
    Committing,
    Aborting,
}

/// Contract over "write these bytes to this filename on disk" (§4.H).
/// Implementations may back this with a direct file writer, a streaming
/// HTTP sink, or a host-runtime blob handoff; all must guarantee
/// commit-or-abort atomicity from the caller's viewpoint — the visible
/// output exists iff `commit` returned `Ok`.
#[async_trait]
pub trait OutputSink: Send + Sync {
    type Handle: Send;

    async fn begin(&self, output_name: &str, expected_size: Option<u64>) -> Result<Self::Handle, DownloadError>;
    async fn write(&self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), DownloadError>;
    async fn commit(&self, handle: Self::Handle) -> Result<(), DownloadError>;
    async fn abort(&self, handle: Self::Handle);
}
