use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::common::DownloadError;
use crate::sink::{OutputSink, SinkState};

/// A file writer backing the Output Sink Adapter contract: bytes are
/// written to a `.part` temp file in the output directory and only renamed
/// to the visible filename on commit, so a crash or abort never leaves a
/// partially-written file at the final path.
pub struct FileSink {
    pub(crate) dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

pub struct FileSinkHandle {
    file: tokio::fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    state: SinkState,
}

#[async_trait]
impl OutputSink for FileSink {
    type Handle = FileSinkHandle;

    async fn begin(
        &self,
        output_name: &str,
        _expected_size: Option<u64>,
    ) -> Result<Self::Handle, DownloadError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DownloadError::SinkFailure(e.to_string()))?;

        let final_path = self.dir.join(output_name);
        let temp_path = self.dir.join(format!("{output_name}.part"));

        let file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| DownloadError::SinkFailure(e.to_string()))?;

        Ok(FileSinkHandle {
            file,
            temp_path,
            final_path,
            state: SinkState::Writing,
        })
    }

    async fn write(&self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), DownloadError> {
        debug_assert_eq!(handle.state, SinkState::Writing);
        handle
            .file
            .write_all(bytes)
            .await
            .map_err(|e| DownloadError::SinkFailure(e.to_string()))
    }

    async fn commit(&self, mut handle: Self::Handle) -> Result<(), DownloadError> {
        handle.state = SinkState::Committing;
        handle
            .file
            .flush()
            .await
            .map_err(|e| DownloadError::SinkFailure(e.to_string()))?;
        drop(handle.file);

        tokio::fs::rename(&handle.temp_path, &handle.final_path)
            .await
            .map_err(|e| DownloadError::SinkFailure(e.to_string()))?;

        handle.state = SinkState::Idle;
        Ok(())
    }

    async fn abort(&self, mut handle: Self::Handle) {
        handle.state = SinkState::Aborting;
        drop(handle.file);
        if let Err(e) = tokio::fs::remove_file(&handle.temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %handle.temp_path.display(), error = %e, "failed to clean up aborted sink temp file");
            }
        }
        handle.state = SinkState::Idle;
    }
}
