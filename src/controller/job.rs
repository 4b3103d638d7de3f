use tokio_util::sync::CancellationToken;

use crate::common::JobId;
use crate::configs::FetchConfig;

/// Controller-level aggregate (§3): everything one download needs, owned
/// for its whole lifetime by the controller that runs it.
pub struct DownloadJob {
    pub id: JobId,
    pub source_url: String,
    pub output_name: String,
    pub output_dir: String,
    pub cancel_token: CancellationToken,
    pub settings: FetchConfig,
    /// When set, a large-regime (spilled) output is split into
    /// `settings.part_size_bytes`-sized, TS-packet-aligned parts (§4.G)
    /// instead of being streamed into one file.
    pub part_mode: bool,
}

impl DownloadJob {
    pub fn new(source_url: impl Into<String>, output_name: impl Into<String>, output_dir: impl Into<String>, settings: FetchConfig) -> Self {
        Self {
            id: JobId::generate(),
            source_url: source_url.into(),
            output_name: output_name.into(),
            output_dir: output_dir.into(),
            cancel_token: CancellationToken::new(),
            settings,
            part_mode: false,
        }
    }

    pub fn with_part_mode(mut self, part_mode: bool) -> Self {
        self.part_mode = part_mode;
        self
    }
}
