use thiserror::Error;

/// Terminal error kinds surfaced to the caller (§7). Each wraps a
/// human-readable message; a few carry the structured field a caller is
/// most likely to want to match on.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("could not fetch or parse playlist: {0}")]
    NetworkPlaylist(String),

    #[error("playlist parsed but contained no segments")]
    NoSegments,

    #[error("fetch floor violated: {message} (max_consecutive_missing={max_consecutive_missing})")]
    FetchFloor {
        message: String,
        max_consecutive_missing: usize,
    },

    #[error("output format invalid: {0}")]
    FormatInvalid(String),

    #[error("sink failed to commit output: {0}")]
    SinkFailure(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("fetch phase exceeded the {0:?} soft ceiling")]
    StallTimeout(std::time::Duration),

    #[error("rejected: {0}")]
    Concurrency(String),
}

impl DownloadError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NetworkPlaylist(_) => "NetworkPlaylist",
            Self::NoSegments => "NoSegments",
            Self::FetchFloor { .. } => "FetchFloor",
            Self::FormatInvalid(_) => "FormatInvalid",
            Self::SinkFailure(_) => "SinkFailure",
            Self::Cancelled => "Cancelled",
            Self::StallTimeout(_) => "StallTimeout",
            Self::Concurrency(_) => "Concurrency",
        }
    }
}

pub type DownloadResult<T> = std::result::Result<T, DownloadError>;
