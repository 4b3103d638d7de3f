pub mod parser;
pub mod resolver;
pub mod types;
pub mod url;

pub use parser::parse_m3u8;
pub use resolver::resolve_playlist;
pub use types::{Playlist, SegmentRef, Variant};

use thiserror::Error;

/// Errors raised by the parser (component A) and resolver (component C).
/// These are internal to the playlist module; the controller wraps them
/// into `DownloadError::NetworkPlaylist` (§7) at the component boundary.
#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("playlist document is empty")]
    Empty,

    #[error("media playlist contained no segments")]
    NoSegments,

    #[error("master playlist contained no variants")]
    NoVariants,

    #[error("failed to fetch playlist {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("playlist fetch returned status {status} for {url}")]
    BadStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("no playable media could be resolved from {0}")]
    NoPlayableMedia(String),

    #[error("rejected byte-range URL: {0}")]
    ByteRangeUrl(String),
}

pub type PlaylistResult<T> = std::result::Result<T, PlaylistError>;
