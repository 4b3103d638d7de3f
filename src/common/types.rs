use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

/// A thread-safe, mutually exclusive shared component.
pub type Shared<T> = Arc<Mutex<T>>;

/// A thread-safe, read-write shared component.
pub type SharedRw<T> = Arc<RwLock<T>>;

/// A generic boxed error type, used only at the outermost edges (config, CLI).
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// Opaque job identifier used to correlate a download across the controller,
/// the job registry, and the progress/blob-store collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::ops::Deref for JobId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container/format hint computed once by the playlist parser and consulted
/// by every downstream component instead of re-sniffing URLs or bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FormatHint {
    Ts,
    Fmp4,
    Unknown,
}

impl FormatHint {
    pub fn as_ext(&self) -> &'static str {
        match self {
            Self::Ts => "ts",
            Self::Fmp4 => "mp4",
            Self::Unknown => "bin",
        }
    }
}
