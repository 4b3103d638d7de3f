use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::AnyResult;
use crate::configs::{FetchConfig, LoggingConfig};

/// Top-level configuration, loaded from `config.toml` if present and
/// layered over built-in defaults. Every section is optional in the file;
/// omitted sections fall back to `Default::default()`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory new jobs write their output under, unless a job overrides it.
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
        }
    }
}

impl Config {
    /// Loads `config.toml` from the current directory if it exists, else
    /// returns built-in defaults. A present-but-malformed file is an error.
    pub fn load() -> AnyResult<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> AnyResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }
}
