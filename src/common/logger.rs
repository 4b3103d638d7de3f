use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::configs::Config;

/// Installs the global tracing subscriber once at process start. Level and
/// per-target filters come from config, falling back to `info` with the
/// library's own module noisy at `debug` only when explicitly requested.
pub fn init(config: &Config) {
    let level = config
        .logging
        .as_ref()
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");

    let filters = config
        .logging
        .as_ref()
        .and_then(|l| l.filters.as_deref())
        .unwrap_or("");

    let filter_str = if filters.is_empty() {
        level.to_string()
    } else {
        format!("{level},{filters}")
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_str));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true));

    if registry.try_init().is_err() {
        // A subscriber was already installed (e.g. by an embedding caller or
        // a previous test in the same process) — leave it in place.
    }
}
