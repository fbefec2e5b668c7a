//! Tracing subscriber installation.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

const FALLBACK_DIRECTIVE: &str = "info";

/// Installs a subscriber once per process, honouring `RUST_LOG` and falling
/// back to `default_level`. Later calls are no-ops.
pub fn install_tracing_subscriber(default_level: &str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), default_level);
        if fmt().with_env_filter(filter).with_target(true).try_init().is_err() {
            tracing::debug!("global subscriber already set; keeping it");
        }
    });
}

/// Filter from `env` when it parses, else `default_level`, else `info`.
fn log_filter(env: Option<&str>, default_level: &str) -> EnvFilter {
    env.and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_new(default_level).ok())
        .unwrap_or_else(|| EnvFilter::new(FALLBACK_DIRECTIVE))
}
