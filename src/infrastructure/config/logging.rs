//! Logging setup for the gateway process.

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

/// `[logging]` section. `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `pretty`, `compact` or `json`. Unknown values fall back to `pretty`.
    #[serde(default = "default_format")]
    pub format: String,
    /// Include the emitting module in each line.
    #[serde(default = "default_targets")]
    pub targets: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_format() -> String {
    "pretty".into()
}

const fn default_targets() -> bool {
    true
}

impl LoggingConfig {
    /// Install the global subscriber. A second call is a no-op.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let builder = fmt().with_env_filter(filter).with_target(self.targets);

        let installed = match self.format.as_str() {
            "json" => builder.json().flatten_event(true).try_init(),
            "compact" => builder.compact().try_init(),
            _ => builder.try_init(),
        };
        if installed.is_err() {
            tracing::debug!("Logging already initialized");
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            targets: default_targets(),
        }
    }
}
