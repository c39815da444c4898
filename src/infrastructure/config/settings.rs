//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all gateway settings.
//! Configuration is loaded once from a TOML file; venue credentials and the
//! broker password come from environment variables, never from the file.
//!
//! # Example
//!
//! ```no_run
//! use tradewire::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::logging::LoggingConfig;
use super::reconnect::ReconnectionConfig;
use super::venue::{Credentials, VenueConfig};
use crate::domain::Venue;
use crate::error::{ConfigError, Result};

/// Event bus sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Per-subscriber queue capacity; the oldest event is dropped beyond it.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// Capacity of the queue feeding the external bridge.
    #[serde(default = "default_bridge_capacity")]
    pub bridge_capacity: usize,
}

const fn default_subscriber_capacity() -> usize {
    1_024
}

const fn default_bridge_capacity() -> usize {
    4_096
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
            bridge_capacity: default_bridge_capacity(),
        }
    }
}

/// Order tracking and reconciliation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    /// How long terminal orders stay queryable before eviction.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Reconciliation queries issued inline after an ambiguous outcome.
    #[serde(default = "default_reconcile_attempts")]
    pub reconcile_attempts: u32,
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,
    /// Lifetime of reports buffered for orders not yet known locally.
    #[serde(default = "default_pending_report_ttl_secs")]
    pub pending_report_ttl_secs: u64,
    /// Period of the eviction and re-reconciliation sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

const fn default_retention_secs() -> u64 {
    3_600
}

const fn default_reconcile_attempts() -> u32 {
    3
}

const fn default_reconcile_interval_ms() -> u64 {
    500
}

const fn default_pending_report_ttl_secs() -> u64 {
    60
}

const fn default_sweep_interval_secs() -> u64 {
    5
}

impl OrdersConfig {
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    #[must_use]
    pub fn pending_report_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_report_ttl_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            reconcile_attempts: default_reconcile_attempts(),
            reconcile_interval_ms: default_reconcile_interval_ms(),
            pending_report_ttl_secs: default_pending_report_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// RabbitMQ bridge target, reached through the management HTTP API.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Management API base URL, e.g. `http://localhost:15672`.
    pub url: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_broker_username")]
    pub username: String,
    /// Loaded from `BROKER_PASSWORD`.
    #[serde(skip)]
    pub password: Option<String>,
}

fn default_vhost() -> String {
    "/".into()
}

fn default_exchange() -> String {
    "tradewire".into()
}

fn default_broker_username() -> String {
    "guest".into()
}

/// Local JSON-lines record store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
    #[serde(default = "default_store_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_store_channel_capacity() -> usize {
    4_096
}

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`]. Immutable once loaded.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Session reconnection settings.
    ///
    /// Controls backoff delays, jitter and circuit breaker behavior.
    #[serde(default)]
    pub reconnection: ReconnectionConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub orders: OrdersConfig,

    /// Optional external broker bridge.
    pub broker: Option<BrokerConfig>,

    /// Optional record store.
    pub store: Option<StoreConfig>,

    /// Connected venues, one entry per venue.
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
}

impl Config {
    /// Parse configuration from TOML content, reading secrets from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TOML content is malformed
    /// - Validation fails (e.g., a trading venue has no credentials)
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        Self::parse_toml_with_env(content, |key| std::env::var(key).ok())
    }

    /// Parse configuration with an explicit environment lookup.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml_with_env<F>(content: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        // Secrets come from the environment only
        for venue in &mut config.venues {
            let (key_var, secret_var, passphrase_var) = VenueConfig::credential_vars(venue.kind);
            venue.credentials = match (env(key_var), env(secret_var)) {
                (Some(api_key), Some(api_secret)) => Some(Credentials {
                    api_key,
                    api_secret,
                    passphrase: env(passphrase_var),
                }),
                _ => None,
            };
        }
        if let Some(broker) = config.broker.as_mut() {
            broker.password = env("BROKER_PASSWORD");
        }

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration values.
    ///
    /// Missing credentials on a trading venue are the only startup condition
    /// that is fatal to the process.
    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for venue in &self.venues {
            if !seen.insert(venue.kind) {
                return Err(ConfigError::InvalidValue {
                    field: "venues",
                    reason: format!("{} configured more than once", venue.kind),
                }
                .into());
            }
            validate_venue(venue)?;
        }

        let reconnection = &self.reconnection;
        if reconnection.initial_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "initial_delay_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if reconnection.max_delay_ms < reconnection.initial_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_delay_ms",
                reason: "must be >= initial_delay_ms".to_string(),
            }
            .into());
        }
        if reconnection.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier",
                reason: "must be >= 1.0".to_string(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&reconnection.jitter_ratio) {
            return Err(ConfigError::InvalidValue {
                field: "jitter_ratio",
                reason: "must be between 0 and 1".to_string(),
            }
            .into());
        }
        if reconnection.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_consecutive_failures",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if reconnection.circuit_breaker_cooldown_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "circuit_breaker_cooldown_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if reconnection.max_auth_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_auth_attempts",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.bus.subscriber_capacity == 0 || self.bus.bridge_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bus",
                reason: "capacities must be greater than 0".to_string(),
            }
            .into());
        }

        if self.orders.reconcile_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reconcile_attempts",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.orders.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sweep_interval_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if let Some(broker) = &self.broker {
            url::Url::parse(&broker.url).map_err(|e| ConfigError::InvalidValue {
                field: "broker.url",
                reason: e.to_string(),
            })?;
        }
        if let Some(store) = &self.store {
            if store.path.is_empty() {
                return Err(ConfigError::MissingField { field: "store.path" }.into());
            }
        }
        Ok(())
    }

    /// Settings of one venue, if configured.
    #[must_use]
    pub fn venue(&self, kind: Venue) -> Option<&VenueConfig> {
        self.venues.iter().find(|v| v.kind == kind)
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

#[allow(clippy::result_large_err)]
fn validate_venue(venue: &VenueConfig) -> Result<()> {
    if venue.trading {
        let (key_var, _, passphrase_var) = VenueConfig::credential_vars(venue.kind);
        let Some(credentials) = &venue.credentials else {
            return Err(ConfigError::MissingCredentials {
                venue: venue.kind,
                variable: key_var,
            }
            .into());
        };
        if venue.kind == Venue::Okx && credentials.passphrase.is_none() {
            return Err(ConfigError::MissingCredentials {
                venue: venue.kind,
                variable: passphrase_var,
            }
            .into());
        }
    }
    if venue.request_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue {
            field: "request_timeout_ms",
            reason: "must be greater than 0".to_string(),
        }
        .into());
    }
    if venue.heartbeat_timeout_ms == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: "heartbeat_timeout_ms",
            reason: "must be greater than 0".to_string(),
        }
        .into());
    }
    let buckets = [
        venue.rate_limits.order,
        venue.rate_limits.query,
        venue.rate_limits.market_data,
    ];
    if buckets
        .iter()
        .flatten()
        .any(|b| b.capacity == 0 || b.interval_ms == 0)
    {
        return Err(ConfigError::InvalidValue {
            field: "rate_limits",
            reason: "capacity and interval_ms must be greater than 0".to_string(),
        }
        .into());
    }
    for url in [venue.rest_url(), venue.public_ws_url(), venue.private_ws_url()] {
        url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
            field: "venue url",
            reason: format!("{url}: {e}"),
        })?;
    }
    Ok(())
}
