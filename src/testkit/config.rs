//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use crate::domain::Venue;
use crate::infrastructure::config::reconnect::ReconnectionConfig;
use crate::infrastructure::config::settings::{BusConfig, OrdersConfig};
use crate::infrastructure::config::venue::{Credentials, VenueConfig};
use crate::infrastructure::config::Config;

/// Fast reconnection config with near-zero delays.
pub fn reconnection() -> ReconnectionConfig {
    ReconnectionConfig {
        initial_delay_ms: 1,
        max_delay_ms: 10,
        backoff_multiplier: 2.0,
        jitter_ratio: 0.0,
        max_consecutive_failures: 100,
        circuit_breaker_cooldown_ms: 0,
        max_auth_attempts: 3,
    }
}

/// Order housekeeping tuned for tests: quick reconciliation, short retention.
pub fn orders() -> OrdersConfig {
    OrdersConfig {
        retention_secs: 60,
        reconcile_attempts: 3,
        reconcile_interval_ms: 10,
        pending_report_ttl_secs: 30,
        sweep_interval_secs: 1,
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        api_key: "test-key".into(),
        api_secret: "test-secret".into(),
        passphrase: Some("test-pass".into()),
    }
}

/// Trading-enabled venue config with test credentials.
pub fn trading_venue(kind: Venue) -> VenueConfig {
    let mut venue = VenueConfig::new(kind);
    venue.trading = true;
    venue.credentials = Some(credentials());
    venue
}

/// Whole-process config over the given venues.
pub fn config(venues: Vec<VenueConfig>) -> Config {
    Config {
        reconnection: reconnection(),
        bus: BusConfig {
            subscriber_capacity: 64,
            bridge_capacity: 64,
        },
        orders: orders(),
        venues,
        ..Config::default()
    }
}
