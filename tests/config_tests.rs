use std::collections::HashMap;
use std::fs;

use tradewire::domain::{RateCategory, Venue};
use tradewire::error::{ConfigError, Error};
use tradewire::infrastructure::config::settings::Config;

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn config_loads_from_file_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[logging]
level = "debug"
format = "json"

[[venues]]
kind = "binance"
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
    assert_eq!(config.reconnection.initial_delay_ms, 1_000);
    assert_eq!(config.reconnection.max_delay_ms, 60_000);
    assert_eq!(config.bus.subscriber_capacity, 1_024);
    assert_eq!(config.orders.retention_secs, 3_600);
    assert!(config.broker.is_none());
    assert!(config.store.is_none());

    let binance = config.venue(Venue::Binance).unwrap();
    assert!(!binance.trading);
    assert_eq!(binance.rest_url(), "https://api.binance.com");
    assert!(config.venue(Venue::Okx).is_none());
}

#[test]
fn config_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Config(ConfigError::ReadFile(_)))));
}

#[test]
fn config_rejects_malformed_toml() {
    let result = Config::parse_toml_with_env("[[venues]\nkind = ", |_| None);
    assert!(matches!(result, Err(Error::Config(ConfigError::Parse(_)))));
}

#[test]
fn config_rejects_unknown_venue_kind() {
    let result = Config::parse_toml_with_env("[[venues]]\nkind = \"kraken\"\n", |_| None);
    assert!(matches!(result, Err(Error::Config(ConfigError::Parse(_)))));
}

#[test]
fn config_reads_credentials_from_environment() {
    let toml = r#"
[[venues]]
kind = "huobi"
trading = true
"#;
    let config = Config::parse_toml_with_env(
        toml,
        env(&[("HUOBI_API_KEY", "key"), ("HUOBI_API_SECRET", "secret")]),
    )
    .unwrap();

    let credentials = config.venue(Venue::Huobi).unwrap().credentials.clone().unwrap();
    assert_eq!(credentials.api_key, "key");
    assert_eq!(credentials.api_secret, "secret");
    assert!(credentials.passphrase.is_none());
}

#[test]
fn config_rejects_trading_without_credentials() {
    let toml = r#"
[[venues]]
kind = "binance"
trading = true
"#;
    match Config::parse_toml_with_env(toml, env(&[("BINANCE_API_KEY", "key")])) {
        Err(Error::Config(ConfigError::MissingCredentials { venue, variable })) => {
            assert_eq!(venue, Venue::Binance);
            assert_eq!(variable, "BINANCE_API_KEY");
        }
        Err(err) => panic!("Expected missing credentials, got {err}"),
        Ok(_) => panic!("Expected trading without credentials to be rejected"),
    }
}

#[test]
fn config_rejects_okx_trading_without_passphrase() {
    let toml = r#"
[[venues]]
kind = "okx"
trading = true
"#;
    let result = Config::parse_toml_with_env(
        toml,
        env(&[("OKX_API_KEY", "key"), ("OKX_API_SECRET", "secret")]),
    );
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::MissingCredentials {
            venue: Venue::Okx,
            variable: "OKX_API_PASSPHRASE",
        }))
    ));
}

#[test]
fn config_market_data_only_venue_needs_no_credentials() {
    let config = Config::parse_toml_with_env("[[venues]]\nkind = \"okx\"\n", |_| None).unwrap();
    assert!(config.venue(Venue::Okx).unwrap().credentials.is_none());
}

#[test]
fn config_rejects_duplicate_venue() {
    let toml = r#"
[[venues]]
kind = "binance"

[[venues]]
kind = "binance"
"#;
    let result = Config::parse_toml_with_env(toml, |_| None);
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidValue { field: "venues", .. }))
    ));
}

#[test]
fn config_rejects_invalid_backoff() {
    let toml = r#"
[reconnection]
initial_delay_ms = 5000
max_delay_ms = 1000
"#;
    let result = Config::parse_toml_with_env(toml, |_| None);
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidValue {
            field: "max_delay_ms",
            ..
        }))
    ));

    let toml = "[reconnection]\njitter_ratio = 1.5\n";
    let result = Config::parse_toml_with_env(toml, |_| None);
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidValue {
            field: "jitter_ratio",
            ..
        }))
    ));
}

#[test]
fn config_rejects_zero_bus_capacity() {
    let result = Config::parse_toml_with_env("[bus]\nsubscriber_capacity = 0\n", |_| None);
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidValue { field: "bus", .. }))
    ));
}

#[test]
fn config_broker_defaults_and_password_from_environment() {
    let toml = r#"
[broker]
url = "http://rabbit:15672"
"#;
    let config =
        Config::parse_toml_with_env(toml, env(&[("BROKER_PASSWORD", "hunter2")])).unwrap();
    let broker = config.broker.unwrap();
    assert_eq!(broker.vhost, "/");
    assert_eq!(broker.exchange, "tradewire");
    assert_eq!(broker.username, "guest");
    assert_eq!(broker.password.as_deref(), Some("hunter2"));
}

#[test]
fn config_rejects_invalid_broker_url() {
    let result = Config::parse_toml_with_env("[broker]\nurl = \"not a url\"\n", |_| None);
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidValue {
            field: "broker.url",
            ..
        }))
    ));
}

#[test]
fn config_rate_limit_override_replaces_default_bucket() {
    let toml = r#"
[[venues]]
kind = "okx"

[venues.rate_limits.order]
capacity = 10
interval_ms = 1000
"#;
    let config = Config::parse_toml_with_env(toml, |_| None).unwrap();
    let okx = config.venue(Venue::Okx).unwrap();
    assert_eq!(okx.bucket(RateCategory::Order).capacity, 10);
    assert_eq!(okx.bucket(RateCategory::Query).capacity, 20);
}
