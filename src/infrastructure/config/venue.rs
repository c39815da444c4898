//! Per-venue connection, rate-limit and credential settings.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{RateCategory, Venue};

/// API credentials for one venue. Loaded from the environment only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    /// Required by OKX, unused elsewhere.
    pub passphrase: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Token bucket sizing: `capacity` requests per `interval_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BucketConfig {
    pub capacity: u32,
    pub interval_ms: u64,
}

impl BucketConfig {
    #[must_use]
    pub const fn new(capacity: u32, interval_ms: u64) -> Self {
        Self {
            capacity,
            interval_ms,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Optional overrides of a venue's default rate limits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitOverrides {
    pub order: Option<BucketConfig>,
    pub query: Option<BucketConfig>,
    pub market_data: Option<BucketConfig>,
}

/// One `[[venues]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Venue variant; selects wire protocol, auth scheme and normalizer.
    pub kind: Venue,
    /// Whether orders are placed on this venue. Requires credentials.
    #[serde(default)]
    pub trading: bool,
    pub rest_url: Option<String>,
    pub public_ws_url: Option<String>,
    pub private_ws_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Overrides the venue's default heartbeat window.
    pub heartbeat_timeout_ms: Option<u64>,
    /// Longest a caller waits for a rate-limit token before `RateLimited`.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default)]
    pub rate_limits: RateLimitOverrides,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_max_wait_ms() -> u64 {
    2_000
}

impl VenueConfig {
    pub fn new(kind: Venue) -> Self {
        Self {
            kind,
            trading: false,
            rest_url: None,
            public_ws_url: None,
            private_ws_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            heartbeat_timeout_ms: None,
            max_wait_ms: default_max_wait_ms(),
            rate_limits: RateLimitOverrides::default(),
            credentials: None,
        }
    }

    #[must_use]
    pub fn rest_url(&self) -> &str {
        self.rest_url.as_deref().unwrap_or(match self.kind {
            Venue::Binance => "https://api.binance.com",
            Venue::Huobi => "https://api.huobi.pro",
            Venue::Okx => "https://www.okx.com",
        })
    }

    #[must_use]
    pub fn public_ws_url(&self) -> &str {
        self.public_ws_url.as_deref().unwrap_or(match self.kind {
            Venue::Binance => "wss://stream.binance.com:9443/ws",
            Venue::Huobi => "wss://api.huobi.pro/ws",
            Venue::Okx => "wss://ws.okx.com:8443/ws/v5/public",
        })
    }

    #[must_use]
    pub fn private_ws_url(&self) -> &str {
        self.private_ws_url.as_deref().unwrap_or(match self.kind {
            Venue::Binance => "wss://stream.binance.com:9443/ws",
            Venue::Huobi => "wss://api.huobi.pro/ws/v2",
            Venue::Okx => "wss://ws.okx.com:8443/ws/v5/private",
        })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Heartbeat window: Binance pings every three minutes, Huobi every few
    /// seconds, OKX answers our own pings.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        let default_ms = match self.kind {
            Venue::Binance => 240_000,
            Venue::Huobi | Venue::Okx => 30_000,
        };
        Duration::from_millis(self.heartbeat_timeout_ms.unwrap_or(default_ms))
    }

    /// Effective bucket for a category, override first.
    #[must_use]
    pub fn bucket(&self, category: RateCategory) -> BucketConfig {
        let overridden = match category {
            RateCategory::Order => self.rate_limits.order,
            RateCategory::Query => self.rate_limits.query,
            RateCategory::MarketData => self.rate_limits.market_data,
        };
        overridden.unwrap_or_else(|| default_bucket(self.kind, category))
    }

    /// Environment variable names holding this venue's credentials.
    #[must_use]
    pub const fn credential_vars(kind: Venue) -> (&'static str, &'static str, &'static str) {
        match kind {
            Venue::Binance => ("BINANCE_API_KEY", "BINANCE_API_SECRET", "BINANCE_API_PASSPHRASE"),
            Venue::Huobi => ("HUOBI_API_KEY", "HUOBI_API_SECRET", "HUOBI_API_PASSPHRASE"),
            Venue::Okx => ("OKX_API_KEY", "OKX_API_SECRET", "OKX_API_PASSPHRASE"),
        }
    }
}

fn default_bucket(venue: Venue, category: RateCategory) -> BucketConfig {
    match (venue, category) {
        (Venue::Binance, RateCategory::Order) => BucketConfig::new(50, 10_000),
        (Venue::Binance, RateCategory::Query) => BucketConfig::new(20, 1_000),
        (Venue::Binance, RateCategory::MarketData) => BucketConfig::new(5, 1_000),
        (Venue::Huobi, RateCategory::Order) => BucketConfig::new(100, 2_000),
        (Venue::Huobi, RateCategory::Query) => BucketConfig::new(50, 2_000),
        (Venue::Huobi, RateCategory::MarketData) => BucketConfig::new(10, 1_000),
        (Venue::Okx, RateCategory::Order) => BucketConfig::new(60, 2_000),
        (Venue::Okx, RateCategory::Query) => BucketConfig::new(20, 2_000),
        (Venue::Okx, RateCategory::MarketData) => BucketConfig::new(20, 2_000),
    }
}
