//! Venue variants and their rate-limit categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A supported trading venue.
///
/// The set is closed: each variant carries its own wire, auth and
/// normalization implementation selected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Huobi,
    #[serde(alias = "okex")]
    Okx,
}

impl Venue {
    pub const ALL: [Venue; 3] = [Venue::Binance, Venue::Huobi, Venue::Okx];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Huobi => "huobi",
            Self::Okx => "okx",
        }
    }

    /// Whether market buys are sized in quote currency with no base-unit option.
    #[must_use]
    pub const fn market_buy_in_quote(&self) -> bool {
        matches!(self, Self::Huobi)
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "huobi" => Ok(Self::Huobi),
            "okx" | "okex" => Ok(Self::Okx),
            other => Err(format!("unknown venue '{other}'")),
        }
    }
}

/// Rate-limit bucket a REST call is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateCategory {
    Order,
    Query,
    MarketData,
}

impl RateCategory {
    pub const ALL: [RateCategory; 3] = [
        RateCategory::Order,
        RateCategory::Query,
        RateCategory::MarketData,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Query => "query",
            Self::MarketData => "market_data",
        }
    }
}

impl fmt::Display for RateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
