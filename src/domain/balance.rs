//! Per-venue asset balances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::Asset;
use super::venue::Venue;

/// Balance amounts for one asset as reported by a venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub asset: Asset,
    pub available: Decimal,
    pub locked: Decimal,
}

impl BalanceReport {
    pub fn new(asset: impl Into<Asset>, available: Decimal, locked: Decimal) -> Self {
        Self {
            asset: asset.into(),
            available,
            locked,
        }
    }

    /// Amounts are never negative; a venue reporting otherwise is malformed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.available >= Decimal::ZERO && self.locked >= Decimal::ZERO
    }
}

/// Current balance of one asset on one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub venue: Venue,
    pub asset: Asset,
    pub available: Decimal,
    pub locked: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn zero(venue: Venue, asset: Asset, now: DateTime<Utc>) -> Self {
        Self {
            venue,
            asset,
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
            updated_at: now,
        }
    }

    pub fn from_report(venue: Venue, report: &BalanceReport, now: DateTime<Utc>) -> Self {
        Self {
            venue,
            asset: report.asset.clone(),
            available: report.available,
            locked: report.locked,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }
}
