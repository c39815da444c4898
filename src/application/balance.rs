//! Balance table keyed by (venue, asset).

use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;

use crate::domain::{Asset, Balance, BalanceReport, Venue};

/// Latest known balance per (venue, asset). Entries are created on first
/// report and never removed.
#[derive(Default)]
pub struct BalanceBook {
    balances: DashMap<(Venue, Asset), Balance>,
}

impl BalanceBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report. Negative amounts are refused.
    pub fn apply(&self, venue: Venue, report: &BalanceReport) -> Option<Balance> {
        if !report.is_valid() {
            warn!(venue = %venue, asset = %report.asset, "Ignoring negative balance report");
            return None;
        }
        let balance = Balance::from_report(venue, report, Utc::now());
        self.balances
            .insert((venue, report.asset.clone()), balance.clone());
        Some(balance)
    }

    #[must_use]
    pub fn get(&self, venue: Venue, asset: &Asset) -> Option<Balance> {
        self.balances
            .get(&(venue, asset.clone()))
            .map(|b| b.value().clone())
    }

    #[must_use]
    pub fn venue_balances(&self, venue: Venue) -> Vec<Balance> {
        self.balances
            .iter()
            .filter(|entry| entry.key().0 == venue)
            .map(|entry| entry.value().clone())
            .collect()
    }
}
