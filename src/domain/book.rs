//! Order book levels, updates and venue sequence continuity.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price level. A zero quantity in a delta removes the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    #[must_use]
    pub const fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// How a venue numbers incremental book updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum BookSequence {
    /// Update covers the id range `first..=last` (Binance depth streams).
    Range { first: u64, last: u64 },
    /// Update names the sequence it follows (Huobi MBP, OKX books).
    Linked { prev: u64, last: u64 },
}

/// Relation of an incoming delta to the last applied sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// Applies directly on top of the current book.
    Next,
    /// Entirely at or before the last applied sequence.
    Stale,
    /// Leaves a hole; the book can no longer be trusted.
    Gap,
}

impl BookSequence {
    #[must_use]
    pub const fn last(&self) -> u64 {
        match self {
            Self::Range { last, .. } | Self::Linked { last, .. } => *last,
        }
    }

    #[must_use]
    pub fn continuity(&self, applied: u64) -> Continuity {
        match *self {
            Self::Range { first, last } => {
                if last <= applied {
                    Continuity::Stale
                } else if first <= applied + 1 {
                    Continuity::Next
                } else {
                    Continuity::Gap
                }
            }
            Self::Linked { prev, last } => {
                // Idle heartbeats repeat the last sequence with prev == last.
                if prev == applied {
                    Continuity::Next
                } else if last <= applied {
                    Continuity::Stale
                } else {
                    Continuity::Gap
                }
            }
        }
    }
}

/// Full book state as delivered by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// Venue sequence the snapshot reflects, if the venue numbers its books.
    pub sequence: Option<u64>,
}

/// Incremental book change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDelta {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub sequence: Option<BookSequence>,
}

/// Materialized order book for one instrument.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl OrderBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.bids.clear();
        self.asks.clear();
        Self::apply_levels(&mut self.bids, &snapshot.bids);
        Self::apply_levels(&mut self.asks, &snapshot.asks);
    }

    pub fn apply_delta(&mut self, delta: &BookDelta) {
        Self::apply_levels(&mut self.bids, &delta.bids);
        Self::apply_levels(&mut self.asks, &delta.asks);
    }

    fn apply_levels(side: &mut BTreeMap<Decimal, Decimal>, levels: &[PriceLevel]) {
        for level in levels {
            if level.quantity.is_zero() {
                side.remove(&level.price);
            } else {
                side.insert(level.price, level.quantity);
            }
        }
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(price, qty)| PriceLevel::new(*price, *qty))
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .next()
            .map(|(price, qty)| PriceLevel::new(*price, *qty))
    }

    #[must_use]
    pub fn depth(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_range_continuity() {
        let seq = BookSequence::Range { first: 101, last: 110 };
        assert_eq!(seq.continuity(100), Continuity::Next);
        assert_eq!(seq.continuity(105), Continuity::Next);
        assert_eq!(seq.continuity(110), Continuity::Stale);
        assert_eq!(seq.continuity(99), Continuity::Gap);
    }

    #[test]
    fn test_linked_continuity() {
        let seq = BookSequence::Linked { prev: 7, last: 9 };
        assert_eq!(seq.continuity(7), Continuity::Next);
        assert_eq!(seq.continuity(9), Continuity::Stale);
        assert_eq!(seq.continuity(5), Continuity::Gap);

        let heartbeat = BookSequence::Linked { prev: 9, last: 9 };
        assert_eq!(heartbeat.continuity(9), Continuity::Next);
    }

    #[test]
    fn test_delta_removes_zero_levels() {
        let mut book = OrderBook::new();
        book.apply_snapshot(&BookSnapshot {
            bids: vec![PriceLevel::new(dec!(99), dec!(1)), PriceLevel::new(dec!(98), dec!(2))],
            asks: vec![PriceLevel::new(dec!(101), dec!(1))],
            sequence: Some(1),
        });
        book.apply_delta(&BookDelta {
            bids: vec![PriceLevel::new(dec!(99), dec!(0))],
            asks: vec![PriceLevel::new(dec!(100.5), dec!(3))],
            sequence: None,
        });

        assert_eq!(book.best_bid(), Some(PriceLevel::new(dec!(98), dec!(2))));
        assert_eq!(book.best_ask(), Some(PriceLevel::new(dec!(100.5), dec!(3))));
        assert_eq!(book.depth(), (1, 2));
    }
}
