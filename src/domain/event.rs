//! Canonical event model and topics.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::balance::BalanceReport;
use super::book::{BookDelta, BookSnapshot};
use super::connection::{ConnectionState, SessionChannel};
use super::id::InstrumentId;
use super::order::{OrderReport, OrderSide};
use super::venue::Venue;

/// Kind of data carried on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    Trades,
    Book,
    Orders,
    Balances,
    Connection,
}

impl TopicKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::Book => "book",
            Self::Orders => "orders",
            Self::Balances => "balances",
            Self::Connection => "connection",
        }
    }

    /// Kinds scoped to a single instrument.
    #[must_use]
    pub const fn is_market_data(&self) -> bool {
        matches!(self, Self::Trades | Self::Book)
    }
}

/// A named event stream scoped to (venue, kind, instrument).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    pub venue: Venue,
    pub kind: TopicKind,
    /// `None` for venue-wide topics (orders, balances, connection).
    pub instrument: Option<InstrumentId>,
}

impl Topic {
    pub fn trades(venue: Venue, instrument: InstrumentId) -> Self {
        Self {
            venue,
            kind: TopicKind::Trades,
            instrument: Some(instrument),
        }
    }

    pub fn book(venue: Venue, instrument: InstrumentId) -> Self {
        Self {
            venue,
            kind: TopicKind::Book,
            instrument: Some(instrument),
        }
    }

    pub fn market(venue: Venue, kind: TopicKind, instrument: InstrumentId) -> Self {
        Self {
            venue,
            kind,
            instrument: Some(instrument),
        }
    }

    #[must_use]
    pub const fn orders(venue: Venue) -> Self {
        Self {
            venue,
            kind: TopicKind::Orders,
            instrument: None,
        }
    }

    #[must_use]
    pub const fn balances(venue: Venue) -> Self {
        Self {
            venue,
            kind: TopicKind::Balances,
            instrument: None,
        }
    }

    #[must_use]
    pub const fn connection(venue: Venue) -> Self {
        Self {
            venue,
            kind: TopicKind::Connection,
            instrument: None,
        }
    }

    /// External broker subject: `{venue}.{kind}.{instrument}`, `all` for venue-wide topics.
    #[must_use]
    pub fn subject(&self) -> String {
        let instrument = self.instrument.as_ref().map_or("all", InstrumentId::as_str);
        format!("{}.{}.{}", self.venue, self.kind.as_str(), instrument)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.subject())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub price: Decimal,
    pub quantity: Decimal,
    /// Aggressor side, when the venue reports it.
    pub side: Option<OrderSide>,
    pub trade_id: Option<String>,
}

/// Payload variants of a canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Trade(Trade),
    OrderBookDelta(BookDelta),
    OrderBookSnapshot(BookSnapshot),
    OrderUpdate(OrderReport),
    BalanceUpdate(BalanceReport),
    ConnectionStateChange {
        channel: SessionChannel,
        state: ConnectionState,
        reason: Option<String>,
    },
}

/// Where an event timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    Venue,
    Receipt,
}

/// Event produced by a venue translator before local sequencing.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueEvent {
    pub topic: Topic,
    /// Venue-reported event time, if any.
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: EventPayload,
}

impl VenueEvent {
    pub fn new(topic: Topic, timestamp: Option<DateTime<Utc>>, payload: EventPayload) -> Self {
        Self {
            topic,
            timestamp,
            payload,
        }
    }
}

/// Normalized, venue-agnostic event. Immutable once constructed.
///
/// `sequence` is assigned locally and strictly increases per topic; it is the
/// only field consumers should use to detect gaps or duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub topic: Topic,
    pub timestamp: DateTime<Utc>,
    pub timestamp_source: TimestampSource,
    pub sequence: u64,
    pub payload: EventPayload,
}

impl CanonicalEvent {
    #[must_use]
    pub fn venue(&self) -> Venue {
        self.topic.venue
    }

    #[must_use]
    pub fn instrument(&self) -> Option<&InstrumentId> {
        self.topic.instrument.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_subject() {
        let trades = Topic::trades(Venue::Binance, InstrumentId::new("btc", "usdt"));
        assert_eq!(trades.subject(), "binance.trades.BTC/USDT");
        assert_eq!(Topic::orders(Venue::Okx).subject(), "okx.orders.all");
    }

    #[test]
    fn test_payload_serializes_tagged() {
        let payload = EventPayload::ConnectionStateChange {
            channel: SessionChannel::Public,
            state: ConnectionState::Degraded,
            reason: Some("heartbeat".into()),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "connection_state_change");
        assert_eq!(json["data"]["state"], "degraded");
        assert_eq!(json["data"]["channel"], "public");
    }
}
