//! Venue-agnostic domain types: identifiers, events, books, orders and balances.

pub mod balance;
pub mod book;
pub mod connection;
pub mod event;
pub mod id;
pub mod order;
pub mod venue;

pub use balance::{Balance, BalanceReport};
pub use book::{BookDelta, BookSequence, BookSnapshot, Continuity, OrderBook, PriceLevel};
pub use connection::{ConnectionState, SessionChannel};
pub use event::{
    CanonicalEvent, EventPayload, TimestampSource, Topic, TopicKind, Trade, VenueEvent,
};
pub use id::{Asset, ClientOrderId, InstrumentId, SubscriptionId, VenueOrderId};
pub use order::{
    Order, OrderLocator, OrderReport, OrderSide, OrderSpec, OrderState, OrderType,
    VenueOrderStatus,
};
pub use venue::{RateCategory, Venue};
