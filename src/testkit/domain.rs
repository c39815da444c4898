//! Builders for domain primitives used across tests.
//!
//! Concise factory functions for topics, canonical events, books, orders and
//! reports so tests focus on assertions rather than construction boilerplate.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{
    BookDelta, BookSequence, BookSnapshot, CanonicalEvent, ClientOrderId, EventPayload,
    InstrumentId, Order, OrderReport, OrderSide, OrderSpec, OrderState, PriceLevel,
    TimestampSource, Topic, Trade, Venue, VenueOrderStatus,
};

/// Parse `"BASE/QUOTE"` into an instrument.
pub fn instrument(symbol: &str) -> InstrumentId {
    symbol.parse().unwrap_or_else(|e| panic!("bad test instrument {symbol}: {e}"))
}

/// Trades topic for `symbol` on `venue`.
pub fn trades_topic(venue: Venue, symbol: &str) -> Topic {
    Topic::trades(venue, instrument(symbol))
}

pub fn trade_payload() -> EventPayload {
    EventPayload::Trade(Trade {
        price: dec!(100),
        quantity: dec!(1),
        side: Some(OrderSide::Buy),
        trade_id: None,
    })
}

/// Canonical trade event with a given local sequence.
pub fn trade_event(topic: Topic, sequence: u64) -> CanonicalEvent {
    CanonicalEvent {
        topic,
        timestamp: Utc::now(),
        timestamp_source: TimestampSource::Receipt,
        sequence,
        payload: trade_payload(),
    }
}

fn levels(levels: Vec<(Decimal, Decimal)>) -> Vec<PriceLevel> {
    levels
        .into_iter()
        .map(|(price, quantity)| PriceLevel::new(price, quantity))
        .collect()
}

pub fn book_delta(
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
    sequence: Option<BookSequence>,
) -> BookDelta {
    BookDelta {
        bids: levels(bids),
        asks: levels(asks),
        sequence,
    }
}

pub fn book_snapshot(
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
    sequence: Option<u64>,
) -> BookSnapshot {
    BookSnapshot {
        bids: levels(bids),
        asks: levels(asks),
        sequence,
    }
}

/// Binance BTC/USDT limit buy in the Created state.
pub fn limit_order(quantity: Decimal, price: Decimal) -> Order {
    let spec = OrderSpec::limit(
        Venue::Binance,
        instrument("BTC/USDT"),
        OrderSide::Buy,
        quantity,
        price,
    );
    let order = Order::new(&spec, ClientOrderId::generate(), Utc::now());
    debug_assert_eq!(order.state, OrderState::Created);
    order
}

/// Cumulative fill report for `order`, carrying both its ids.
///
/// Status is Filled once `filled` reaches the order quantity.
pub fn fill_report(
    order: &Order,
    filled: Decimal,
    average_price: Option<Decimal>,
    last_fill_price: Option<Decimal>,
) -> OrderReport {
    let status = if filled < order.quantity {
        VenueOrderStatus::PartiallyFilled
    } else {
        VenueOrderStatus::Filled
    };
    let mut report = status_report(order, status).with_fill(filled, average_price);
    report.last_fill_price = last_fill_price;
    report
}

/// Status-only report for `order`.
pub fn status_report(order: &Order, status: VenueOrderStatus) -> OrderReport {
    OrderReport::new(order.instrument.clone(), status).with_ids(
        Some(order.client_order_id.clone()),
        order.venue_order_id.clone(),
    )
}
