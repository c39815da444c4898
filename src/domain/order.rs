//! Order intents, order lifecycle states and venue order reports.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ClientOrderId, InstrumentId, VenueOrderId};
use super::venue::Venue;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Lifecycle state of a locally tracked order.
///
/// `Submitting { ambiguous: true }` is the pending-unknown sub-state: the
/// submit call's outcome is not known and a reconciliation query must
/// resolve it before any other mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrderState {
    Created,
    Submitting { ambiguous: bool },
    Acknowledged,
    PartiallyFilled,
    Filled,
    CancelRequested,
    Canceled,
    Rejected,
    Failed,
}

impl OrderState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Rejected | Self::Failed
        )
    }

    #[must_use]
    pub const fn is_pending_unknown(&self) -> bool {
        matches!(self, Self::Submitting { ambiguous: true })
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitting { ambiguous: false } => "submitting",
            Self::Submitting { ambiguous: true } => "pending_unknown",
            Self::Acknowledged => "acknowledged",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::CancelRequested => "cancel_requested",
            Self::Canceled => "canceled",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Order status as reported by a venue, mapped from its native vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueOrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl VenueOrderStatus {
    /// Still working at the venue.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::New | Self::PartiallyFilled)
    }
}

/// An order intent submitted by a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    pub venue: Venue,
    pub instrument: InstrumentId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Limit price; must be absent for market orders.
    pub price: Option<Decimal>,
}

impl OrderSpec {
    pub fn limit(
        venue: Venue,
        instrument: InstrumentId,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            venue,
            instrument,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
        }
    }

    pub fn market(venue: Venue, instrument: InstrumentId, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            venue,
            instrument,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(Error::InvalidOrder("quantity must be positive".into()));
        }
        match (self.order_type, self.price) {
            (OrderType::Limit, None) => Err(Error::InvalidOrder("limit order needs a price".into())),
            (OrderType::Limit, Some(price)) if price <= Decimal::ZERO => {
                Err(Error::InvalidOrder("price must be positive".into()))
            }
            (OrderType::Market, Some(_)) => {
                Err(Error::InvalidOrder("market order must not carry a price".into()))
            }
            // Quantity is always base units; fills could never be matched against it.
            (OrderType::Market, None)
                if self.side == OrderSide::Buy && self.venue.market_buy_in_quote() =>
            {
                Err(Error::InvalidOrder(format!(
                    "{} sizes market buys in quote currency; use a limit order",
                    self.venue
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A locally tracked order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub venue: Venue,
    pub instrument: InstrumentId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub state: OrderState,
    pub filled_quantity: Decimal,
    pub average_price: Option<Decimal>,
    /// Last venue-supplied reason for a rejection, failure or refusal.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// State to restore if the venue refuses a cancel request.
    #[serde(skip)]
    pub(crate) pre_cancel_state: Option<OrderState>,
}

impl Order {
    pub fn new(spec: &OrderSpec, client_order_id: ClientOrderId, now: DateTime<Utc>) -> Self {
        Self {
            client_order_id,
            venue_order_id: None,
            venue: spec.venue,
            instrument: spec.instrument.clone(),
            side: spec.side,
            order_type: spec.order_type,
            quantity: spec.quantity,
            price: spec.price,
            state: OrderState::Created,
            filled_quantity: Decimal::ZERO,
            average_price: None,
            reason: None,
            created_at: now,
            updated_at: now,
            pre_cancel_state: None,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Decimal {
        (self.quantity - self.filled_quantity).max(Decimal::ZERO)
    }

    #[must_use]
    pub fn locator(&self) -> OrderLocator {
        OrderLocator {
            client_order_id: self.client_order_id.clone(),
            venue_order_id: self.venue_order_id.clone(),
            instrument: self.instrument.clone(),
        }
    }
}

/// Everything a venue needs to address an existing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLocator {
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub instrument: InstrumentId,
}

/// Venue-reported state of one order, from a REST response or a private stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    pub client_order_id: Option<ClientOrderId>,
    pub venue_order_id: Option<VenueOrderId>,
    pub instrument: InstrumentId,
    pub status: VenueOrderStatus,
    /// Cumulative filled quantity, when the venue reports it.
    pub filled_quantity: Option<Decimal>,
    /// Cumulative average fill price, when the venue reports it.
    pub average_price: Option<Decimal>,
    pub last_fill_price: Option<Decimal>,
    pub reason: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl OrderReport {
    pub fn new(instrument: InstrumentId, status: VenueOrderStatus) -> Self {
        Self {
            client_order_id: None,
            venue_order_id: None,
            instrument,
            status,
            filled_quantity: None,
            average_price: None,
            last_fill_price: None,
            reason: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_ids(mut self, client: Option<ClientOrderId>, venue: Option<VenueOrderId>) -> Self {
        self.client_order_id = client;
        self.venue_order_id = venue;
        self
    }

    #[must_use]
    pub fn with_fill(mut self, filled: Decimal, average_price: Option<Decimal>) -> Self {
        self.filled_quantity = Some(filled);
        self.average_price = average_price;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn instrument() -> InstrumentId {
        InstrumentId::new("BTC", "USDT")
    }

    #[test]
    fn test_spec_validation() {
        let ok = OrderSpec::limit(Venue::Binance, instrument(), OrderSide::Buy, dec!(1), dec!(100));
        assert!(ok.validate().is_ok());

        let mut no_price = ok.clone();
        no_price.price = None;
        assert!(no_price.validate().is_err());

        let mut zero_qty = ok.clone();
        zero_qty.quantity = Decimal::ZERO;
        assert!(zero_qty.validate().is_err());

        let mut priced_market = OrderSpec::market(Venue::Okx, instrument(), OrderSide::Sell, dec!(1));
        assert!(priced_market.validate().is_ok());
        priced_market.price = Some(dec!(1));
        assert!(priced_market.validate().is_err());
    }

    #[test]
    fn test_quote_sized_market_buy_refused() {
        let buy = OrderSpec::market(Venue::Huobi, instrument(), OrderSide::Buy, dec!(1));
        assert!(matches!(buy.validate(), Err(Error::InvalidOrder(_))));

        let sell = OrderSpec::market(Venue::Huobi, instrument(), OrderSide::Sell, dec!(1));
        assert!(sell.validate().is_ok());
        let okx_buy = OrderSpec::market(Venue::Okx, instrument(), OrderSide::Buy, dec!(1));
        assert!(okx_buy.validate().is_ok());
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderState::Filled.is_terminal());
        assert!(OrderState::Failed.is_terminal());
        assert!(!OrderState::CancelRequested.is_terminal());
        assert!(OrderState::Submitting { ambiguous: true }.is_pending_unknown());
        assert_eq!(OrderState::Submitting { ambiguous: true }.name(), "pending_unknown");
    }
}
