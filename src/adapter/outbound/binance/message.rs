//! Binance spot wire messages.
//!
//! Stream events are JSON objects tagged by `e`. REST depth snapshots carry
//! `lastUpdateId` and no tag, so they are routed by the instrument the
//! snapshot was requested for.
//!
//! Example depth update:
//! ```json
//! {"e":"depthUpdate","E":1700000000000,"s":"BTCUSDT","U":157,"u":160,"b":[["100.0","1"]],"a":[]}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::outbound::codec;
use crate::domain::{
    BalanceReport, BookDelta, BookSequence, BookSnapshot, ClientOrderId, EventPayload,
    InstrumentId, OrderReport, OrderSide, Topic, Trade, Venue, VenueEvent, VenueOrderId,
    VenueOrderStatus,
};
use crate::error::{Error, Result};
use crate::port::{Normalizer, RawFrame};

const VENUE: Venue = Venue::Binance;

/// `{"method":"SUBSCRIBE","params":[...],"id":n}`
#[derive(Debug, Serialize)]
pub struct StreamRequest<'a> {
    pub method: &'a str,
    pub params: Vec<String>,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "e")]
pub enum StreamEvent {
    #[serde(rename = "trade")]
    Trade(TradeEvent),
    #[serde(rename = "depthUpdate")]
    DepthUpdate(DepthUpdateEvent),
    #[serde(rename = "executionReport")]
    ExecutionReport(ExecutionReport),
    #[serde(rename = "outboundAccountPosition")]
    AccountPosition(AccountPosition),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct TradeEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub trade_id: u64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// Buyer was the maker, so the aggressor sold.
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

#[derive(Debug, Deserialize)]
pub struct DepthUpdateEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<Vec<String>>,
    #[serde(rename = "a")]
    pub asks: Vec<Vec<String>>,
}

/// `GET /api/v3/depth` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<Vec<String>>,
    pub asks: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionReport {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    /// Original client id; set on cancels, where `c` is the cancel request's id.
    #[serde(rename = "C", default)]
    pub original_client_order_id: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: u64,
    #[serde(rename = "z")]
    pub cumulative_quantity: String,
    #[serde(rename = "Z")]
    pub cumulative_quote: String,
    #[serde(rename = "L")]
    pub last_price: String,
    #[serde(rename = "l")]
    pub last_quantity: String,
    #[serde(rename = "r", default)]
    pub reject_reason: String,
    #[serde(rename = "T")]
    pub transaction_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct AccountPosition {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "B")]
    pub balances: Vec<PositionBalance>,
}

#[derive(Debug, Deserialize)]
pub struct PositionBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: String,
    #[serde(rename = "l")]
    pub locked: String,
}

/// Order as returned by `POST`/`GET /api/v3/order`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub status: String,
    pub executed_qty: String,
    pub cummulative_quote_qty: String,
    #[serde(default)]
    pub transact_time: Option<i64>,
    #[serde(default)]
    pub update_time: Option<i64>,
}

impl OrderResponse {
    pub fn to_report(&self) -> Result<OrderReport> {
        let instrument = codec::instrument_from_concatenated(VENUE, &self.symbol)?;
        let filled = codec::decimal(VENUE, "executedQty", &self.executed_qty)?;
        let quote = codec::decimal(VENUE, "cummulativeQuoteQty", &self.cummulative_quote_qty)?;
        let mut report = OrderReport::new(instrument, order_status(&self.status)?)
            .with_ids(
                Some(ClientOrderId::new(self.client_order_id.clone())),
                Some(VenueOrderId::new(self.order_id.to_string())),
            )
            .with_fill(filled, average_price(filled, quote));
        report.timestamp = self.update_time.or(self.transact_time).and_then(codec::millis);
        Ok(report)
    }
}

/// `GET /api/v3/account` response.
#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
pub struct AccountBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

impl AccountResponse {
    /// Non-empty balances.
    pub fn to_reports(&self) -> Result<Vec<BalanceReport>> {
        let mut reports = Vec::new();
        for balance in &self.balances {
            let free = codec::decimal(VENUE, "free", &balance.free)?;
            let locked = codec::decimal(VENUE, "locked", &balance.locked)?;
            if free.is_zero() && locked.is_zero() {
                continue;
            }
            reports.push(BalanceReport::new(balance.asset.as_str(), free, locked));
        }
        Ok(reports)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKeyResponse {
    pub listen_key: String,
}

/// `{"code":-2013,"msg":"Order does not exist."}`
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub code: i64,
    pub msg: String,
}

pub fn order_status(status: &str) -> Result<VenueOrderStatus> {
    Ok(match status {
        "NEW" | "PENDING_NEW" | "PENDING_CANCEL" => VenueOrderStatus::New,
        "PARTIALLY_FILLED" => VenueOrderStatus::PartiallyFilled,
        "FILLED" => VenueOrderStatus::Filled,
        "CANCELED" => VenueOrderStatus::Canceled,
        "REJECTED" => VenueOrderStatus::Rejected,
        "EXPIRED" | "EXPIRED_IN_MATCH" => VenueOrderStatus::Expired,
        other => return Err(Error::normalization(VENUE, format!("unknown order status '{other}'"))),
    })
}

fn average_price(filled: Decimal, quote: Decimal) -> Option<Decimal> {
    (filled > Decimal::ZERO).then(|| quote / filled)
}

/// Translates Binance public and user-data frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinanceNormalizer;

impl BinanceNormalizer {
    fn trade(event: TradeEvent) -> Result<VenueEvent> {
        let instrument = codec::instrument_from_concatenated(VENUE, &event.symbol)?;
        let side = if event.buyer_is_maker {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        Ok(VenueEvent::new(
            Topic::trades(VENUE, instrument),
            codec::millis(event.trade_time),
            EventPayload::Trade(Trade {
                price: codec::decimal(VENUE, "p", &event.price)?,
                quantity: codec::decimal(VENUE, "q", &event.quantity)?,
                side: Some(side),
                trade_id: Some(event.trade_id.to_string()),
            }),
        ))
    }

    fn depth(event: DepthUpdateEvent) -> Result<VenueEvent> {
        let instrument = codec::instrument_from_concatenated(VENUE, &event.symbol)?;
        Ok(VenueEvent::new(
            Topic::book(VENUE, instrument),
            codec::millis(event.event_time),
            EventPayload::OrderBookDelta(BookDelta {
                bids: codec::string_levels(VENUE, &event.bids)?,
                asks: codec::string_levels(VENUE, &event.asks)?,
                sequence: Some(BookSequence::Range {
                    first: event.first_update_id,
                    last: event.final_update_id,
                }),
            }),
        ))
    }

    fn snapshot(snapshot: DepthSnapshot, instrument: InstrumentId) -> Result<VenueEvent> {
        Ok(VenueEvent::new(
            Topic::book(VENUE, instrument),
            None,
            EventPayload::OrderBookSnapshot(BookSnapshot {
                bids: codec::string_levels(VENUE, &snapshot.bids)?,
                asks: codec::string_levels(VENUE, &snapshot.asks)?,
                sequence: Some(snapshot.last_update_id),
            }),
        ))
    }

    fn execution(report: ExecutionReport) -> Result<VenueEvent> {
        let instrument = codec::instrument_from_concatenated(VENUE, &report.symbol)?;
        let client_id = if report.original_client_order_id.is_empty() {
            report.client_order_id
        } else {
            report.original_client_order_id
        };
        let filled = codec::decimal(VENUE, "z", &report.cumulative_quantity)?;
        let quote = codec::decimal(VENUE, "Z", &report.cumulative_quote)?;
        let last_quantity = codec::decimal(VENUE, "l", &report.last_quantity)?;
        let timestamp = codec::millis(report.transaction_time);

        let mut order = OrderReport::new(instrument, order_status(&report.status)?)
            .with_ids(
                Some(ClientOrderId::new(client_id)),
                Some(VenueOrderId::new(report.order_id.to_string())),
            )
            .with_fill(filled, average_price(filled, quote));
        if last_quantity > Decimal::ZERO {
            order.last_fill_price = Some(codec::decimal(VENUE, "L", &report.last_price)?);
        }
        if !report.reject_reason.is_empty() && report.reject_reason != "NONE" {
            order.reason = Some(report.reject_reason);
        }
        order.timestamp = timestamp;
        Ok(VenueEvent::new(
            Topic::orders(VENUE),
            timestamp,
            EventPayload::OrderUpdate(order),
        ))
    }

    fn account(position: AccountPosition) -> Result<Vec<VenueEvent>> {
        let timestamp = codec::millis(position.event_time);
        position
            .balances
            .into_iter()
            .map(|balance| {
                Ok(VenueEvent::new(
                    Topic::balances(VENUE),
                    timestamp,
                    EventPayload::BalanceUpdate(BalanceReport::new(
                        balance.asset.as_str(),
                        codec::decimal(VENUE, "f", &balance.free)?,
                        codec::decimal(VENUE, "l", &balance.locked)?,
                    )),
                ))
            })
            .collect()
    }
}

impl Normalizer for BinanceNormalizer {
    fn venue(&self) -> Venue {
        VENUE
    }

    fn normalize(&self, frame: &RawFrame) -> Result<Vec<VenueEvent>> {
        let value: Value = serde_json::from_str(&frame.body)
            .map_err(|e| Error::normalization(VENUE, e.to_string()))?;
        let invalid = |e: serde_json::Error| Error::normalization(VENUE, e.to_string());

        if value.get("e").is_some() {
            let event: StreamEvent = serde_json::from_value(value).map_err(invalid)?;
            return match event {
                StreamEvent::Trade(trade) => Ok(vec![Self::trade(trade)?]),
                StreamEvent::DepthUpdate(depth) => Ok(vec![Self::depth(depth)?]),
                StreamEvent::ExecutionReport(report) => Ok(vec![Self::execution(report)?]),
                StreamEvent::AccountPosition(position) => Self::account(position),
                StreamEvent::Other => Ok(Vec::new()),
            };
        }
        if value.get("lastUpdateId").is_some() {
            let instrument = frame.context.clone().ok_or_else(|| {
                Error::normalization(VENUE, "depth snapshot without requested instrument")
            })?;
            let snapshot: DepthSnapshot = serde_json::from_value(value).map_err(invalid)?;
            return Ok(vec![Self::snapshot(snapshot, instrument)?]);
        }
        if let Some(error) = value.get("error") {
            return Err(Error::normalization(VENUE, format!("stream error: {error}")));
        }
        // Subscription acks ({"result":null,"id":n}) and anything else
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn normalize(body: &str) -> Result<Vec<VenueEvent>> {
        BinanceNormalizer.normalize(&RawFrame::new(VENUE, body))
    }

    fn btc() -> InstrumentId {
        InstrumentId::new("BTC", "USDT")
    }

    #[test]
    fn test_trade_maps_aggressor_side() {
        let events = normalize(
            r#"{"e":"trade","E":1700000000001,"s":"BTCUSDT","t":42,"p":"100.50","q":"0.2","T":1700000000000,"m":true}"#,
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, Topic::trades(VENUE, btc()));
        assert_eq!(events[0].timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
        match &events[0].payload {
            EventPayload::Trade(trade) => {
                assert_eq!(trade.price, dec!(100.50));
                assert_eq!(trade.quantity, dec!(0.2));
                assert_eq!(trade.side, Some(OrderSide::Sell));
                assert_eq!(trade.trade_id.as_deref(), Some("42"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_depth_update_carries_range() {
        let events = normalize(
            r#"{"e":"depthUpdate","E":1700000000000,"s":"BTCUSDT","U":157,"u":160,"b":[["100.0","1.5"]],"a":[["101.0","0"]]}"#,
        )
        .unwrap();
        match &events[0].payload {
            EventPayload::OrderBookDelta(delta) => {
                assert_eq!(delta.sequence, Some(BookSequence::Range { first: 157, last: 160 }));
                assert_eq!(delta.bids[0].quantity, dec!(1.5));
                assert!(delta.asks[0].quantity.is_zero());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_rest_snapshot_needs_context() {
        let body = r#"{"lastUpdateId":1027024,"bids":[["4.00","431.00"]],"asks":[["4.01","12"]]}"#;
        assert!(normalize(body).is_err());

        let frame = RawFrame::new(VENUE, body).with_context(btc());
        let events = BinanceNormalizer.normalize(&frame).unwrap();
        assert_eq!(events[0].topic, Topic::book(VENUE, btc()));
        match &events[0].payload {
            EventPayload::OrderBookSnapshot(snapshot) => {
                assert_eq!(snapshot.sequence, Some(1_027_024));
                assert_eq!(snapshot.asks.len(), 1);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_execution_report_fill() {
        let events = normalize(
            r#"{"e":"executionReport","E":1,"s":"BTCUSDT","c":"abc","S":"BUY","o":"LIMIT","X":"PARTIALLY_FILLED","x":"TRADE","i":9001,"z":"0.4","Z":"40.4","L":"101","l":"0.4","r":"NONE","T":1700000000000,"C":""}"#,
        )
        .unwrap();
        assert_eq!(events[0].topic, Topic::orders(VENUE));
        match &events[0].payload {
            EventPayload::OrderUpdate(report) => {
                assert_eq!(report.client_order_id, Some(ClientOrderId::new("abc")));
                assert_eq!(report.venue_order_id, Some(VenueOrderId::new("9001")));
                assert_eq!(report.status, VenueOrderStatus::PartiallyFilled);
                assert_eq!(report.filled_quantity, Some(dec!(0.4)));
                assert_eq!(report.average_price, Some(dec!(101)));
                assert_eq!(report.last_fill_price, Some(dec!(101)));
                assert_eq!(report.reason, None);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_cancel_report_uses_original_client_id() {
        let events = normalize(
            r#"{"e":"executionReport","E":1,"s":"BTCUSDT","c":"cancel-req","C":"abc","X":"CANCELED","i":9001,"z":"0","Z":"0","L":"0","l":"0","r":"NONE","T":1}"#,
        )
        .unwrap();
        match &events[0].payload {
            EventPayload::OrderUpdate(report) => {
                assert_eq!(report.client_order_id, Some(ClientOrderId::new("abc")));
                assert_eq!(report.status, VenueOrderStatus::Canceled);
                assert_eq!(report.average_price, None);
                assert_eq!(report.last_fill_price, None);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_account_position_emits_one_event_per_asset() {
        let events = normalize(
            r#"{"e":"outboundAccountPosition","E":1,"u":1,"B":[{"a":"BTC","f":"1.5","l":"0.5"},{"a":"USDT","f":"100","l":"0"}]}"#,
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        match &events[0].payload {
            EventPayload::BalanceUpdate(balance) => {
                assert_eq!(balance.asset.as_str(), "BTC");
                assert_eq!(balance.locked, dec!(0.5));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_acks_and_unknown_events_are_empty() {
        assert!(normalize(r#"{"result":null,"id":1}"#).unwrap().is_empty());
        assert!(normalize(r#"{"e":"listenKeyExpired","E":1}"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_frames_fail() {
        assert!(normalize("not json").is_err());
        assert!(normalize(r#"{"e":"trade","s":"BTCUSDT"}"#).is_err());
        assert!(normalize(r#"{"e":"trade","E":1,"s":"XYZ","t":1,"p":"1","q":"1","T":1,"m":false}"#).is_err());
    }

    #[test]
    fn test_order_response_report() {
        let response: OrderResponse = serde_json::from_str(
            r#"{"symbol":"BTCUSDT","orderId":28,"clientOrderId":"abc","price":"100","origQty":"1","executedQty":"0.5","cummulativeQuoteQty":"50","status":"PARTIALLY_FILLED","transactTime":1507725176595}"#,
        )
        .unwrap();
        let report = response.to_report().unwrap();
        assert_eq!(report.venue_order_id, Some(VenueOrderId::new("28")));
        assert_eq!(report.average_price, Some(dec!(100)));
        assert_eq!(report.status, VenueOrderStatus::PartiallyFilled);
    }

    #[test]
    fn test_account_response_skips_empty_balances() {
        let account: AccountResponse = serde_json::from_str(
            r#"{"balances":[{"asset":"BTC","free":"0.1","locked":"0"},{"asset":"LTC","free":"0","locked":"0"}]}"#,
        )
        .unwrap();
        let reports = account.to_reports().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].asset.as_str(), "BTC");
    }
}
