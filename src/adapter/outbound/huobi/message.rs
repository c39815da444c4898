//! Huobi wire messages.
//!
//! Market frames arrive gzip-compressed and are routed by `ch` (pushes) or
//! `rep` (request replies). The v2 private stream sends plain JSON tagged by
//! `action`. REST responses wrap results in `{"status":"ok","data":..}`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::adapter::outbound::codec;
use crate::domain::{
    BalanceReport, BookDelta, BookSequence, BookSnapshot, ClientOrderId, EventPayload,
    InstrumentId, OrderLocator, OrderReport, OrderSide, Topic, Trade, Venue, VenueEvent,
    VenueOrderId, VenueOrderStatus,
};
use crate::error::{Error, Result};
use crate::port::{BatchCancel, Normalizer, RawFrame};

const VENUE: Venue = Venue::Huobi;

/// Book depth channel used for increments and snapshot requests.
pub const MBP_LEVELS: u32 = 150;

pub const ORDERS_CHANNEL: &str = "orders#*";
pub const ACCOUNTS_CHANNEL: &str = "accounts.update#1";

/// `{"sub":..}`, `{"unsub":..}` or `{"req":..}` on the market stream.
#[derive(Debug, Serialize)]
pub struct MarketRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req: Option<String>,
    pub id: String,
}

/// `{"action":"sub","ch":..}` on the private stream.
#[derive(Debug, Serialize)]
pub struct ActionRequest<'a> {
    pub action: &'a str,
    pub ch: &'a str,
}

pub fn trade_channel(instrument: &InstrumentId) -> String {
    format!("market.{}.trade.detail", native_symbol(instrument))
}

pub fn mbp_channel(instrument: &InstrumentId) -> String {
    format!("market.{}.mbp.{MBP_LEVELS}", native_symbol(instrument))
}

/// `BTC/USDT` as `btcusdt`.
pub fn native_symbol(instrument: &InstrumentId) -> String {
    codec::concatenated(instrument).to_ascii_lowercase()
}

/// Market ping `{"ping":ts}`.
#[derive(Debug, Deserialize)]
pub struct MarketPing {
    pub ping: u64,
}

/// Private ping `{"action":"ping","data":{"ts":..}}`.
#[derive(Debug, Deserialize)]
pub struct ActionPing {
    pub action: String,
    pub data: PingData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingData {
    pub ts: u64,
}

/// Reply to a private `req`/`sub`, including the auth handshake.
#[derive(Debug, Deserialize)]
pub struct ActionReply {
    pub action: String,
    #[serde(default)]
    pub ch: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TradeTick {
    pub data: Vec<TradeDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDetail {
    #[serde(default)]
    pub trade_id: Option<u64>,
    pub ts: i64,
    pub amount: Number,
    pub price: Number,
    pub direction: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MbpTick {
    pub seq_num: u64,
    #[serde(default)]
    pub prev_seq_num: Option<u64>,
    #[serde(default)]
    pub bids: Vec<[Number; 2]>,
    #[serde(default)]
    pub asks: Vec<[Number; 2]>,
}

#[derive(Debug, Deserialize)]
pub struct PrivatePush {
    pub ch: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPush {
    pub event_type: String,
    pub symbol: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<u64>,
    pub order_status: String,
    #[serde(default)]
    pub trade_price: Option<String>,
    #[serde(default)]
    pub exec_amt: Option<String>,
    #[serde(default)]
    pub trade_time: Option<i64>,
    #[serde(default)]
    pub last_act_time: Option<i64>,
    #[serde(default)]
    pub order_create_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPush {
    pub currency: String,
    #[serde(default)]
    pub balance: Option<String>,
    #[serde(default)]
    pub available: Option<String>,
    #[serde(default)]
    pub change_time: Option<i64>,
}

/// REST envelope.
#[derive(Debug, Deserialize)]
pub struct RestEnvelope {
    pub status: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(rename = "err-code", default)]
    pub err_code: Option<String>,
    #[serde(rename = "err-msg", default)]
    pub err_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderDetail {
    pub id: u64,
    pub symbol: String,
    #[serde(rename = "client-order-id", default)]
    pub client_order_id: Option<String>,
    pub state: String,
    #[serde(rename = "field-amount", alias = "filled-amount")]
    pub filled_amount: String,
    #[serde(rename = "field-cash-amount", alias = "filled-cash-amount")]
    pub filled_cash_amount: String,
    #[serde(rename = "created-at", default)]
    pub created_at: Option<i64>,
    #[serde(rename = "finished-at", default)]
    pub finished_at: Option<i64>,
}

impl OrderDetail {
    pub fn to_report(&self) -> Result<OrderReport> {
        let instrument = codec::instrument_from_concatenated(VENUE, &self.symbol)?;
        let filled = codec::decimal(VENUE, "field-amount", &self.filled_amount)?;
        let cash = codec::decimal(VENUE, "field-cash-amount", &self.filled_cash_amount)?;
        let average = (filled > Decimal::ZERO).then(|| cash / filled);
        let mut report = OrderReport::new(instrument, order_status(&self.state)?)
            .with_ids(
                self.client_order_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .map(ClientOrderId::new),
                Some(VenueOrderId::new(self.id.to_string())),
            )
            .with_fill(filled, average);
        report.timestamp = self
            .finished_at
            .filter(|ts| *ts > 0)
            .or(self.created_at)
            .and_then(codec::millis);
        Ok(report)
    }
}

/// `data` of `POST /v1/order/orders/batchcancel`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchCancelData {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failed: Vec<BatchCancelFailure>,
}

#[derive(Debug, Deserialize)]
pub struct BatchCancelFailure {
    #[serde(rename = "client-order-id", default)]
    pub client_order_id: Option<String>,
    #[serde(rename = "err-code", default)]
    pub err_code: Option<String>,
    #[serde(rename = "err-msg", default)]
    pub err_msg: Option<String>,
}

impl BatchCancelData {
    /// Outcome per requested order; ids the venue does not mention stay unknown.
    pub fn to_batch(&self, requested: &[OrderLocator]) -> BatchCancel {
        let mut batch = BatchCancel::default();
        for order in requested {
            let id = order.client_order_id.clone();
            if self.success.iter().any(|s| s == id.as_str()) {
                batch.accepted.push(id);
            } else if let Some(failure) = self
                .failed
                .iter()
                .find(|f| f.client_order_id.as_deref() == Some(id.as_str()))
            {
                let reason = format!(
                    "{}: {}",
                    failure.err_code.as_deref().unwrap_or_default(),
                    failure.err_msg.as_deref().unwrap_or_default()
                );
                batch.refused.push((id, reason));
            } else {
                batch.unknown.push(id);
            }
        }
        batch
    }
}

#[derive(Debug, Deserialize)]
pub struct BalanceList {
    pub list: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceEntry {
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub balance: String,
}

impl BalanceList {
    /// Merge `trade` (available) and `frozen` (locked) rows per currency.
    pub fn to_reports(&self) -> Result<Vec<BalanceReport>> {
        let mut merged: BTreeMap<&str, (Decimal, Decimal)> = BTreeMap::new();
        for entry in &self.list {
            let amount = codec::decimal(VENUE, "balance", &entry.balance)?;
            let slot = merged.entry(entry.currency.as_str()).or_default();
            match entry.kind.as_str() {
                "trade" => slot.0 += amount,
                "frozen" => slot.1 += amount,
                _ => {}
            }
        }
        Ok(merged
            .into_iter()
            .filter(|(_, (available, locked))| !available.is_zero() || !locked.is_zero())
            .map(|(currency, (available, locked))| BalanceReport::new(currency, available, locked))
            .collect())
    }
}

pub fn order_status(state: &str) -> Result<VenueOrderStatus> {
    Ok(match state {
        "created" | "submitted" | "canceling" | "pre-submitted" => VenueOrderStatus::New,
        "partial-filled" => VenueOrderStatus::PartiallyFilled,
        "filled" => VenueOrderStatus::Filled,
        "canceled" | "partial-canceled" => VenueOrderStatus::Canceled,
        "rejected" => VenueOrderStatus::Rejected,
        other => return Err(Error::normalization(VENUE, format!("unknown order state '{other}'"))),
    })
}

/// Split `market.<symbol>.<rest>`.
fn market_channel(ch: &str) -> Option<(&str, &str)> {
    ch.strip_prefix("market.")?.split_once('.')
}

/// Translates Huobi market and private v2 frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct HuobiNormalizer;

impl HuobiNormalizer {
    fn market_push(ch: &str, ts: Option<i64>, tick: Value) -> Result<Vec<VenueEvent>> {
        let Some((symbol, rest)) = market_channel(ch) else {
            return Ok(Vec::new());
        };
        let instrument = codec::instrument_from_concatenated(VENUE, symbol)?;
        let invalid = |e: serde_json::Error| Error::normalization(VENUE, format!("{ch}: {e}"));

        if rest == "trade.detail" {
            let tick: TradeTick = serde_json::from_value(tick).map_err(invalid)?;
            return tick
                .data
                .into_iter()
                .map(|trade| Self::trade(&instrument, trade))
                .collect();
        }
        if rest.starts_with("mbp.") {
            let tick: MbpTick = serde_json::from_value(tick).map_err(invalid)?;
            let prev = tick.prev_seq_num.ok_or_else(|| {
                Error::normalization(VENUE, format!("{ch}: increment without prevSeqNum"))
            })?;
            return Ok(vec![VenueEvent::new(
                Topic::book(VENUE, instrument),
                ts.and_then(codec::millis),
                EventPayload::OrderBookDelta(BookDelta {
                    bids: codec::number_levels(VENUE, &tick.bids)?,
                    asks: codec::number_levels(VENUE, &tick.asks)?,
                    sequence: Some(BookSequence::Linked {
                        prev,
                        last: tick.seq_num,
                    }),
                }),
            )]);
        }
        Ok(Vec::new())
    }

    fn trade(instrument: &InstrumentId, trade: TradeDetail) -> Result<VenueEvent> {
        let side = match trade.direction.as_str() {
            "buy" => Some(OrderSide::Buy),
            "sell" => Some(OrderSide::Sell),
            _ => None,
        };
        Ok(VenueEvent::new(
            Topic::trades(VENUE, instrument.clone()),
            codec::millis(trade.ts),
            EventPayload::Trade(Trade {
                price: codec::decimal_number(VENUE, "price", &trade.price)?,
                quantity: codec::decimal_number(VENUE, "amount", &trade.amount)?,
                side,
                trade_id: trade.trade_id.map(|id| id.to_string()),
            }),
        ))
    }

    fn snapshot_reply(rep: &str, ts: Option<i64>, data: Value) -> Result<Vec<VenueEvent>> {
        let Some((symbol, rest)) = market_channel(rep) else {
            return Ok(Vec::new());
        };
        if !rest.starts_with("mbp.") {
            return Ok(Vec::new());
        }
        let instrument = codec::instrument_from_concatenated(VENUE, symbol)?;
        let tick: MbpTick = serde_json::from_value(data)
            .map_err(|e| Error::normalization(VENUE, format!("{rep}: {e}")))?;
        Ok(vec![VenueEvent::new(
            Topic::book(VENUE, instrument),
            ts.and_then(codec::millis),
            EventPayload::OrderBookSnapshot(BookSnapshot {
                bids: codec::number_levels(VENUE, &tick.bids)?,
                asks: codec::number_levels(VENUE, &tick.asks)?,
                sequence: Some(tick.seq_num),
            }),
        )])
    }

    fn private_push(push: PrivatePush) -> Result<Vec<VenueEvent>> {
        let invalid = |e: serde_json::Error| Error::normalization(VENUE, format!("{}: {e}", push.ch));
        if push.ch.starts_with("orders#") {
            let order: OrderPush = serde_json::from_value(push.data.clone()).map_err(invalid)?;
            return Ok(vec![Self::order(order)?]);
        }
        if push.ch.starts_with("accounts.update") {
            let account: AccountPush = serde_json::from_value(push.data.clone()).map_err(invalid)?;
            return Self::account(account);
        }
        Ok(Vec::new())
    }

    fn order(push: OrderPush) -> Result<VenueEvent> {
        let instrument = codec::instrument_from_concatenated(VENUE, &push.symbol)?;
        let mut report = OrderReport::new(instrument, order_status(&push.order_status)?).with_ids(
            push.client_order_id
                .filter(|id| !id.is_empty())
                .map(ClientOrderId::new),
            push.order_id.map(|id| VenueOrderId::new(id.to_string())),
        );
        report.filled_quantity = codec::optional_decimal(VENUE, "execAmt", push.exec_amt.as_deref())?;
        if push.event_type == "trade" {
            report.last_fill_price =
                codec::optional_decimal(VENUE, "tradePrice", push.trade_price.as_deref())?;
        }
        report.timestamp = push
            .trade_time
            .or(push.last_act_time)
            .or(push.order_create_time)
            .and_then(codec::millis);
        Ok(VenueEvent::new(
            Topic::orders(VENUE),
            report.timestamp,
            EventPayload::OrderUpdate(report),
        ))
    }

    fn account(push: AccountPush) -> Result<Vec<VenueEvent>> {
        // Mode 1 pushes carry both totals; a partial push cannot be split
        let (Some(balance), Some(available)) = (push.balance, push.available) else {
            return Ok(Vec::new());
        };
        let total = codec::decimal(VENUE, "balance", &balance)?;
        let available = codec::decimal(VENUE, "available", &available)?;
        Ok(vec![VenueEvent::new(
            Topic::balances(VENUE),
            push.change_time.and_then(codec::millis),
            EventPayload::BalanceUpdate(BalanceReport::new(
                push.currency.as_str(),
                available,
                total - available,
            )),
        )])
    }
}

impl Normalizer for HuobiNormalizer {
    fn venue(&self) -> Venue {
        VENUE
    }

    fn normalize(&self, frame: &RawFrame) -> Result<Vec<VenueEvent>> {
        let mut value: Value = serde_json::from_str(&frame.body)
            .map_err(|e| Error::normalization(VENUE, e.to_string()))?;

        if let Some(action) = value.get("action").and_then(Value::as_str) {
            if action == "push" {
                let push: PrivatePush = serde_json::from_value(value)
                    .map_err(|e| Error::normalization(VENUE, e.to_string()))?;
                return Self::private_push(push);
            }
            if let Some(code) = value.get("code").and_then(Value::as_i64) {
                if code != 200 {
                    return Err(Error::normalization(
                        VENUE,
                        format!("{action} failed with code {code}: {}", value["message"]),
                    ));
                }
            }
            return Ok(Vec::new());
        }

        if value.get("status").and_then(Value::as_str) == Some("error") {
            return Err(Error::normalization(
                VENUE,
                format!("{}: {}", value["err-code"], value["err-msg"]),
            ));
        }

        let ts = value.get("ts").and_then(Value::as_i64);
        if let Some(rep) = value.get("rep").and_then(Value::as_str).map(str::to_string) {
            let data = value.get_mut("data").map(Value::take).unwrap_or(Value::Null);
            return Self::snapshot_reply(&rep, ts, data);
        }
        if let Some(ch) = value.get("ch").and_then(Value::as_str).map(str::to_string) {
            let tick = value.get_mut("tick").map(Value::take).unwrap_or(Value::Null);
            return Self::market_push(&ch, ts, tick);
        }
        // Subscription acks and pings
        Ok(Vec::new())
    }
}
