//! OKX v5 wire messages.
//!
//! Stream pushes carry `{"arg":{"channel":..},"data":[..]}`; control replies
//! carry `event`. REST responses wrap results as
//! `{"code":"0","msg":"","data":[..]}`.

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

const VENUE: Venue = Venue::Okx;

pub const TRADES_CHANNEL: &str = "trades";
pub const BOOKS_CHANNEL: &str = "books";
pub const ORDERS_CHANNEL: &str = "orders";
pub const ACCOUNT_CHANNEL: &str = "account";

/// Channel argument shared by subscribe requests and pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelArg {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_type: Option<String>,
}

impl ChannelArg {
    pub fn instrument(channel: &str, instrument: &InstrumentId) -> Self {
        Self {
            channel: channel.to_string(),
            inst_id: Some(codec::dashed(instrument)),
            inst_type: None,
        }
    }

    pub fn account(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            inst_id: None,
            inst_type: (channel == ORDERS_CHANNEL).then(|| "SPOT".to_string()),
        }
    }
}

/// `{"op":..,"args":[..]}`.
#[derive(Debug, Serialize)]
pub struct OpRequest<T> {
    pub op: &'static str,
    pub args: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginArg {
    pub api_key: String,
    pub passphrase: String,
    pub timestamp: String,
    pub sign: String,
}

/// Control reply: `subscribe`, `unsubscribe`, `login` or `error`.
#[derive(Debug, Deserialize)]
pub struct EventReply {
    pub event: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Push {
    pub arg: ChannelArg,
    #[serde(default)]
    pub action: Option<String>,
    pub data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeData {
    pub inst_id: String,
    pub trade_id: String,
    pub px: String,
    pub sz: String,
    pub side: String,
    pub ts: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookData {
    #[serde(default)]
    pub asks: Vec<Vec<String>>,
    #[serde(default)]
    pub bids: Vec<Vec<String>>,
    pub ts: String,
    #[serde(default)]
    pub seq_id: Option<i64>,
    #[serde(default)]
    pub prev_seq_id: Option<i64>,
}

/// Order state as returned by both the `orders` channel and REST queries.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    pub inst_id: String,
    #[serde(default)]
    pub ord_id: String,
    #[serde(default)]
    pub cl_ord_id: String,
    pub state: String,
    #[serde(default)]
    pub acc_fill_sz: String,
    #[serde(default)]
    pub avg_px: String,
    #[serde(default)]
    pub fill_px: String,
    #[serde(default)]
    pub fill_sz: String,
    #[serde(default)]
    pub u_time: String,
}

impl OrderData {
    pub fn to_report(&self) -> Result<OrderReport> {
        let instrument = codec::instrument_from_dashed(VENUE, &self.inst_id)?;
        let mut report = OrderReport::new(instrument, order_status(&self.state)?).with_ids(
            (!self.cl_ord_id.is_empty()).then(|| ClientOrderId::new(self.cl_ord_id.as_str())),
            (!self.ord_id.is_empty()).then(|| VenueOrderId::new(self.ord_id.as_str())),
        );
        report.filled_quantity =
            codec::optional_decimal(VENUE, "accFillSz", Some(self.acc_fill_sz.as_str()))?;
        report.average_price = codec::optional_decimal(VENUE, "avgPx", Some(self.avg_px.as_str()))?
            .filter(|px| !px.is_zero());
        let fill_size = codec::optional_decimal(VENUE, "fillSz", Some(self.fill_sz.as_str()))?;
        if fill_size.is_some_and(|sz| sz > Decimal::ZERO) {
            report.last_fill_price =
                codec::optional_decimal(VENUE, "fillPx", Some(self.fill_px.as_str()))?;
        }
        report.timestamp = codec::millis_str(&self.u_time);
        Ok(report)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    #[serde(default)]
    pub u_time: String,
    #[serde(default)]
    pub details: Vec<AccountDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetail {
    pub ccy: String,
    #[serde(default)]
    pub avail_bal: String,
    #[serde(default)]
    pub frozen_bal: String,
}

impl AccountDetail {
    pub fn to_report(&self) -> Result<BalanceReport> {
        let available = codec::optional_decimal(VENUE, "availBal", Some(self.avail_bal.as_str()))?;
        let locked = codec::optional_decimal(VENUE, "frozenBal", Some(self.frozen_bal.as_str()))?;
        Ok(BalanceReport::new(
            self.ccy.as_str(),
            available.unwrap_or_default(),
            locked.unwrap_or_default(),
        ))
    }
}

/// REST envelope.
#[derive(Debug, Deserialize)]
pub struct RestEnvelope {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Vec<Value>,
}

/// Per-order result inside a place or cancel response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    #[serde(default)]
    pub cl_ord_id: String,
    #[serde(default)]
    pub ord_id: String,
    #[serde(default)]
    pub s_code: String,
    #[serde(default)]
    pub s_msg: String,
}

pub fn order_status(state: &str) -> Result<VenueOrderStatus> {
    Ok(match state {
        "live" => VenueOrderStatus::New,
        "partially_filled" => VenueOrderStatus::PartiallyFilled,
        "filled" => VenueOrderStatus::Filled,
        "canceled" | "mmp_canceled" => VenueOrderStatus::Canceled,
        other => return Err(Error::normalization(VENUE, format!("unknown order state '{other}'"))),
    })
}

/// Translates OKX public and private stream frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct OkxNormalizer;

impl OkxNormalizer {
    fn trade(data: Value) -> Result<VenueEvent> {
        let trade: TradeData = serde_json::from_value(data)
            .map_err(|e| Error::normalization(VENUE, format!("trade: {e}")))?;
        let side = match trade.side.as_str() {
            "buy" => Some(OrderSide::Buy),
            "sell" => Some(OrderSide::Sell),
            _ => None,
        };
        Ok(VenueEvent::new(
            Topic::trades(VENUE, codec::instrument_from_dashed(VENUE, &trade.inst_id)?),
            codec::millis_str(&trade.ts),
            EventPayload::Trade(Trade {
                price: codec::decimal(VENUE, "px", &trade.px)?,
                quantity: codec::decimal(VENUE, "sz", &trade.sz)?,
                side,
                trade_id: Some(trade.trade_id),
            }),
        ))
    }

    fn book(instrument: &InstrumentId, action: Option<&str>, data: Value) -> Result<VenueEvent> {
        let book: BookData = serde_json::from_value(data)
            .map_err(|e| Error::normalization(VENUE, format!("books: {e}")))?;
        let bids = codec::string_levels(VENUE, &book.bids)?;
        let asks = codec::string_levels(VENUE, &book.asks)?;
        let seq = |value: Option<i64>, field: &str| {
            value
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| Error::normalization(VENUE, format!("books: missing {field}")))
        };
        let payload = match action {
            Some("snapshot") => EventPayload::OrderBookSnapshot(BookSnapshot {
                bids,
                asks,
                sequence: book.seq_id.and_then(|v| u64::try_from(v).ok()),
            }),
            Some("update") => EventPayload::OrderBookDelta(BookDelta {
                bids,
                asks,
                sequence: Some(BookSequence::Linked {
                    prev: seq(book.prev_seq_id, "prevSeqId")?,
                    last: seq(book.seq_id, "seqId")?,
                }),
            }),
            other => {
                return Err(Error::normalization(
                    VENUE,
                    format!("books: unknown action {other:?}"),
                ))
            }
        };
        Ok(VenueEvent::new(
            Topic::book(VENUE, instrument.clone()),
            codec::millis_str(&book.ts),
            payload,
        ))
    }

    fn order(data: Value) -> Result<VenueEvent> {
        let order: OrderData = serde_json::from_value(data)
            .map_err(|e| Error::normalization(VENUE, format!("orders: {e}")))?;
        let report = order.to_report()?;
        Ok(VenueEvent::new(
            Topic::orders(VENUE),
            report.timestamp,
            EventPayload::OrderUpdate(report),
        ))
    }

    fn account(data: Value) -> Result<Vec<VenueEvent>> {
        let account: AccountData = serde_json::from_value(data)
            .map_err(|e| Error::normalization(VENUE, format!("account: {e}")))?;
        let timestamp = codec::millis_str(&account.u_time);
        account
            .details
            .iter()
            .map(|detail| {
                Ok(VenueEvent::new(
                    Topic::balances(VENUE),
                    timestamp,
                    EventPayload::BalanceUpdate(detail.to_report()?),
                ))
            })
            .collect()
    }
}

impl Normalizer for OkxNormalizer {
    fn venue(&self) -> Venue {
        VENUE
    }

    fn normalize(&self, frame: &RawFrame) -> Result<Vec<VenueEvent>> {
        if frame.body == "pong" {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_str(&frame.body)
            .map_err(|e| Error::normalization(VENUE, e.to_string()))?;

        if value.get("event").is_some() {
            let reply: EventReply = serde_json::from_value(value)
                .map_err(|e| Error::normalization(VENUE, e.to_string()))?;
            if reply.event == "error" {
                return Err(Error::normalization(
                    VENUE,
                    format!(
                        "{}: {}",
                        reply.code.unwrap_or_default(),
                        reply.msg.unwrap_or_default()
                    ),
                ));
            }
            return Ok(Vec::new());
        }
        if value.get("data").is_none() {
            return Ok(Vec::new());
        }

        let push: Push =
            serde_json::from_value(value).map_err(|e| Error::normalization(VENUE, e.to_string()))?;
        match push.arg.channel.as_str() {
            TRADES_CHANNEL => push.data.into_iter().map(Self::trade).collect(),
            BOOKS_CHANNEL => {
                let inst_id = push.arg.inst_id.as_deref().ok_or_else(|| {
                    Error::normalization(VENUE, "books push without instId")
                })?;
                let instrument = codec::instrument_from_dashed(VENUE, inst_id)?;
                push.data
                    .into_iter()
                    .map(|data| Self::book(&instrument, push.action.as_deref(), data))
                    .collect()
            }
            ORDERS_CHANNEL => push.data.into_iter().map(Self::order).collect(),
            ACCOUNT_CHANNEL => {
                let mut events = Vec::new();
                for data in push.data {
                    events.extend(Self::account(data)?);
                }
                Ok(events)
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn normalize(body: &str) -> Result<Vec<VenueEvent>> {
        OkxNormalizer.normalize(&RawFrame::new(VENUE, body))
    }

    fn btc() -> InstrumentId {
        InstrumentId::new("BTC", "USDT")
    }

    #[test]
    fn test_subscribe_request_shape() {
        let request = OpRequest {
            op: "subscribe",
            args: vec![
                ChannelArg::instrument(BOOKS_CHANNEL, &btc()),
                ChannelArg::account(ORDERS_CHANNEL),
            ],
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"op":"subscribe","args":[{"channel":"books","instId":"BTC-USDT"},{"channel":"orders","instType":"SPOT"}]}"#
        );
    }

    #[test]
    fn test_trade_push() {
        let events = normalize(
            r#"{"arg":{"channel":"trades","instId":"BTC-USDT"},"data":[{"instId":"BTC-USDT","tradeId":"130639474","px":"42219.9","sz":"0.12060306","side":"sell","ts":"1630048897897","count":"3"}]}"#,
        )
        .unwrap();
        assert_eq!(events[0].topic, Topic::trades(VENUE, btc()));
        match &events[0].payload {
            EventPayload::Trade(trade) => {
                assert_eq!(trade.price, dec!(42219.9));
                assert_eq!(trade.side, Some(OrderSide::Sell));
                assert_eq!(trade.trade_id.as_deref(), Some("130639474"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_book_snapshot_and_update() {
        let snapshot = normalize(
            r#"{"arg":{"channel":"books","instId":"BTC-USDT"},"action":"snapshot","data":[{"asks":[["8476.98","415","0","13"]],"bids":[["8476.97","256","0","12"]],"ts":"1597026383085","checksum":-855196043,"prevSeqId":-1,"seqId":123456}]}"#,
        )
        .unwrap();
        match &snapshot[0].payload {
            EventPayload::OrderBookSnapshot(book) => {
                assert_eq!(book.sequence, Some(123_456));
                assert_eq!(book.asks[0].quantity, dec!(415));
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let update = normalize(
            r#"{"arg":{"channel":"books","instId":"BTC-USDT"},"action":"update","data":[{"asks":[["8476.98","0","0","0"]],"bids":[],"ts":"1597026383086","checksum":1,"prevSeqId":123456,"seqId":123457}]}"#,
        )
        .unwrap();
        match &update[0].payload {
            EventPayload::OrderBookDelta(delta) => {
                assert_eq!(
                    delta.sequence,
                    Some(BookSequence::Linked {
                        prev: 123_456,
                        last: 123_457
                    })
                );
                assert_eq!(delta.asks[0].quantity, Decimal::ZERO);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_order_push() {
        let events = normalize(
            r#"{"arg":{"channel":"orders","instType":"SPOT","uid":"1"},"data":[{"instType":"SPOT","instId":"BTC-USDT","ordId":"312269865356374016","clOrdId":"b1","px":"30000","sz":"1","ordType":"limit","side":"buy","fillPx":"29999.5","fillSz":"0.4","accFillSz":"0.4","avgPx":"29999.5","state":"partially_filled","uTime":"1597026383085","cTime":"1597026383085"}]}"#,
        )
        .unwrap();
        match &events[0].payload {
            EventPayload::OrderUpdate(report) => {
                assert_eq!(report.client_order_id, Some(ClientOrderId::new("b1")));
                assert_eq!(report.status, VenueOrderStatus::PartiallyFilled);
                assert_eq!(report.filled_quantity, Some(dec!(0.4)));
                assert_eq!(report.average_price, Some(dec!(29999.5)));
                assert_eq!(report.last_fill_price, Some(dec!(29999.5)));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_account_push_emits_each_currency() {
        let events = normalize(
            r#"{"arg":{"channel":"account"},"data":[{"uTime":"1597026383085","totalEq":"1","details":[{"ccy":"USDT","availBal":"100","frozenBal":"5"},{"ccy":"BTC","availBal":"1","frozenBal":""}]}]}"#,
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        match &events[1].payload {
            EventPayload::BalanceUpdate(balance) => {
                assert_eq!(balance.asset.as_str(), "BTC");
                assert_eq!(balance.locked, Decimal::ZERO);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_control_frames() {
        assert!(normalize("pong").unwrap().is_empty());
        assert!(normalize(r#"{"event":"subscribe","arg":{"channel":"trades","instId":"BTC-USDT"},"connId":"a4d3ae55"}"#)
            .unwrap()
            .is_empty());
        assert!(normalize(r#"{"event":"error","code":"60012","msg":"Invalid request","connId":"a4d3ae55"}"#).is_err());
    }

    #[test]
    fn test_unknown_state_fails() {
        assert!(order_status("live").is_ok());
        assert!(order_status("exploded").is_err());
    }
}
