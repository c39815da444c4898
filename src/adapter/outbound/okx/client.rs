//! OKX REST client for signed trade and account endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;

use super::auth::{self, OkxAuth};
use super::message::{AccountData, OrderAck, OrderData, RestEnvelope};
use crate::adapter::outbound::codec;
use crate::adapter::outbound::http::{encode_query, RawResponse, RestClient, RestRequest};
use crate::domain::{
    BalanceReport, InstrumentId, Order, OrderLocator, OrderReport, OrderSide, OrderType,
    RateCategory, Venue, VenueOrderId,
};
use crate::error::{Error, Result};
use crate::port::{BatchCancel, OrderApi, PlaceAck, QueryOutcome};

const VENUE: Venue = Venue::Okx;

/// Most orders one batch cancel accepts.
const BATCH_CANCEL_LIMIT: usize = 20;

/// Envelope codes of a batch call that carry per-item results: all, some or none succeeded.
const BATCH_RESULT_CODES: [&str; 3] = ["0", "1", "2"];

/// Order does not exist.
const UNKNOWN_ORDER_CODE: &str = "51603";

/// Key, timestamp, signature and passphrase failures.
const AUTH_ERROR_CODES: [&str; 4] = ["50105", "50111", "50112", "50113"];

pub struct OkxClient {
    rest: Arc<RestClient>,
    auth: OkxAuth,
}

impl OkxClient {
    pub fn new(rest: Arc<RestClient>, auth: OkxAuth) -> Self {
        Self { rest, auth }
    }

    async fn signed(
        &self,
        method: Method,
        path: &str,
        category: RateCategory,
        query: String,
        body: Option<String>,
    ) -> Result<RestEnvelope> {
        let mut request = RestRequest::new(method, path, category).query(query);
        let timestamp = auth::rest_timestamp(Utc::now());
        let headers = self.auth.headers(
            &timestamp,
            request.method.as_str(),
            &request.target(),
            body.as_deref().unwrap_or_default(),
        );
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.json_body(body);
        }
        let response = self.rest.send(request).await?;
        envelope(&response)
    }
}

fn envelope(response: &RawResponse) -> Result<RestEnvelope> {
    match serde_json::from_str::<RestEnvelope>(&response.body) {
        Ok(envelope) => Ok(envelope),
        Err(_) if response.status == 401 => Err(Error::Auth {
            venue: VENUE,
            reason: response.body.clone(),
        }),
        Err(_) => Err(Error::rejected(
            response.status.to_string(),
            response.body.clone(),
        )),
    }
}

fn envelope_error(envelope: &RestEnvelope) -> Error {
    if AUTH_ERROR_CODES.contains(&envelope.code.as_str()) {
        return Error::Auth {
            venue: VENUE,
            reason: format!("{}: {}", envelope.code, envelope.msg),
        };
    }
    // Batch-style endpoints report the real cause per item
    let item = envelope
        .data
        .first()
        .and_then(|data| serde_json::from_value::<OrderAck>(data.clone()).ok())
        .filter(|ack| !ack.s_code.is_empty() && ack.s_code != "0");
    match item {
        Some(ack) => Error::rejected(ack.s_code, ack.s_msg),
        None => Error::rejected(envelope.code.clone(), envelope.msg.clone()),
    }
}

fn checked(envelope: RestEnvelope) -> Result<RestEnvelope> {
    if envelope.code == "0" {
        Ok(envelope)
    } else {
        Err(envelope_error(&envelope))
    }
}

fn locator_body(order: &OrderLocator) -> serde_json::Value {
    let mut body = json!({
        "instId": codec::dashed(&order.instrument),
        "clOrdId": order.client_order_id.to_string(),
    });
    if let Some(id) = &order.venue_order_id {
        body["ordId"] = json!(id.to_string());
    }
    body
}

/// Per-order outcome of one batch cancel call.
fn batch_outcome(envelope: RestEnvelope, requested: &[OrderLocator]) -> Result<BatchCancel> {
    if !BATCH_RESULT_CODES.contains(&envelope.code.as_str()) || envelope.data.is_empty() {
        return Err(envelope_error(&envelope));
    }
    let acks = envelope
        .data
        .into_iter()
        .map(serde_json::from_value::<OrderAck>)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut batch = BatchCancel::default();
    for order in requested {
        let id = order.client_order_id.clone();
        match acks.iter().find(|ack| ack.cl_ord_id == id.as_str()) {
            Some(ack) if ack.s_code == "0" => batch.accepted.push(id),
            Some(ack) => batch.refused.push((id, format!("{}: {}", ack.s_code, ack.s_msg))),
            None => batch.unknown.push(id),
        }
    }
    Ok(batch)
}

fn place_body(order: &Order) -> serde_json::Value {
    let side = match order.side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    };
    let mut body = json!({
        "instId": codec::dashed(&order.instrument),
        "tdMode": "cash",
        "clOrdId": order.client_order_id.to_string(),
        "side": side,
        "sz": order.quantity.normalize().to_string(),
    });
    match (order.order_type, order.price) {
        (OrderType::Limit, Some(price)) => {
            body["ordType"] = json!("limit");
            body["px"] = json!(price.normalize().to_string());
        }
        _ => {
            body["ordType"] = json!("market");
            // Spot market buys default to quote sizing
            if order.side == OrderSide::Buy {
                body["tgtCcy"] = json!("base_ccy");
            }
        }
    }
    body
}

#[async_trait]
impl OrderApi for OkxClient {
    fn venue(&self) -> Venue {
        VENUE
    }

    async fn place_order(&self, order: &Order) -> Result<PlaceAck> {
        let envelope = self
            .signed(
                Method::POST,
                "/api/v5/trade/order",
                RateCategory::Order,
                String::new(),
                Some(place_body(order).to_string()),
            )
            .await
            .map_err(|e| match e {
                Error::VenueRejected { .. } => {
                    Error::AmbiguousOutcome(format!("unreadable order response: {e}"))
                }
                other => other,
            })?;
        let envelope = checked(envelope)?;
        let ack = envelope
            .data
            .into_iter()
            .next()
            .map(serde_json::from_value::<OrderAck>)
            .transpose()
            .map_err(|e| Error::AmbiguousOutcome(format!("unreadable order ack: {e}")))?;
        Ok(PlaceAck {
            venue_order_id: ack
                .filter(|ack| !ack.ord_id.is_empty())
                .map(|ack| VenueOrderId::new(ack.ord_id)),
            report: None,
        })
    }

    async fn cancel_order(&self, order: &OrderLocator) -> Result<()> {
        let envelope = self
            .signed(
                Method::POST,
                "/api/v5/trade/cancel-order",
                RateCategory::Order,
                String::new(),
                Some(locator_body(order).to_string()),
            )
            .await?;
        checked(envelope).map(|_| ())
    }

    async fn query_order(&self, order: &OrderLocator) -> Result<QueryOutcome> {
        let query = encode_query(&[
            ("instId", codec::dashed(&order.instrument)),
            ("clOrdId", order.client_order_id.to_string()),
        ]);
        let envelope = self
            .signed(
                Method::GET,
                "/api/v5/trade/order",
                RateCategory::Query,
                query,
                None,
            )
            .await?;
        if envelope.code == UNKNOWN_ORDER_CODE {
            return Ok(QueryOutcome::NotFound);
        }
        let envelope = checked(envelope)?;
        let Some(data) = envelope.data.into_iter().next() else {
            return Ok(QueryOutcome::NotFound);
        };
        let order: OrderData = serde_json::from_value(data)?;
        Ok(QueryOutcome::Found(order.to_report()?))
    }

    async fn open_orders(&self, instrument: &InstrumentId) -> Result<Vec<OrderReport>> {
        let query = encode_query(&[
            ("instType", "SPOT".to_string()),
            ("instId", codec::dashed(instrument)),
        ]);
        let envelope = self
            .signed(
                Method::GET,
                "/api/v5/trade/orders-pending",
                RateCategory::Query,
                query,
                None,
            )
            .await?;
        let envelope = checked(envelope)?;
        envelope
            .data
            .into_iter()
            .map(|data| serde_json::from_value::<OrderData>(data)?.to_report())
            .collect()
    }

    async fn cancel_orders(&self, orders: &[OrderLocator]) -> Result<BatchCancel> {
        let mut batch = BatchCancel::default();
        for chunk in orders.chunks(BATCH_CANCEL_LIMIT) {
            let body: Vec<_> = chunk.iter().map(locator_body).collect();
            let envelope = self
                .signed(
                    Method::POST,
                    "/api/v5/trade/cancel-batch-orders",
                    RateCategory::Order,
                    String::new(),
                    Some(serde_json::Value::from(body).to_string()),
                )
                .await?;
            batch.merge(batch_outcome(envelope, chunk)?);
        }
        Ok(batch)
    }

    async fn balances(&self) -> Result<Vec<BalanceReport>> {
        let envelope = self
            .signed(
                Method::GET,
                "/api/v5/account/balance",
                RateCategory::Query,
                String::new(),
                None,
            )
            .await?;
        let envelope = checked(envelope)?;
        let mut reports = Vec::new();
        for data in envelope.data {
            let account: AccountData = serde_json::from_value(data)?;
            for detail in &account.details {
                reports.push(detail.to_report()?);
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{ClientOrderId, InstrumentId, OrderSpec};

    fn order(spec: &OrderSpec) -> Order {
        Order::new(spec, ClientOrderId::new("b1"), Utc::now())
    }

    #[test]
    fn test_limit_body() {
        let spec = OrderSpec::limit(
            VENUE,
            InstrumentId::new("BTC", "USDT"),
            OrderSide::Sell,
            dec!(0.50),
            dec!(30000.0),
        );
        let body = place_body(&order(&spec));
        assert_eq!(body["instId"], "BTC-USDT");
        assert_eq!(body["tdMode"], "cash");
        assert_eq!(body["ordType"], "limit");
        assert_eq!(body["px"], "30000");
        assert_eq!(body["sz"], "0.5");
        assert!(body.get("tgtCcy").is_none());
    }

    #[test]
    fn test_market_buy_sized_in_base() {
        let spec = OrderSpec::market(
            VENUE,
            InstrumentId::new("BTC", "USDT"),
            OrderSide::Buy,
            dec!(1),
        );
        let body = place_body(&order(&spec));
        assert_eq!(body["ordType"], "market");
        assert_eq!(body["tgtCcy"], "base_ccy");
    }

    #[test]
    fn test_item_code_preferred_over_envelope_code() {
        let envelope: RestEnvelope = serde_json::from_str(
            r#"{"code":"1","msg":"Operation failed.","data":[{"clOrdId":"b1","ordId":"","sCode":"51008","sMsg":"Insufficient balance"}]}"#,
        )
        .unwrap();
        match checked(envelope).unwrap_err() {
            Error::VenueRejected { code, message } => {
                assert_eq!(code, "51008");
                assert_eq!(message, "Insufficient balance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_auth_codes() {
        let envelope: RestEnvelope =
            serde_json::from_str(r#"{"code":"50113","msg":"Invalid Sign","data":[]}"#).unwrap();
        assert!(checked(envelope).unwrap_err().is_auth());
    }

    #[test]
    fn test_batch_cancel_partial_success() {
        let locator = |id: &str| OrderLocator {
            client_order_id: ClientOrderId::new(id),
            venue_order_id: None,
            instrument: InstrumentId::new("BTC", "USDT"),
        };
        let requested = [locator("b1"), locator("b2"), locator("b3")];
        let envelope: RestEnvelope = serde_json::from_str(
            r#"{"code":"2","msg":"","data":[{"clOrdId":"b1","ordId":"11","sCode":"0","sMsg":""},{"clOrdId":"b2","ordId":"12","sCode":"51400","sMsg":"Cancellation failed as the order has been filled"}]}"#,
        )
        .unwrap();

        let batch = batch_outcome(envelope, &requested).unwrap();
        assert_eq!(batch.accepted, vec![ClientOrderId::new("b1")]);
        assert_eq!(batch.refused[0].0, ClientOrderId::new("b2"));
        assert!(batch.refused[0].1.starts_with("51400"));
        assert_eq!(batch.unknown, vec![ClientOrderId::new("b3")]);

        let envelope: RestEnvelope =
            serde_json::from_str(r#"{"code":"50113","msg":"Invalid Sign","data":[]}"#).unwrap();
        assert!(batch_outcome(envelope, &requested).unwrap_err().is_auth());
    }
}
