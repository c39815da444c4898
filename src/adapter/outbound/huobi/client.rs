//! Huobi REST client: spot account lookup and signed order endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::info;

use super::auth::{self, HuobiAuth};
use super::message::{AccountEntry, BalanceList, BatchCancelData, OrderDetail, RestEnvelope};
use crate::adapter::outbound::codec;
use crate::adapter::outbound::http::{RawResponse, RestClient, RestRequest};
use crate::domain::{
    BalanceReport, InstrumentId, Order, OrderLocator, OrderReport, OrderSide, OrderType,
    RateCategory, Venue, VenueOrderId,
};
use crate::error::{Error, Result};
use crate::port::{BatchCancel, OrderApi, PlaceAck, QueryOutcome};

const VENUE: Venue = Venue::Huobi;

/// Most client order ids one batch cancel accepts.
const BATCH_CANCEL_LIMIT: usize = 50;

/// Most orders one open-orders page returns.
const OPEN_ORDERS_PAGE: u32 = 500;

/// Error code for an order the venue has no record of.
const UNKNOWN_ORDER_CODE: &str = "base-record-invalid";

const AUTH_ERROR_CODES: [&str; 4] = [
    "api-signature-not-valid",
    "api-signature-check-failed",
    "login-required",
    "invalid-access-key",
];

pub struct HuobiClient {
    rest: Arc<RestClient>,
    auth: Option<HuobiAuth>,
    account_id: OnceCell<u64>,
}

impl HuobiClient {
    pub fn new(rest: Arc<RestClient>, auth: Option<HuobiAuth>) -> Self {
        Self {
            rest,
            auth,
            account_id: OnceCell::new(),
        }
    }

    fn auth(&self) -> Result<&HuobiAuth> {
        self.auth.as_ref().ok_or(Error::TradingDisabled(VENUE))
    }

    async fn signed(
        &self,
        method: Method,
        path: &str,
        category: RateCategory,
        params: &[(&str, String)],
        body: Option<String>,
    ) -> Result<RawResponse> {
        let auth = self.auth()?;
        let query = auth.signed_query(
            method.as_str(),
            &self.rest.host(),
            path,
            params,
            &auth::timestamp(Utc::now()),
        );
        let mut request = RestRequest::new(method, path, category).query(query);
        if let Some(body) = body {
            request = request.json_body(body);
        }
        self.rest.send(request).await
    }

    /// Spot account id, looked up once.
    async fn account_id(&self) -> Result<u64> {
        self.account_id
            .get_or_try_init(|| async {
                let response = self
                    .signed(
                        Method::GET,
                        "/v1/account/accounts",
                        RateCategory::Query,
                        &[],
                        None,
                    )
                    .await?;
                let accounts: Vec<AccountEntry> = interpret(response)?;
                let id = accounts
                    .into_iter()
                    .find(|account| account.kind == "spot")
                    .map(|account| account.id)
                    .ok_or_else(|| Error::rejected("no-spot-account", "no spot account found"))?;
                info!(venue = %VENUE, account_id = id, "Spot account resolved");
                Ok(id)
            })
            .await
            .copied()
    }
}

fn order_type(order: &Order) -> &'static str {
    match (order.side, order.order_type) {
        (OrderSide::Buy, OrderType::Limit) => "buy-limit",
        (OrderSide::Sell, OrderType::Limit) => "sell-limit",
        (OrderSide::Buy, OrderType::Market) => "buy-market",
        (OrderSide::Sell, OrderType::Market) => "sell-market",
    }
}

fn envelope(response: &RawResponse) -> Result<RestEnvelope> {
    serde_json::from_str(&response.body).map_err(|_| {
        if response.status == 401 {
            Error::Auth {
                venue: VENUE,
                reason: response.body.clone(),
            }
        } else {
            Error::rejected(response.status.to_string(), response.body.clone())
        }
    })
}

fn envelope_error(envelope: &RestEnvelope) -> Error {
    let code = envelope.err_code.clone().unwrap_or_default();
    let message = envelope.err_msg.clone().unwrap_or_default();
    if AUTH_ERROR_CODES.contains(&code.as_str()) {
        Error::Auth {
            venue: VENUE,
            reason: format!("{code}: {message}"),
        }
    } else {
        Error::rejected(code, message)
    }
}

/// Decode `data` from an `ok` envelope, or surface the venue error.
fn interpret<T: DeserializeOwned>(response: RawResponse) -> Result<T> {
    let envelope = envelope(&response)?;
    if envelope.status != "ok" {
        return Err(envelope_error(&envelope));
    }
    let data = envelope.data.unwrap_or_default();
    Ok(serde_json::from_value(data)?)
}

#[async_trait]
impl OrderApi for HuobiClient {
    fn venue(&self) -> Venue {
        VENUE
    }

    async fn place_order(&self, order: &Order) -> Result<PlaceAck> {
        let account_id = self.account_id().await?;
        let mut body = json!({
            "account-id": account_id.to_string(),
            "symbol": codec::concatenated(&order.instrument).to_ascii_lowercase(),
            "type": order_type(order),
            "amount": order.quantity.normalize().to_string(),
            "client-order-id": order.client_order_id.to_string(),
            "source": "spot-api",
        });
        if let (OrderType::Limit, Some(price)) = (order.order_type, order.price) {
            body["price"] = json!(price.normalize().to_string());
        }

        let response = self
            .signed(
                Method::POST,
                "/v1/order/orders/place",
                RateCategory::Order,
                &[],
                Some(body.to_string()),
            )
            .await?;
        let envelope = envelope(&response)
            .map_err(|e| Error::AmbiguousOutcome(format!("unreadable order response: {e}")))?;
        if envelope.status != "ok" {
            return Err(envelope_error(&envelope));
        }
        let venue_order_id = envelope
            .data
            .as_ref()
            .and_then(|data| data.as_str().map(str::to_string).or_else(|| Some(data.to_string())))
            .map(VenueOrderId::new);
        Ok(PlaceAck {
            venue_order_id,
            report: None,
        })
    }

    async fn cancel_order(&self, order: &OrderLocator) -> Result<()> {
        let body = json!({ "client-order-id": order.client_order_id.to_string() });
        let response = self
            .signed(
                Method::POST,
                "/v1/order/orders/submitCancelClientOrder",
                RateCategory::Order,
                &[],
                Some(body.to_string()),
            )
            .await?;
        let _: serde_json::Value = interpret(response)?;
        Ok(())
    }

    async fn query_order(&self, order: &OrderLocator) -> Result<QueryOutcome> {
        let response = self
            .signed(
                Method::GET,
                "/v1/order/orders/getClientOrder",
                RateCategory::Query,
                &[("clientOrderId", order.client_order_id.to_string())],
                None,
            )
            .await?;
        let envelope = envelope(&response)?;
        if envelope.status != "ok" {
            if envelope.err_code.as_deref() == Some(UNKNOWN_ORDER_CODE) {
                return Ok(QueryOutcome::NotFound);
            }
            return Err(envelope_error(&envelope));
        }
        let detail: OrderDetail = serde_json::from_value(envelope.data.unwrap_or_default())?;
        Ok(QueryOutcome::Found(detail.to_report()?))
    }

    async fn open_orders(&self, instrument: &InstrumentId) -> Result<Vec<OrderReport>> {
        let account_id = self.account_id().await?;
        let params = [
            ("account-id", account_id.to_string()),
            ("symbol", codec::concatenated(instrument).to_ascii_lowercase()),
            ("size", OPEN_ORDERS_PAGE.to_string()),
        ];
        let response = self
            .signed(Method::GET, "/v1/order/openOrders", RateCategory::Query, &params, None)
            .await?;
        let orders: Vec<OrderDetail> = interpret(response)?;
        orders.iter().map(OrderDetail::to_report).collect()
    }

    async fn cancel_orders(&self, orders: &[OrderLocator]) -> Result<BatchCancel> {
        let mut batch = BatchCancel::default();
        for chunk in orders.chunks(BATCH_CANCEL_LIMIT) {
            let ids: Vec<String> = chunk.iter().map(|o| o.client_order_id.to_string()).collect();
            let body = json!({ "client-order-ids": ids });
            let response = self
                .signed(
                    Method::POST,
                    "/v1/order/orders/batchcancel",
                    RateCategory::Order,
                    &[],
                    Some(body.to_string()),
                )
                .await?;
            let data: BatchCancelData = interpret(response)?;
            batch.merge(data.to_batch(chunk));
        }
        Ok(batch)
    }

    async fn balances(&self) -> Result<Vec<BalanceReport>> {
        let account_id = self.account_id().await?;
        let path = format!("/v1/account/accounts/{account_id}/balance");
        let response = self
            .signed(Method::GET, &path, RateCategory::Query, &[], None)
            .await?;
        let list: BalanceList = interpret(response)?;
        list.to_reports()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{ClientOrderId, InstrumentId, OrderSpec};

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_order_types() {
        let spec = OrderSpec::limit(
            VENUE,
            InstrumentId::new("ETH", "USDT"),
            OrderSide::Sell,
            dec!(1),
            dec!(100),
        );
        let mut order = Order::new(&spec, ClientOrderId::new("a1"), Utc::now());
        assert_eq!(order_type(&order), "sell-limit");
        order.side = OrderSide::Buy;
        order.order_type = OrderType::Market;
        assert_eq!(order_type(&order), "buy-market");
    }

    #[test]
    fn test_interpret_ok_envelope() {
        let accounts: Vec<AccountEntry> = interpret(response(
            200,
            r#"{"status":"ok","data":[{"id":100009,"type":"spot","subtype":"","state":"working"}]}"#,
        ))
        .unwrap();
        assert_eq!(accounts[0].id, 100_009);
    }

    #[test]
    fn test_interpret_error_envelope() {
        let err = interpret::<serde_json::Value>(response(
            200,
            r#"{"status":"error","err-code":"order-value-min-error","err-msg":"order value too small"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::VenueRejected { ref code, .. } if code == "order-value-min-error"));

        let err = interpret::<serde_json::Value>(response(
            200,
            r#"{"status":"error","err-code":"api-signature-not-valid","err-msg":"bad signature"}"#,
        ))
        .unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_batch_cancel_outcomes_per_order() {
        let locator = |id: &str| OrderLocator {
            client_order_id: ClientOrderId::new(id),
            venue_order_id: None,
            instrument: InstrumentId::new("BTC", "USDT"),
        };
        let requested = [locator("c1"), locator("c2"), locator("c3")];
        let data: BatchCancelData = interpret(response(
            200,
            r#"{"status":"ok","data":{"success":["c1"],"failed":[{"client-order-id":"c2","err-code":"order-orderstate-error","err-msg":"order state error","order-state":7}]}}"#,
        ))
        .unwrap();

        let batch = data.to_batch(&requested);
        assert_eq!(batch.accepted, vec![ClientOrderId::new("c1")]);
        assert_eq!(batch.refused.len(), 1);
        assert_eq!(batch.refused[0].0, ClientOrderId::new("c2"));
        assert!(batch.refused[0].1.starts_with("order-orderstate-error"));
        assert_eq!(batch.unknown, vec![ClientOrderId::new("c3")]);
    }

    #[test]
    fn test_open_orders_decode() {
        let orders: Vec<OrderDetail> = interpret(response(
            200,
            r#"{"status":"ok","data":[{"id":5454937,"symbol":"ethusdt","client-order-id":"c9","state":"partial-filled","filled-amount":"0.5","filled-cash-amount":"50","filled-fees":"0","amount":"1","price":"100","type":"buy-limit","created-at":1530604762277}]}"#,
        ))
        .unwrap();
        let report = orders[0].to_report().unwrap();
        assert_eq!(report.client_order_id, Some(ClientOrderId::new("c9")));
        assert_eq!(report.filled_quantity, Some(dec!(0.5)));
        assert_eq!(report.average_price, Some(dec!(100)));
    }
}
