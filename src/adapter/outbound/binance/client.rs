//! Binance REST API client: depth snapshots, user-data listen keys and
//! signed order endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use tracing::{debug, info};

use super::auth::{BinanceAuth, API_KEY_HEADER};
use super::message::{AccountResponse, ErrorResponse, ListenKeyResponse, OrderResponse};
use crate::adapter::outbound::codec;
use crate::adapter::outbound::http::{encode_query, RawResponse, RestClient, RestRequest};
use crate::domain::{
    BalanceReport, InstrumentId, Order, OrderLocator, OrderReport, OrderSide, OrderType,
    RateCategory, Venue, VenueOrderId,
};
use crate::error::{Error, Result};
use crate::port::{OrderApi, PlaceAck, QueryOutcome};

const VENUE: Venue = Venue::Binance;

/// Depth requested for REST snapshots.
const SNAPSHOT_DEPTH: u32 = 1_000;

/// Error codes meaning the order is unknown to the venue.
const UNKNOWN_ORDER_CODES: [i64; 2] = [-2013, -2011];

/// Error codes meaning the API key or signature was refused.
const AUTH_ERROR_CODES: [i64; 3] = [-2014, -2015, -1022];

pub struct BinanceClient {
    rest: Arc<RestClient>,
    auth: Option<BinanceAuth>,
}

impl BinanceClient {
    pub fn new(rest: Arc<RestClient>, auth: Option<BinanceAuth>) -> Self {
        Self { rest, auth }
    }

    fn auth(&self) -> Result<&BinanceAuth> {
        self.auth.as_ref().ok_or(Error::TradingDisabled(VENUE))
    }

    /// Raw `GET /api/v3/depth` body for one instrument.
    pub async fn depth_snapshot(&self, instrument: &InstrumentId) -> Result<String> {
        let query = encode_query(&[
            ("symbol", codec::concatenated(instrument)),
            ("limit", SNAPSHOT_DEPTH.to_string()),
        ]);
        let request =
            RestRequest::new(Method::GET, "/api/v3/depth", RateCategory::MarketData).query(query);
        let response = self.rest.send(request).await?;
        interpret(response)
    }

    /// Open a user-data stream.
    pub async fn create_listen_key(&self) -> Result<String> {
        let auth = self.auth()?;
        let request = RestRequest::new(Method::POST, "/api/v3/userDataStream", RateCategory::Query)
            .header(API_KEY_HEADER, auth.api_key());
        let body = interpret(self.rest.send(request).await?)?;
        let parsed: ListenKeyResponse = serde_json::from_str(&body)?;
        info!(venue = %VENUE, "User data stream opened");
        Ok(parsed.listen_key)
    }

    /// Extend a listen key's validity by another hour.
    pub async fn keepalive_listen_key(&self, listen_key: &str) -> Result<()> {
        let auth = self.auth()?;
        let request = RestRequest::new(Method::PUT, "/api/v3/userDataStream", RateCategory::Query)
            .query(encode_query(&[("listenKey", listen_key)]))
            .header(API_KEY_HEADER, auth.api_key());
        interpret(self.rest.send(request).await?)?;
        debug!(venue = %VENUE, "Listen key refreshed");
        Ok(())
    }

    /// Close a user-data stream on the venue side.
    pub async fn delete_listen_key(&self, listen_key: &str) -> Result<()> {
        let auth = self.auth()?;
        let request = RestRequest::new(Method::DELETE, "/api/v3/userDataStream", RateCategory::Query)
            .query(encode_query(&[("listenKey", listen_key)]))
            .header(API_KEY_HEADER, auth.api_key());
        interpret(self.rest.send(request).await?)?;
        info!(venue = %VENUE, "User data stream closed");
        Ok(())
    }

    async fn signed(
        &self,
        method: Method,
        path: &str,
        category: RateCategory,
        params: &[(&str, String)],
    ) -> Result<RawResponse> {
        let auth = self.auth()?;
        let query = auth.signed_query(params, Utc::now().timestamp_millis());
        let request = RestRequest::new(method, path, category)
            .query(query)
            .header(API_KEY_HEADER, auth.api_key());
        self.rest.send(request).await
    }
}

fn locator_params(order: &OrderLocator) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", codec::concatenated(&order.instrument)),
        ("origClientOrderId", order.client_order_id.to_string()),
    ];
    if let Some(id) = &order.venue_order_id {
        params.push(("orderId", id.to_string()));
    }
    params
}

fn open_order_reports(body: &str) -> Result<Vec<OrderReport>> {
    let orders: Vec<OrderResponse> = serde_json::from_str(body)?;
    orders.iter().map(OrderResponse::to_report).collect()
}

fn error_code(response: &RawResponse) -> Option<i64> {
    serde_json::from_str::<ErrorResponse>(&response.body)
        .ok()
        .map(|e| e.code)
}

/// Successful body, or the venue error it carries.
fn interpret(response: RawResponse) -> Result<String> {
    if response.is_success() {
        return Ok(response.body);
    }
    Err(venue_error(&response))
}

fn venue_error(response: &RawResponse) -> Error {
    match serde_json::from_str::<ErrorResponse>(&response.body) {
        Ok(error) if AUTH_ERROR_CODES.contains(&error.code) || response.status == 401 => {
            Error::Auth {
                venue: VENUE,
                reason: format!("{}: {}", error.code, error.msg),
            }
        }
        Ok(error) => Error::rejected(error.code.to_string(), error.msg),
        Err(_) if response.status == 401 => Error::Auth {
            venue: VENUE,
            reason: response.body.clone(),
        },
        Err(_) => Error::rejected(response.status.to_string(), response.body.clone()),
    }
}

#[async_trait]
impl OrderApi for BinanceClient {
    fn venue(&self) -> Venue {
        VENUE
    }

    async fn place_order(&self, order: &Order) -> Result<PlaceAck> {
        let side = match order.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let mut params = vec![
            ("symbol", codec::concatenated(&order.instrument)),
            ("side", side.to_string()),
            ("quantity", order.quantity.normalize().to_string()),
            ("newClientOrderId", order.client_order_id.to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        match (order.order_type, order.price) {
            (OrderType::Limit, Some(price)) => {
                params.push(("type", "LIMIT".to_string()));
                params.push(("timeInForce", "GTC".to_string()));
                params.push(("price", price.normalize().to_string()));
            }
            _ => params.push(("type", "MARKET".to_string())),
        }

        let response = self
            .signed(Method::POST, "/api/v3/order", RateCategory::Order, &params)
            .await?;
        let body = interpret(response)?;
        let parsed: OrderResponse = serde_json::from_str(&body)
            .map_err(|e| Error::AmbiguousOutcome(format!("unreadable order response: {e}")))?;
        Ok(PlaceAck {
            venue_order_id: Some(VenueOrderId::new(parsed.order_id.to_string())),
            report: parsed.to_report().ok(),
        })
    }

    async fn cancel_order(&self, order: &OrderLocator) -> Result<()> {
        let response = self
            .signed(
                Method::DELETE,
                "/api/v3/order",
                RateCategory::Order,
                &locator_params(order),
            )
            .await?;
        interpret(response).map(|_| ())
    }

    async fn query_order(&self, order: &OrderLocator) -> Result<QueryOutcome> {
        let response = self
            .signed(
                Method::GET,
                "/api/v3/order",
                RateCategory::Query,
                &locator_params(order),
            )
            .await?;
        if !response.is_success()
            && error_code(&response).is_some_and(|code| UNKNOWN_ORDER_CODES.contains(&code))
        {
            return Ok(QueryOutcome::NotFound);
        }
        let body = interpret(response)?;
        let parsed: OrderResponse = serde_json::from_str(&body)?;
        Ok(QueryOutcome::Found(parsed.to_report()?))
    }

    async fn open_orders(&self, instrument: &InstrumentId) -> Result<Vec<OrderReport>> {
        let params = [("symbol", codec::concatenated(instrument))];
        let response = self
            .signed(Method::GET, "/api/v3/openOrders", RateCategory::Query, &params)
            .await?;
        open_order_reports(&interpret(response)?)
    }

    async fn balances(&self) -> Result<Vec<BalanceReport>> {
        let response = self
            .signed(Method::GET, "/api/v3/account", RateCategory::Query, &[])
            .await?;
        let body = interpret(response)?;
        let account: AccountResponse = serde_json::from_str(&body)?;
        account.to_reports()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClientOrderId;

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_auth_codes_map_to_auth_error() {
        let err = venue_error(&response(400, r#"{"code":-2015,"msg":"Invalid API-key"}"#));
        assert!(err.is_auth());
        let err = venue_error(&response(401, "Unauthorized"));
        assert!(err.is_auth());
    }

    #[test]
    fn test_other_codes_are_rejections() {
        let err = venue_error(&response(400, r#"{"code":-2010,"msg":"insufficient balance"}"#));
        match err {
            Error::VenueRejected { code, message } => {
                assert_eq!(code, "-2010");
                assert_eq!(message, "insufficient balance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_order_code_detected() {
        let missing = response(400, r#"{"code":-2013,"msg":"Order does not exist."}"#);
        assert!(error_code(&missing).is_some_and(|c| UNKNOWN_ORDER_CODES.contains(&c)));
        assert_eq!(error_code(&response(200, "{}")), None);
    }

    #[test]
    fn test_locator_params_include_venue_id_when_known() {
        let mut locator = OrderLocator {
            client_order_id: ClientOrderId::new("abc"),
            venue_order_id: None,
            instrument: InstrumentId::new("BTC", "USDT"),
        };
        assert_eq!(locator_params(&locator).len(), 2);
        locator.venue_order_id = Some(VenueOrderId::new("42"));
        let params = locator_params(&locator);
        assert_eq!(params[0], ("symbol", "BTCUSDT".to_string()));
        assert_eq!(params[2], ("orderId", "42".to_string()));
    }

    #[test]
    fn test_open_orders_become_reports() {
        let body = r#"[{"symbol":"BTCUSDT","orderId":28,"clientOrderId":"abc","price":"30000.00","origQty":"1.0","executedQty":"0.4","cummulativeQuoteQty":"12000.0","status":"PARTIALLY_FILLED","type":"LIMIT","side":"BUY","time":1499827319559,"updateTime":1499827319560}]"#;
        let reports = open_order_reports(body).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, crate::domain::VenueOrderStatus::PartiallyFilled);
        assert_eq!(reports[0].venue_order_id, Some(VenueOrderId::new("28")));
        assert_eq!(reports[0].filled_quantity, Some(rust_decimal_macros::dec!(0.4)));
        assert!(open_order_reports("[]").unwrap().is_empty());
    }
}
