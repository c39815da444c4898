//! Shared REST transport for venue APIs.
//!
//! Every request is charged against the venue's rate limiter before it is
//! sent, runs under the venue's request timeout, and has its failure mode
//! classified so callers can tell a request that never left from one whose
//! effect at the venue is unknown:
//!
//! - connect failures are [`Error::Transport`]
//! - timeouts, mid-request drops and 5xx answers on side-effecting requests
//!   are [`Error::AmbiguousOutcome`]
//! - HTTP 429 and 418 are [`Error::RateLimited`] carrying `Retry-After`
//!
//! Anything else is handed back raw for venue-specific interpretation.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client as HttpClient, Method, StatusCode};
use tracing::{debug, warn};

use crate::domain::{RateCategory, Venue};
use crate::error::{Error, Result};
use crate::infrastructure::config::venue::VenueConfig;
use crate::infrastructure::rate_limit::RateLimiter;

/// Retry hint used when a throttled response carries no `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// One request against a venue's REST API.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub path: String,
    /// Already encoded query string, without the leading `?`.
    pub query: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
    pub category: RateCategory,
}

impl RestRequest {
    pub fn new(method: Method, path: impl Into<String>, category: RateCategory) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            headers: Vec::new(),
            body: None,
            category,
        }
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn json_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether repeating or losing this request could change venue state.
    #[must_use]
    pub fn is_side_effecting(&self) -> bool {
        self.method != Method::GET
    }

    /// Path plus query, as signed by venues that sign the request target.
    #[must_use]
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Response handed back for venue-specific interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Rate-limited HTTP client bound to one venue's base URL.
pub struct RestClient {
    venue: Venue,
    http: HttpClient,
    base_url: String,
    limiter: RateLimiter,
}

impl RestClient {
    /// Build a client from venue settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn from_config(config: &VenueConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.request_timeout())
            .build()?;
        Ok(Self::new(
            config.kind,
            http,
            config.rest_url(),
            RateLimiter::from_config(config),
        ))
    }

    pub fn new(venue: Venue, http: HttpClient, base_url: &str, limiter: RateLimiter) -> Self {
        Self {
            venue,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
        }
    }

    #[must_use]
    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Host name of the base URL, lower case. Signed into some venues' payloads.
    #[must_use]
    pub fn host(&self) -> String {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_default()
    }

    /// Send a request after rate-limit admission and classify its outcome.
    pub async fn send(&self, request: RestRequest) -> Result<RawResponse> {
        self.limiter.acquire(request.category).await?;

        let url = format!("{}{}", self.base_url, request.target());
        let side_effecting = request.is_side_effecting();
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Transport(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Transport(format!("invalid header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        debug!(venue = %self.venue, method = %request.method, path = %request.path, "Sending REST request");
        let response = builder
            .send()
            .await
            .map_err(|e| classify_send_error(&e, side_effecting))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        if let Some(err) = classify_status(status, retry_after, request.category, side_effecting) {
            warn!(venue = %self.venue, status = status.as_u16(), path = %request.path, error = %err, "REST request failed");
            return Err(err);
        }

        // The venue has answered; a body lost from here on is still ambiguous for writes.
        let body = response
            .text()
            .await
            .map_err(|e| classify_send_error(&e, side_effecting))?;
        Ok(RawResponse {
            status: status.as_u16(),
            body,
        })
    }
}

fn classify_send_error(err: &reqwest::Error, side_effecting: bool) -> Error {
    if err.is_connect() || err.is_builder() {
        return Error::Transport(err.to_string());
    }
    if side_effecting {
        Error::AmbiguousOutcome(err.to_string())
    } else {
        Error::Transport(err.to_string())
    }
}

/// Map a status code to the error it implies, if any.
fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    category: RateCategory,
    side_effecting: bool,
) -> Option<Error> {
    match status.as_u16() {
        429 | 418 => Some(Error::RateLimited {
            category,
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
        }),
        500..=599 if side_effecting => Some(Error::AmbiguousOutcome(format!(
            "venue answered {status} to a side-effecting request"
        ))),
        500..=599 => Some(Error::Transport(format!("venue answered {status}"))),
        _ => None,
    }
}

/// `Retry-After` in delta-seconds. HTTP dates are not used by supported venues.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Percent-encode a query component (RFC 3986 unreserved set kept).
#[must_use]
pub fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Join key/value pairs into an encoded query string, in the given order.
#[must_use]
pub fn encode_query<K: AsRef<str>, V: AsRef<str>>(params: &[(K, V)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k.as_ref()), encode_component(v.as_ref())))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_statuses_are_rate_limited() {
        for code in [429, 418] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status(status, Some(Duration::from_secs(7)), RateCategory::Order, true)
                .unwrap();
            match err {
                Error::RateLimited {
                    category,
                    retry_after,
                } => {
                    assert_eq!(category, RateCategory::Order);
                    assert_eq!(retry_after, Duration::from_secs(7));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_missing_retry_after_uses_default() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, None, RateCategory::Query, false)
            .unwrap();
        assert!(matches!(
            err,
            Error::RateLimited { retry_after, .. } if retry_after == DEFAULT_RETRY_AFTER
        ));
    }

    #[test]
    fn test_server_error_ambiguous_only_for_writes() {
        let status = StatusCode::BAD_GATEWAY;
        assert!(classify_status(status, None, RateCategory::Order, true)
            .unwrap()
            .is_ambiguous());
        assert!(matches!(
            classify_status(status, None, RateCategory::Query, false),
            Some(Error::Transport(_))
        ));
    }

    #[test]
    fn test_client_errors_are_returned_raw() {
        assert!(classify_status(StatusCode::BAD_REQUEST, None, RateCategory::Order, true).is_none());
        assert!(classify_status(StatusCode::UNAUTHORIZED, None, RateCategory::Order, true).is_none());
        assert!(classify_status(StatusCode::OK, None, RateCategory::Order, true).is_none());
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_encode_query_keeps_order_and_escapes() {
        let query = encode_query(&[("symbol", "BTCUSDT"), ("Timestamp", "2024-01-01T00:00:00")]);
        assert_eq!(query, "symbol=BTCUSDT&Timestamp=2024-01-01T00%3A00%3A00");
        assert_eq!(encode_component("a b"), "a%20b");
    }

    #[test]
    fn test_request_target_and_side_effects() {
        let get = RestRequest::new(Method::GET, "/api/v3/order", RateCategory::Query).query("a=1");
        assert_eq!(get.target(), "/api/v3/order?a=1");
        assert!(!get.is_side_effecting());
        let post = RestRequest::new(Method::POST, "/api/v3/order", RateCategory::Order);
        assert_eq!(post.target(), "/api/v3/order");
        assert!(post.is_side_effecting());
    }
}
