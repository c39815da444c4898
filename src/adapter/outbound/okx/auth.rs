//! OKX request signing.
//!
//! REST requests carry `OK-ACCESS-*` headers with a base64 HMAC-SHA256 over
//! `timestamp + METHOD + target + body`. Stream login signs
//! `timestamp + "GET" + "/users/self/verify"` with a seconds timestamp.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use super::message::LoginArg;
use crate::adapter::outbound::signing::HmacSigner;
use crate::domain::Venue;
use crate::error::{ConfigError, Result};
use crate::infrastructure::config::venue::Credentials;

pub const KEY_HEADER: &str = "OK-ACCESS-KEY";
pub const SIGN_HEADER: &str = "OK-ACCESS-SIGN";
pub const TIMESTAMP_HEADER: &str = "OK-ACCESS-TIMESTAMP";
pub const PASSPHRASE_HEADER: &str = "OK-ACCESS-PASSPHRASE";

const VERIFY_PATH: &str = "/users/self/verify";

/// REST timestamp, ISO 8601 with milliseconds.
#[must_use]
pub fn rest_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone)]
pub struct OkxAuth {
    api_key: String,
    passphrase: String,
    signer: HmacSigner,
}

impl OkxAuth {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let passphrase = credentials
            .passphrase
            .clone()
            .ok_or(ConfigError::MissingCredentials {
                venue: Venue::Okx,
                variable: "OKX_API_PASSPHRASE",
            })?;
        Ok(Self {
            api_key: credentials.api_key.clone(),
            passphrase,
            signer: HmacSigner::new(&credentials.api_secret)?,
        })
    }

    /// `OK-ACCESS-*` headers for one request.
    #[must_use]
    pub fn headers(
        &self,
        timestamp: &str,
        method: &str,
        target: &str,
        body: &str,
    ) -> Vec<(&'static str, String)> {
        let sign = self
            .signer
            .sign_base64(&format!("{timestamp}{method}{target}{body}"));
        vec![
            (KEY_HEADER, self.api_key.clone()),
            (SIGN_HEADER, sign),
            (TIMESTAMP_HEADER, timestamp.to_string()),
            (PASSPHRASE_HEADER, self.passphrase.clone()),
        ]
    }

    /// Login argument for the private stream.
    #[must_use]
    pub fn login(&self, unix_secs: i64) -> LoginArg {
        let timestamp = unix_secs.to_string();
        let sign = self
            .signer
            .sign_base64(&format!("{timestamp}GET{VERIFY_PATH}"));
        LoginArg {
            api_key: self.api_key.clone(),
            passphrase: self.passphrase.clone(),
            timestamp,
            sign,
        }
    }
}

impl fmt::Debug for OkxAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OkxAuth")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::error::Error;

    fn credentials(passphrase: Option<&str>) -> Credentials {
        Credentials {
            api_key: "985d5b66-57ce-40fb-b714-afc0b9787083".into(),
            api_secret: "9B6B8B8E2F4C4D0E".into(),
            passphrase: passphrase.map(str::to_string),
        }
    }

    #[test]
    fn test_passphrase_required() {
        let err = OkxAuth::new(&credentials(None)).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingCredentials { venue: Venue::Okx, .. })
        ));
    }

    #[test]
    fn test_rest_timestamp_has_millis() {
        let now = Utc.timestamp_millis_opt(1_607_418_537_715).unwrap();
        assert_eq!(rest_timestamp(now), "2020-12-08T09:08:57.715Z");
    }

    #[test]
    fn test_headers_sign_target_and_body() {
        let auth = OkxAuth::new(&credentials(Some("pass"))).unwrap();
        let headers = auth.headers(
            "2020-12-08T09:08:57.715Z",
            "POST",
            "/api/v5/trade/order",
            r#"{"instId":"BTC-USDT"}"#,
        );
        let expected = auth
            .signer
            .sign_base64(r#"2020-12-08T09:08:57.715ZPOST/api/v5/trade/order{"instId":"BTC-USDT"}"#);
        assert_eq!(headers[0], (KEY_HEADER, "985d5b66-57ce-40fb-b714-afc0b9787083".to_string()));
        assert_eq!(headers[1], (SIGN_HEADER, expected));
        assert_eq!(headers[3], (PASSPHRASE_HEADER, "pass".to_string()));
    }

    #[test]
    fn test_login_signs_verify_path() {
        let auth = OkxAuth::new(&credentials(Some("pass"))).unwrap();
        let login = auth.login(1_538_054_050);
        assert_eq!(login.timestamp, "1538054050");
        assert_eq!(login.sign, auth.signer.sign_base64("1538054050GET/users/self/verify"));
    }
}
