//! Binance request signing: HMAC-SHA256 hex over the query string, API key
//! in the `X-MBX-APIKEY` header.

use std::fmt;

use crate::adapter::outbound::http::encode_query;
use crate::adapter::outbound::signing::HmacSigner;
use crate::error::Result;
use crate::infrastructure::config::venue::Credentials;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Window in which the venue accepts a signed request.
const RECV_WINDOW_MS: u64 = 5_000;

#[derive(Clone)]
pub struct BinanceAuth {
    api_key: String,
    signer: HmacSigner,
}

impl BinanceAuth {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Ok(Self {
            api_key: credentials.api_key.clone(),
            signer: HmacSigner::new(&credentials.api_secret)?,
        })
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Encode `params`, append `recvWindow` and `timestamp`, then the signature.
    #[must_use]
    pub fn signed_query(&self, params: &[(&str, String)], timestamp_ms: i64) -> String {
        let mut all: Vec<(&str, String)> = params.to_vec();
        all.push(("recvWindow", RECV_WINDOW_MS.to_string()));
        all.push(("timestamp", timestamp_ms.to_string()));
        let query = encode_query(&all);
        let signature = self.signer.sign_hex(&query);
        format!("{query}&signature={signature}")
    }
}

impl fmt::Debug for BinanceAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceAuth")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}
