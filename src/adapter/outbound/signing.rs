//! HMAC-SHA256 request signing shared by the venue auth schemes.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ConfigError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Keyed signer for one API secret. The key schedule is computed once.
#[derive(Clone)]
pub struct HmacSigner {
    mac: HmacSha256,
}

impl HmacSigner {
    /// # Errors
    ///
    /// Fails only if the secret cannot key an HMAC, which the configuration reports.
    pub fn new(secret: &str) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "api_secret",
                reason: e.to_string(),
            }
        })?;
        Ok(Self { mac })
    }

    #[must_use]
    pub fn sign(&self, payload: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Lowercase hex digest.
    #[must_use]
    pub fn sign_hex(&self, payload: &str) -> String {
        hex::encode(self.sign(payload))
    }

    /// Standard base64 digest.
    #[must_use]
    pub fn sign_base64(&self, payload: &str) -> String {
        STANDARD.encode(self.sign(payload))
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HmacSigner(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Published example from the Binance API documentation.
    const SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
    const QUERY: &str = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

    #[test]
    fn test_hex_signature_matches_known_vector() {
        let signer = HmacSigner::new(SECRET).unwrap();
        assert_eq!(
            signer.sign_hex(QUERY),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_base64_encodes_same_digest() {
        let signer = HmacSigner::new(SECRET).unwrap();
        let decoded = STANDARD.decode(signer.sign_base64(QUERY)).unwrap();
        assert_eq!(hex::encode(decoded), signer.sign_hex(QUERY));
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = HmacSigner::new("hunter2").unwrap();
        assert!(!format!("{signer:?}").contains("hunter2"));
    }
}
