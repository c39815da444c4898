//! Domain identifier types with proper encapsulation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Canonical instrument identifier in `BASE/QUOTE` form, upper case.
///
/// Each venue adapter maps it to and from its native symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create an instrument from its base and quote assets.
    pub fn new(base: &str, quote: &str) -> Self {
        Self(format!(
            "{}/{}",
            base.to_ascii_uppercase(),
            quote.to_ascii_uppercase()
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn base(&self) -> &str {
        self.0.split_once('/').map_or("", |(base, _)| base)
    }

    #[must_use]
    pub fn quote(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, quote)| quote)
    }
}

impl FromStr for InstrumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote))
                if !base.is_empty() && !quote.is_empty() && !quote.contains('/') =>
            {
                Ok(Self::new(base, quote))
            }
            _ => Err(Error::InvalidInstrument(s.to_string())),
        }
    }
}

impl TryFrom<String> for InstrumentId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<InstrumentId> for String {
    fn from(id: InstrumentId) -> Self {
        id.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asset code such as `BTC` or `USDT`, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Asset(String);

impl Asset {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().to_ascii_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Locally assigned order identifier.
///
/// Generated as a simple-form UUID v4: 32 lowercase hex characters, which
/// every supported venue accepts as a client order id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ClientOrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Venue-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueOrderId(String);

impl VenueOrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VenueOrderId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for VenueOrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque handle identifying one event bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_parse_normalizes_case() {
        let id: InstrumentId = "btc/usdt".parse().unwrap();
        assert_eq!(id.as_str(), "BTC/USDT");
        assert_eq!(id.base(), "BTC");
        assert_eq!(id.quote(), "USDT");
    }

    #[test]
    fn test_instrument_parse_rejects_malformed() {
        assert!("BTCUSDT".parse::<InstrumentId>().is_err());
        assert!("/USDT".parse::<InstrumentId>().is_err());
        assert!("BTC/".parse::<InstrumentId>().is_err());
        assert!("A/B/C".parse::<InstrumentId>().is_err());
    }

    #[test]
    fn test_client_order_id_generate_is_32_hex() {
        let id = ClientOrderId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, ClientOrderId::generate());
    }

    #[test]
    fn test_instrument_serde_uses_plain_string() {
        let id = InstrumentId::new("eth", "btc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ETH/BTC\"");
        let back: InstrumentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
