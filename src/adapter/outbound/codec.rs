//! Wire-format helpers shared by the venue adapters: native symbols,
//! decimal fields and venue timestamps.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Number;

use crate::domain::{InstrumentId, PriceLevel, Venue};
use crate::error::{Error, Result};

/// Quote assets recognised when splitting concatenated symbols. A quote is
/// listed before any shorter quote it ends with.
const QUOTE_ASSETS: &[&str] = &[
    "FDUSD", "USDT", "USDC", "BUSD", "TUSD", "USDD", "HUSD", "EUR", "TRY", "BRL", "GBP", "BTC",
    "ETH", "BNB", "HT", "DAI",
];

/// `BTC/USDT` as `BTCUSDT`.
#[must_use]
pub fn concatenated(instrument: &InstrumentId) -> String {
    format!("{}{}", instrument.base(), instrument.quote())
}

/// `BTC/USDT` as `BTC-USDT`.
#[must_use]
pub fn dashed(instrument: &InstrumentId) -> String {
    format!("{}-{}", instrument.base(), instrument.quote())
}

/// Split a concatenated symbol such as `btcusdt` on a known quote asset.
#[must_use]
pub fn parse_concatenated(symbol: &str) -> Option<InstrumentId> {
    let upper = symbol.to_ascii_uppercase();
    QUOTE_ASSETS.iter().find_map(|quote| {
        upper
            .strip_suffix(quote)
            .filter(|base| !base.is_empty())
            .map(|base| InstrumentId::new(base, quote))
    })
}

#[must_use]
pub fn parse_dashed(symbol: &str) -> Option<InstrumentId> {
    let (base, quote) = symbol.split_once('-')?;
    if base.is_empty() || quote.is_empty() || quote.contains('-') {
        return None;
    }
    Some(InstrumentId::new(base, quote))
}

/// Resolve a concatenated symbol or fail the frame.
pub fn instrument_from_concatenated(venue: Venue, symbol: &str) -> Result<InstrumentId> {
    parse_concatenated(symbol)
        .ok_or_else(|| Error::normalization(venue, format!("unrecognised symbol '{symbol}'")))
}

pub fn instrument_from_dashed(venue: Venue, symbol: &str) -> Result<InstrumentId> {
    parse_dashed(symbol)
        .ok_or_else(|| Error::normalization(venue, format!("unrecognised symbol '{symbol}'")))
}

/// Parse a decimal carried as a string field.
pub fn decimal(venue: Venue, field: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|e| Error::normalization(venue, format!("{field}: '{value}' is not a decimal: {e}")))
}

/// Parse an optional decimal string; empty strings read as absent.
pub fn optional_decimal(venue: Venue, field: &str, value: Option<&str>) -> Result<Option<Decimal>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => decimal(venue, field, v).map(Some),
    }
}

/// Parse a decimal carried as a JSON number, keeping its printed digits.
pub fn decimal_number(venue: Venue, field: &str, value: &Number) -> Result<Decimal> {
    decimal(venue, field, &value.to_string())
}

/// Levels sent as `[price, quantity, ...]` string arrays.
pub fn string_levels(venue: Venue, levels: &[Vec<String>]) -> Result<Vec<PriceLevel>> {
    levels
        .iter()
        .map(|level| match level.as_slice() {
            [price, quantity, ..] => Ok(PriceLevel::new(
                decimal(venue, "price", price)?,
                decimal(venue, "quantity", quantity)?,
            )),
            _ => Err(Error::normalization(venue, "book level needs price and quantity")),
        })
        .collect()
}

/// Levels sent as `[price, quantity]` number pairs.
pub fn number_levels(venue: Venue, levels: &[[Number; 2]]) -> Result<Vec<PriceLevel>> {
    levels
        .iter()
        .map(|[price, quantity]| {
            Ok(PriceLevel::new(
                decimal_number(venue, "price", price)?,
                decimal_number(venue, "quantity", quantity)?,
            ))
        })
        .collect()
}

/// Venue epoch milliseconds as a UTC timestamp.
#[must_use]
pub fn millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Epoch milliseconds sent as a string, as OKX does.
#[must_use]
pub fn millis_str(ms: &str) -> Option<DateTime<Utc>> {
    ms.parse().ok().and_then(millis)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_concatenated_symbols() {
        let id = InstrumentId::new("BTC", "USDT");
        assert_eq!(concatenated(&id), "BTCUSDT");
        assert_eq!(parse_concatenated("btcusdt"), Some(id));
        assert_eq!(
            parse_concatenated("ETHBTC"),
            Some(InstrumentId::new("ETH", "BTC"))
        );
        assert_eq!(
            parse_concatenated("BTCFDUSD"),
            Some(InstrumentId::new("BTC", "FDUSD"))
        );
        assert_eq!(parse_concatenated("USDT"), None);
        assert_eq!(parse_concatenated("FOOBAR"), None);
    }

    #[test]
    fn test_dashed_symbols() {
        let id = InstrumentId::new("BTC", "USDT");
        assert_eq!(dashed(&id), "BTC-USDT");
        assert_eq!(parse_dashed("BTC-USDT"), Some(id));
        assert_eq!(parse_dashed("BTC-USDT-SWAP"), None);
        assert_eq!(parse_dashed("BTCUSDT"), None);
    }

    #[test]
    fn test_decimals() {
        assert_eq!(decimal(Venue::Binance, "p", "0.00100000").unwrap(), dec!(0.001));
        assert_eq!(decimal(Venue::Okx, "p", "1e-5").unwrap(), dec!(0.00001));
        assert!(decimal(Venue::Okx, "p", "abc").is_err());
        assert_eq!(optional_decimal(Venue::Okx, "p", Some("")).unwrap(), None);

        let number: Number = serde_json::from_str("9999.39").unwrap();
        assert_eq!(decimal_number(Venue::Huobi, "p", &number).unwrap(), dec!(9999.39));
    }

    #[test]
    fn test_level_parsing() {
        let levels = vec![vec!["100.5".to_string(), "2".to_string(), "0".to_string()]];
        let parsed = string_levels(Venue::Okx, &levels).unwrap();
        assert_eq!(parsed, vec![PriceLevel::new(dec!(100.5), dec!(2))]);
        assert!(string_levels(Venue::Okx, &[vec!["1".to_string()]]).is_err());
    }

    #[test]
    fn test_millis() {
        let ts = millis(1_700_000_000_123).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(millis_str("1700000000123"), Some(ts));
        assert_eq!(millis_str("soon"), None);
    }
}
