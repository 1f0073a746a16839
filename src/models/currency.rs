use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO 4217 currency codes accepted by the ledger. Currency is a closed enum
/// validated at the admission boundary; unknown codes are rejected before any
/// payment row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CHF,
    CAD,
    AUD,
    SGD,
    INR,
    BRL,
}

impl Currency {
    /// Returns the ISO 4217 numeric code for the currency.
    pub fn numeric_code(&self) -> u16 {
        match self {
            Currency::USD => 840,
            Currency::EUR => 978,
            Currency::GBP => 826,
            Currency::JPY => 392,
            Currency::CHF => 756,
            Currency::CAD => 124,
            Currency::AUD => 36,
            Currency::SGD => 702,
            Currency::INR => 356,
            Currency::BRL => 986,
        }
    }

    /// Returns the number of decimal places conventionally used.
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Currency {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "CHF" => Ok(Currency::CHF),
            "CAD" => Ok(Currency::CAD),
            "AUD" => Ok(Currency::AUD),
            "SGD" => Ok(Currency::SGD),
            "INR" => Ok(Currency::INR),
            "BRL" => Ok(Currency::BRL),
            _ => Err(CurrencyParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrencyParseError(String);

impl fmt::Display for CurrencyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown currency code: {}", self.0)
    }
}

impl std::error::Error for CurrencyParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_from_str() {
        assert_eq!(Currency::from_str("USD").unwrap(), Currency::USD);
        assert_eq!(Currency::from_str("usd").unwrap(), Currency::USD);
        assert_eq!(Currency::from_str("EUR").unwrap(), Currency::EUR);
        assert!(Currency::from_str("XXX").is_err());
        assert!(Currency::from_str("US").is_err());
    }

    #[test]
    fn test_currency_display() {
        assert_eq!(Currency::USD.to_string(), "USD");
        assert_eq!(Currency::JPY.to_string(), "JPY");
    }

    #[test]
    fn test_currency_numeric_code() {
        assert_eq!(Currency::USD.numeric_code(), 840);
        assert_eq!(Currency::EUR.numeric_code(), 978);
    }

    #[test]
    fn test_currency_serialization() {
        let json = serde_json::to_string(&Currency::GBP).unwrap();
        assert_eq!(json, "\"GBP\"");
        let deserialized: Currency = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, Currency::GBP);
    }
}
