//! Monetary types and rounding rules.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Get the standard decimal places (minor unit) for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" | "CLP" | "PYG" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            _ => 2,
        }
    }

    /// Round a value to this currency's minor unit, half away from zero.
    pub fn round(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.decimal_places(), RoundingStrategy::MidpointAwayFromZero)
    }

    /// Foreign currency prices are quoted in.
    pub fn usd() -> Self {
        Self::new("USD")
    }

    /// Local currency prices are charged in.
    pub fn ars() -> Self {
        Self::new("ARS")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A monetary amount with currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value (high precision decimal).
    pub value: Decimal,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    pub fn usd(value: Decimal) -> Self {
        Self::new(value, Currency::usd())
    }

    /// Check if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.value < Decimal::ZERO
    }

    /// Round to the currency's standard decimal places.
    pub fn round(&self) -> Self {
        Self {
            value: self.currency.round(self.value),
            currency: self.currency.clone(),
        }
    }

    /// Convert into `target` at `rate`, rounded to the target's minor unit.
    ///
    /// Returns `None` if the multiplication overflows.
    pub fn convert(&self, rate: Decimal, target: Currency) -> Option<Money> {
        let value = self.value.checked_mul(rate)?;
        Some(Money::new(value, target).round())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_decimal_places() {
        assert_eq!(Currency::usd().decimal_places(), 2);
        assert_eq!(Currency::ars().decimal_places(), 2);
        assert_eq!(Currency::new("jpy").decimal_places(), 0);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        let ars = Currency::ars();
        assert_eq!(ars.round(dec!(10.005)), dec!(10.01));
        assert_eq!(ars.round(dec!(10.015)), dec!(10.02));
        assert_eq!(ars.round(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn test_convert_usd_to_ars() {
        let price = Money::usd(dec!(50));
        let ars = price.convert(dec!(1100), Currency::ars()).unwrap();

        assert_eq!(ars.currency, Currency::ars());
        assert_eq!(ars.value, dec!(55000));
    }

    #[test]
    fn test_convert_rounds_to_minor_unit() {
        let price = Money::usd(dec!(19.99));
        let ars = price.convert(dec!(1234.5678), Currency::ars()).unwrap();

        // 19.99 * 1234.5678 = 24679.010322
        assert_eq!(ars.value, dec!(24679.01));
    }

    #[test]
    fn test_convert_overflow() {
        let price = Money::usd(Decimal::MAX);
        assert!(price.convert(dec!(2), Currency::ars()).is_none());
    }
}
