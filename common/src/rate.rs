//! The singleton dollar exchange-rate record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External source that supplied a base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    /// dolarapi.com
    DolarApi,
    /// bluelytics.com.ar
    Bluelytics,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::DolarApi => "dolarapi",
            ProviderName::Bluelytics => "bluelytics",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dolarapi" => Ok(ProviderName::DolarApi),
            "bluelytics" => Ok(ProviderName::Bluelytics),
            other => Err(format!("unknown rate provider '{}'", other)),
        }
    }
}

/// Operator-configured adjustment layered on the fetched rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markup {
    /// Flat amount or percentage, always >= 0.
    pub value: Decimal,
    /// Whether `value` is a percentage of the base value.
    pub is_percentage: bool,
}

impl Markup {
    pub fn new(value: Decimal, is_percentage: bool) -> Self {
        Self {
            value,
            is_percentage,
        }
    }

    /// No adjustment at all.
    pub fn none() -> Self {
        Self::new(Decimal::ZERO, false)
    }
}

impl Default for Markup {
    fn default() -> Self {
        Self::none()
    }
}

/// The persisted dollar rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Raw rate as fetched from the provider.
    pub base_value: Decimal,
    /// Markup configuration.
    pub markup: Markup,
    /// Rate after markup, kept at full precision.
    pub effective_value: Decimal,
    /// Which provider supplied `base_value`.
    pub provider: ProviderName,
    /// Timestamp reported by the provider itself.
    pub source_fetched_at: DateTime<Utc>,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// Last local write.
    pub updated_at: DateTime<Utc>,
    /// Incremented on every write.
    pub version: i64,
}

/// Values written to the rate record. Timestamps and version are owned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateValues {
    pub base_value: Decimal,
    pub markup: Markup,
    pub effective_value: Decimal,
    pub provider: ProviderName,
    pub source_fetched_at: DateTime<Utc>,
}

impl From<&ExchangeRate> for RateValues {
    fn from(rate: &ExchangeRate) -> Self {
        Self {
            base_value: rate.base_value,
            markup: rate.markup,
            effective_value: rate.effective_value,
            provider: rate.provider,
            source_fetched_at: rate.source_fetched_at,
        }
    }
}

/// Shape returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DollarResponse {
    pub base_value: Decimal,
    /// Effective value.
    pub value: Decimal,
    pub added_value: Decimal,
    pub is_percentage: bool,
    pub source: ProviderName,
    pub api_updated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ExchangeRate> for DollarResponse {
    fn from(rate: &ExchangeRate) -> Self {
        Self {
            base_value: rate.base_value,
            value: rate.effective_value,
            added_value: rate.markup.value,
            is_percentage: rate.markup.is_percentage,
            source: rate.provider,
            api_updated_at: rate.source_fetched_at,
            updated_at: rate.updated_at,
        }
    }
}
