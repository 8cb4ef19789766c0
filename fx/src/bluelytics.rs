//! bluelytics.com.ar rate provider.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricesync_common::ProviderName;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::{FxError, FxResult};
use crate::provider::{RateProvider, RateQuote};

pub const DEFAULT_BASE_URL: &str = "https://api.bluelytics.com.ar";

const PROVIDER: ProviderName = ProviderName::Bluelytics;

/// Which market of the `/v2/latest` payload to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BluelyticsMarket {
    #[default]
    Blue,
    Oficial,
}

impl BluelyticsMarket {
    pub fn as_str(&self) -> &'static str {
        match self {
            BluelyticsMarket::Blue => "blue",
            BluelyticsMarket::Oficial => "oficial",
        }
    }
}

impl fmt::Display for BluelyticsMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BluelyticsMarket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blue" => Ok(BluelyticsMarket::Blue),
            "oficial" => Ok(BluelyticsMarket::Oficial),
            other => Err(format!("unknown bluelytics market '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MarketQuote {
    value_sell: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct Latest {
    blue: Option<MarketQuote>,
    oficial: Option<MarketQuote>,
    last_update: Option<String>,
}

pub struct BluelyticsProvider {
    client: reqwest::Client,
    base_url: String,
    market: BluelyticsMarket,
}

impl BluelyticsProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, market: BluelyticsMarket) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            market,
        }
    }

    fn url(&self) -> String {
        format!("{}/v2/latest", self.base_url)
    }
}

/// Parse a `/v2/latest` response body, reading `market`'s sell price.
pub fn parse_quote(body: &str, market: BluelyticsMarket) -> FxResult<RateQuote> {
    let raw: Latest = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    let section = match market {
        BluelyticsMarket::Blue => raw.blue,
        BluelyticsMarket::Oficial => raw.oficial,
    };
    let sell = section
        .and_then(|q| q.value_sell)
        .ok_or_else(|| malformed(format!("missing {}.value_sell", market)))?;

    let last_update = raw.last_update.ok_or_else(|| malformed("missing last_update"))?;
    let fetched_at = DateTime::parse_from_rfc3339(&last_update)
        .map_err(|e| malformed(format!("bad last_update '{}': {}", last_update, e)))?
        .with_timezone(&Utc);

    let quote = RateQuote::new(sell, PROVIDER, fetched_at);
    quote.validate()?;
    Ok(quote)
}

fn malformed(reason: impl Into<String>) -> FxError {
    FxError::MalformedQuote {
        provider: PROVIDER,
        reason: reason.into(),
    }
}

#[async_trait]
impl RateProvider for BluelyticsProvider {
    fn name(&self) -> &str {
        PROVIDER.as_str()
    }

    async fn fetch_quote(&self) -> FxResult<RateQuote> {
        let url = self.url();
        let provider_error = |message: String| FxError::Provider {
            provider: PROVIDER,
            message,
        };

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| provider_error(format!("request to {} failed: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(provider_error(format!("HTTP {} from {}", status, url)));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| provider_error(format!("reading body failed: {}", e)))?;

        let quote = parse_quote(&body, self.market)?;
        debug!(market = %self.market, rate = %quote.base_value, "Fetched bluelytics quote");
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const LATEST: &str = r#"{
        "oficial": {"value_avg": 900.5, "value_sell": 920.0, "value_buy": 881.0},
        "blue": {"value_avg": 1025.0, "value_sell": 1040.0, "value_buy": 1010.0},
        "oficial_euro": {"value_avg": 970.0, "value_sell": 991.0, "value_buy": 949.0},
        "blue_euro": {"value_avg": 1104.0, "value_sell": 1120.0, "value_buy": 1088.0},
        "last_update": "2024-05-10T11:03:22.374149-03:00"
    }"#;

    #[test]
    fn test_parse_blue_market() {
        let quote = parse_quote(LATEST, BluelyticsMarket::Blue).unwrap();

        assert_eq!(quote.base_value, dec!(1040));
        assert_eq!(quote.provider, ProviderName::Bluelytics);
        assert_eq!(quote.source_fetched_at.to_rfc3339(), "2024-05-10T14:03:22.374149+00:00");
    }

    #[test]
    fn test_parse_oficial_market() {
        let quote = parse_quote(LATEST, BluelyticsMarket::Oficial).unwrap();
        assert_eq!(quote.base_value, dec!(920));
    }

    #[test]
    fn test_missing_market_is_malformed() {
        let body = r#"{"oficial": {"value_sell": 920.0}, "last_update": "2024-05-10T11:03:22-03:00"}"#;
        let err = parse_quote(body, BluelyticsMarket::Blue).unwrap_err();
        assert!(matches!(err, FxError::MalformedQuote { .. }));
    }

    #[test]
    fn test_missing_timestamp_is_malformed() {
        let body = r#"{"blue": {"value_sell": 1040.0}}"#;
        assert!(parse_quote(body, BluelyticsMarket::Blue).is_err());
    }

    #[test]
    fn test_market_parse() {
        assert_eq!("OFICIAL".parse::<BluelyticsMarket>().unwrap(), BluelyticsMarket::Oficial);
        assert!("mep".parse::<BluelyticsMarket>().is_err());
    }
}
