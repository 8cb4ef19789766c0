//! dolarapi.com rate provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricesync_common::ProviderName;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::{FxError, FxResult};
use crate::provider::{RateProvider, RateQuote};

pub const DEFAULT_BASE_URL: &str = "https://dolarapi.com";

const PROVIDER: ProviderName = ProviderName::DolarApi;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DolarApiQuote {
    venta: Option<Decimal>,
    fecha_actualizacion: Option<String>,
}

/// Fetches one "casa" (blue, oficial, ...) from dolarapi.com and uses its
/// sell price.
pub struct DolarApiProvider {
    client: reqwest::Client,
    base_url: String,
    casa: String,
}

impl DolarApiProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, casa: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            casa: casa.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/dolares/{}", self.base_url, self.casa)
    }
}

/// Parse a `/v1/dolares/{casa}` response body.
pub fn parse_quote(body: &str) -> FxResult<RateQuote> {
    let raw: DolarApiQuote = serde_json::from_str(body).map_err(|e| FxError::MalformedQuote {
        provider: PROVIDER,
        reason: e.to_string(),
    })?;

    let venta = raw.venta.ok_or_else(|| malformed("missing venta"))?;
    let fetched_at = raw
        .fecha_actualizacion
        .ok_or_else(|| malformed("missing fechaActualizacion"))?;
    let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
        .map_err(|e| malformed(format!("bad fechaActualizacion '{}': {}", fetched_at, e)))?
        .with_timezone(&Utc);

    let quote = RateQuote::new(venta, PROVIDER, fetched_at);
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
impl RateProvider for DolarApiProvider {
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

        let quote = parse_quote(&body)?;
        debug!(casa = %self.casa, rate = %quote.base_value, "Fetched dolarapi quote");
        Ok(quote)
    }
}
