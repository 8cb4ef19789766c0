//! Rate provider trait and the primary/secondary fallback.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricesync_common::ProviderName;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};

/// A raw rate as reported by one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateQuote {
    /// ARS per USD, before markup.
    pub base_value: Decimal,
    pub provider: ProviderName,
    /// Timestamp from the provider's own data.
    pub source_fetched_at: DateTime<Utc>,
}

impl RateQuote {
    pub fn new(
        base_value: Decimal,
        provider: ProviderName,
        source_fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            base_value,
            provider,
            source_fetched_at,
        }
    }

    /// Reject quotes that cannot be a real rate.
    pub fn validate(&self) -> FxResult<()> {
        if self.base_value <= Decimal::ZERO {
            return Err(FxError::MalformedQuote {
                provider: self.provider,
                reason: format!("non-positive rate {}", self.base_value),
            });
        }
        Ok(())
    }
}

/// Trait for dollar rate providers.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the current USD→ARS rate.
    async fn fetch_quote(&self) -> FxResult<RateQuote>;
}

/// Tries a primary provider and falls back to a secondary one.
///
/// Fails with [`FxError::SourceUnavailable`] only when both fail.
pub struct FallbackRateProvider {
    primary: Arc<dyn RateProvider>,
    secondary: Arc<dyn RateProvider>,
}

impl FallbackRateProvider {
    pub fn new(primary: Arc<dyn RateProvider>, secondary: Arc<dyn RateProvider>) -> Self {
        Self { primary, secondary }
    }

    async fn try_provider(provider: &dyn RateProvider) -> FxResult<RateQuote> {
        let quote = provider.fetch_quote().await?;
        quote.validate()?;
        Ok(quote)
    }
}

#[async_trait]
impl RateProvider for FallbackRateProvider {
    fn name(&self) -> &str {
        "FALLBACK"
    }

    async fn fetch_quote(&self) -> FxResult<RateQuote> {
        let primary_error = match Self::try_provider(self.primary.as_ref()).await {
            Ok(quote) => {
                debug!(provider = self.primary.name(), rate = %quote.base_value, "Got rate from primary");
                return Ok(quote);
            }
            Err(e) => {
                warn!(
                    provider = self.primary.name(),
                    error = %e,
                    "Primary rate provider failed, trying secondary"
                );
                e
            }
        };

        match Self::try_provider(self.secondary.as_ref()).await {
            Ok(quote) => {
                debug!(provider = self.secondary.name(), rate = %quote.base_value, "Got rate from secondary");
                Ok(quote)
            }
            Err(secondary_error) => {
                warn!(
                    provider = self.secondary.name(),
                    error = %secondary_error,
                    "Secondary rate provider failed"
                );
                Err(FxError::SourceUnavailable {
                    primary: primary_error.to_string(),
                    secondary: secondary_error.to_string(),
                })
            }
        }
    }
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    provider: ProviderName,
    rate: parking_lot::Mutex<Option<Decimal>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a mock that answers with `rate`.
    pub fn new(provider: ProviderName, rate: Decimal) -> Self {
        Self {
            provider,
            rate: parking_lot::Mutex::new(Some(rate)),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Create a mock that always fails.
    pub fn failing(provider: ProviderName) -> Self {
        Self {
            provider,
            rate: parking_lot::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Change the rate returned by later calls.
    pub fn set_rate(&self, rate: Decimal) {
        *self.rate.lock() = Some(rate);
    }

    /// Make later calls fail.
    pub fn fail(&self) {
        *self.rate.lock() = None;
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    async fn fetch_quote(&self) -> FxResult<RateQuote> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let rate = *self.rate.lock();
        rate.map(|r| RateQuote::new(r, self.provider, Utc::now()))
            .ok_or_else(|| FxError::Provider {
                provider: self.provider,
                message: "mock provider unavailable".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_provider() {
        let provider = MockRateProvider::new(ProviderName::DolarApi, dec!(1000));

        let quote = provider.fetch_quote().await.unwrap();

        assert_eq!(quote.base_value, dec!(1000));
        assert_eq!(quote.provider, ProviderName::DolarApi);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_primary_wins_when_healthy() {
        let primary = Arc::new(MockRateProvider::new(ProviderName::DolarApi, dec!(1000)));
        let secondary = Arc::new(MockRateProvider::new(ProviderName::Bluelytics, dec!(1010)));
        let fallback = FallbackRateProvider::new(primary.clone(), secondary.clone());

        let quote = fallback.fetch_quote().await.unwrap();

        assert_eq!(quote.provider, ProviderName::DolarApi);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_on_primary_failure() {
        let primary = Arc::new(MockRateProvider::failing(ProviderName::DolarApi));
        let secondary = Arc::new(MockRateProvider::new(ProviderName::Bluelytics, dec!(1010)));
        let fallback = FallbackRateProvider::new(primary, secondary);

        let quote = fallback.fetch_quote().await.unwrap();

        assert_eq!(quote.base_value, dec!(1010));
        assert_eq!(quote.provider, ProviderName::Bluelytics);
    }

    #[tokio::test]
    async fn test_falls_back_on_malformed_primary() {
        let primary = Arc::new(MockRateProvider::new(ProviderName::DolarApi, dec!(0)));
        let secondary = Arc::new(MockRateProvider::new(ProviderName::Bluelytics, dec!(1010)));
        let fallback = FallbackRateProvider::new(primary, secondary);

        let quote = fallback.fetch_quote().await.unwrap();

        assert_eq!(quote.provider, ProviderName::Bluelytics);
    }

    #[tokio::test]
    async fn test_both_failing_is_source_unavailable() {
        let primary = Arc::new(MockRateProvider::failing(ProviderName::DolarApi));
        let secondary = Arc::new(MockRateProvider::new(ProviderName::Bluelytics, dec!(-3)));
        let fallback = FallbackRateProvider::new(primary, secondary);

        let err = fallback.fetch_quote().await.unwrap_err();

        assert!(matches!(err, FxError::SourceUnavailable { .. }));
        assert!(err.is_source_error());
    }
}
