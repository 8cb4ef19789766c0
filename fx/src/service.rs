//! Rate service: keeps the singleton dollar record in step with the
//! providers and the operator markup.

use std::sync::Arc;

use pricesync_common::constants::MAX_WRITE_ATTEMPTS;
use pricesync_common::{ExchangeRate, Markup, RateValues};
use pricesync_store::{RateStore, RateWrite};
use tracing::{debug, info, instrument};

use crate::error::{FxError, FxResult};
use crate::markup::{effective_value, MarkupPatch};
use crate::provider::{RateProvider, RateQuote};

/// Result of a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// The record after the refresh.
    pub rate: ExchangeRate,
    /// Whether the base value was written. Gates the price cascades.
    pub changed: bool,
}

/// Reads and writes the dollar rate record.
///
/// All writes are compare-and-set against the record version. A writer that
/// loses a race re-reads and decides again, so concurrent first-time
/// initializations collapse into one record.
pub struct RateService {
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
}

impl RateService {
    pub fn new(provider: Arc<dyn RateProvider>, store: Arc<dyn RateStore>) -> Self {
        Self { provider, store }
    }

    /// Current record, initializing it from the provider on first use.
    #[instrument(skip(self))]
    pub async fn get_current_rate(&self) -> FxResult<ExchangeRate> {
        if let Some(rate) = self.store.read().await? {
            return Ok(rate);
        }

        debug!("No rate record yet, bootstrapping from provider");
        Ok(self.refresh_rate().await?.rate)
    }

    /// Fetch a fresh quote and persist it if the base value moved.
    ///
    /// The existing markup is kept. A first-time record gets no markup.
    #[instrument(skip(self))]
    pub async fn refresh_rate(&self) -> FxResult<RefreshOutcome> {
        let quote = self.provider.fetch_quote().await?;
        quote.validate()?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let write = match self.store.read().await? {
                Some(current) if current.base_value == quote.base_value => {
                    debug!(
                        base_value = %current.base_value,
                        provider = %quote.provider,
                        "Rate unchanged"
                    );
                    return Ok(RefreshOutcome {
                        rate: current,
                        changed: false,
                    });
                }
                Some(current) => RateWrite::Update {
                    expected_version: current.version,
                    values: values_for(&quote, current.markup)?,
                },
                None => RateWrite::Create(values_for(&quote, Markup::none())?),
            };

            match self.store.upsert(write).await {
                Ok(rate) => {
                    info!(
                        base_value = %rate.base_value,
                        effective_value = %rate.effective_value,
                        provider = %rate.provider,
                        version = rate.version,
                        "Dollar rate updated"
                    );
                    return Ok(RefreshOutcome {
                        rate,
                        changed: true,
                    });
                }
                Err(e) if e.is_conflict() => {
                    debug!(attempt, "Rate write lost a race, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(FxError::PersistenceConflict {
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    /// Change the markup and recompute the effective value from the stored
    /// base value.
    ///
    /// Always persists. The provider is only contacted when no record exists
    /// yet. Does not trigger the price cascades.
    #[instrument(skip(self))]
    pub async fn update_markup_config(&self, patch: MarkupPatch) -> FxResult<ExchangeRate> {
        patch.validate()?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = match self.store.read().await? {
                Some(current) => current,
                None => self.refresh_rate().await?.rate,
            };

            let markup = patch.apply_to(current.markup);
            let values = RateValues {
                markup,
                effective_value: effective_value(current.base_value, &markup)?,
                ..RateValues::from(&current)
            };
            let write = RateWrite::Update {
                expected_version: current.version,
                values,
            };

            match self.store.upsert(write).await {
                Ok(rate) => {
                    info!(
                        added_value = %rate.markup.value,
                        is_percentage = rate.markup.is_percentage,
                        effective_value = %rate.effective_value,
                        "Markup updated"
                    );
                    return Ok(rate);
                }
                Err(e) if e.is_conflict() => {
                    debug!(attempt, "Markup write lost a race, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(FxError::PersistenceConflict {
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}

fn values_for(quote: &RateQuote, markup: Markup) -> FxResult<RateValues> {
    Ok(RateValues {
        base_value: quote.base_value,
        markup,
        effective_value: effective_value(quote.base_value, &markup)?,
        provider: quote.provider,
        source_fetched_at: quote.source_fetched_at,
    })
}
