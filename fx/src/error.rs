//! FX error types.

use pricesync_common::ProviderName;
use pricesync_store::StoreError;
use thiserror::Error;

/// Errors that can occur while fetching or persisting the dollar rate.
#[derive(Debug, Error)]
pub enum FxError {
    /// Both rate providers failed.
    #[error("No rate source available (primary: {primary}; secondary: {secondary})")]
    SourceUnavailable { primary: String, secondary: String },

    /// A provider request failed.
    #[error("Rate provider {provider} error: {message}")]
    Provider {
        provider: ProviderName,
        message: String,
    },

    /// A provider answered with something that is not a usable rate.
    #[error("Malformed quote from {provider}: {reason}")]
    MalformedQuote {
        provider: ProviderName,
        reason: String,
    },

    /// Rejected input, nothing was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Concurrent writers kept invalidating our read.
    #[error("Rate record still contended after {attempts} attempts")]
    PersistenceConflict { attempts: u32 },

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FxError {
    /// Check if the error originates from the external providers.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            FxError::SourceUnavailable { .. }
                | FxError::Provider { .. }
                | FxError::MalformedQuote { .. }
        )
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            FxError::Provider { .. } => "PROVIDER_ERROR",
            FxError::MalformedQuote { .. } => "MALFORMED_QUOTE",
            FxError::Validation(_) => "VALIDATION_ERROR",
            FxError::PersistenceConflict { .. } => "PERSISTENCE_CONFLICT",
            FxError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
