//! Store error types.

use thiserror::Error;

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent writer got there first (singleton creation race or
    /// stale version). Callers re-read and retry.
    #[error("Write conflict on {0}")]
    Conflict(&'static str),

    /// Record expected to exist is missing.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Stored data could not be decoded.
    #[error("Corrupt record in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    /// Underlying database failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if the write may succeed after re-reading.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
