//! Scheduler lifecycle errors.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler already started")]
    AlreadyStarted,

    #[error("Refresh interval must be non-zero")]
    ZeroInterval,

    #[error("Scheduler loop did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Scheduler loop panicked: {0}")]
    LoopPanicked(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
