//! PriceSync Scheduler
//!
//! Runs the dollar rate refresh on a fixed interval and, whenever the base
//! value changes, cascades the new effective rate into variant prices and
//! re-priceable order totals.

pub mod config;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod state;

pub use config::{ProviderConfig, SchedulerConfig, StoreBackend};
pub use error::{SchedulerError, SchedulerResult};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use scheduler::{CascadeScheduler, TickOutcome, TickTrigger};
pub use state::{SchedulerState, TickState};
