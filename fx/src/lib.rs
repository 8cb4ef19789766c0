//! PriceSync FX
//!
//! Fetches the USD→ARS rate, applies the operator markup and keeps the
//! singleton rate record current.
//!
//! # Features
//!
//! - Two interchangeable HTTP providers with primary → secondary fallback
//! - Flat or percentage markup on top of the fetched rate
//! - Conditional persistence: unchanged rates are never rewritten
//!
//! # Example
//!
//! ```rust,ignore
//! use pricesync_fx::{FallbackRateProvider, RateService};
//!
//! let service = RateService::new(Arc::new(provider), store);
//! let outcome = service.refresh_rate().await?;
//! if outcome.changed {
//!     // cascade outcome.rate.effective_value
//! }
//! ```

pub mod error;
pub mod markup;
pub mod provider;
pub mod dolarapi;
pub mod bluelytics;
pub mod service;

pub use error::{FxError, FxResult};
pub use markup::{effective_value, MarkupPatch};
pub use provider::{FallbackRateProvider, RateProvider, RateQuote};
pub use dolarapi::DolarApiProvider;
pub use bluelytics::{BluelyticsMarket, BluelyticsProvider};
pub use service::{RateService, RefreshOutcome};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
