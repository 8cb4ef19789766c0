//! PriceSync Common Types
//!
//! Shared types for the dollar-rate pipeline: currencies and rounding,
//! the singleton exchange-rate record, and the catalog records whose local
//! prices are derived from it.

pub mod identifiers;
pub mod monetary;
pub mod rate;
pub mod catalog;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use rate::*;
pub use catalog::*;
pub use time::*;
