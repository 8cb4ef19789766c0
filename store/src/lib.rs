//! PriceSync Store
//!
//! Persistence for the dollar rate, product variants and orders, and the
//! bulk cascades that rewrite ARS prices when the rate changes.
//!
//! Two backends implement the store traits: [`MemoryStore`] for tests and
//! local runs, and [`PgStore`] for PostgreSQL.

pub mod error;
pub mod repository;
pub mod memory;
pub mod postgres;
pub mod cascade;

pub use error::{StoreError, StoreResult};
pub use repository::{
    BulkWriteResult, OrderStore, OrderTotalUpdate, RateStore, RateWrite, VariantPriceUpdate,
    VariantStore,
};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use cascade::{
    CascadeError, CascadeReport, CascadeStage, OrderPriceCascade, RecordFailure,
    VariantPriceCascade,
};
