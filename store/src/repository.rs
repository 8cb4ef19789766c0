//! Store traits shared by the memory and PostgreSQL backends.

use async_trait::async_trait;
use rust_decimal::Decimal;

use pricesync_common::{
    ExchangeRate, Order, OrderId, OrderStatus, ProductVariant, RateValues, VariantId,
};

use crate::error::StoreResult;

/// A write against the singleton rate record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateWrite {
    /// Create the record. Conflicts if it already exists.
    Create(RateValues),
    /// Replace the values if the stored version still matches.
    Update {
        expected_version: i64,
        values: RateValues,
    },
}

impl RateWrite {
    pub fn values(&self) -> &RateValues {
        match self {
            RateWrite::Create(values) => values,
            RateWrite::Update { values, .. } => values,
        }
    }
}

/// Holds the single dollar rate record.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Read the record, `None` before first initialization.
    async fn read(&self) -> StoreResult<Option<ExchangeRate>>;

    /// Create or update the record.
    ///
    /// Returns `StoreError::Conflict` when another writer created the record
    /// first or bumped its version since it was read.
    async fn upsert(&self, write: RateWrite) -> StoreResult<ExchangeRate>;
}

/// New ARS price for one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPriceUpdate {
    pub id: VariantId,
    pub price_ars: Decimal,
}

/// New ARS total for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTotalUpdate {
    pub id: OrderId,
    pub total_amount_ars: Decimal,
}

/// Outcome of one bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkWriteResult<Id> {
    /// Records rewritten.
    pub updated: usize,
    /// Requested ids that no longer matched the write predicate.
    pub unmatched: Vec<Id>,
}

impl<Id> BulkWriteResult<Id> {
    pub fn empty() -> Self {
        Self {
            updated: 0,
            unmatched: Vec::new(),
        }
    }
}

/// Product variants and their ARS prices.
#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Every variant in the catalog.
    async fn list_variants(&self) -> StoreResult<Vec<ProductVariant>>;

    /// Apply all price updates as one atomic bulk write.
    async fn apply_variant_prices(
        &self,
        updates: &[VariantPriceUpdate],
    ) -> StoreResult<BulkWriteResult<VariantId>>;
}

/// Orders and their ARS totals.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Orders whose status is in `statuses`.
    async fn list_orders_with_status(&self, statuses: &[OrderStatus]) -> StoreResult<Vec<Order>>;

    /// Apply all total updates as one atomic bulk write, touching only orders
    /// whose status is still in `statuses` at write time.
    async fn apply_order_totals(
        &self,
        updates: &[OrderTotalUpdate],
        statuses: &[OrderStatus],
    ) -> StoreResult<BulkWriteResult<OrderId>>;
}
