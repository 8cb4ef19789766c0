//! Bulk recomputation of ARS prices after a rate change.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, instrument, warn};

use pricesync_common::{Currency, Money, OrderId, OrderStatus, VariantId};

use crate::error::StoreError;
use crate::repository::{OrderStore, OrderTotalUpdate, VariantPriceUpdate, VariantStore};

/// Which collection a cascade rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeStage {
    Variants,
    Orders,
}

impl fmt::Display for CascadeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeStage::Variants => f.write_str("variants"),
            CascadeStage::Orders => f.write_str("orders"),
        }
    }
}

/// A cascade that could not run at all.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("{stage} cascade rejected effective rate {rate}: must be positive")]
    InvalidRate { stage: CascadeStage, rate: Decimal },

    #[error("{stage} cascade failed: {source}")]
    Store {
        stage: CascadeStage,
        #[source]
        source: StoreError,
    },
}

impl CascadeError {
    pub fn stage(&self) -> CascadeStage {
        match self {
            CascadeError::InvalidRate { stage, .. } => *stage,
            CascadeError::Store { stage, .. } => *stage,
        }
    }
}

/// A single record left out of a cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure<Id> {
    pub id: Id,
    pub reason: String,
}

/// What one cascade run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport<Id> {
    pub stage: CascadeStage,
    /// Records selected for recomputation.
    pub scanned: usize,
    /// Records rewritten.
    pub updated: usize,
    /// Records skipped, with the reason.
    pub failed: Vec<RecordFailure<Id>>,
}

impl<Id> CascadeReport<Id> {
    /// Check if every selected record was rewritten.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

fn check_rate(stage: CascadeStage, rate: Decimal) -> Result<(), CascadeError> {
    if rate <= Decimal::ZERO {
        return Err(CascadeError::InvalidRate { stage, rate });
    }
    Ok(())
}

/// Convert a USD amount to ARS at `rate`.
fn to_ars(usd: Decimal, rate: Decimal) -> Result<Decimal, String> {
    let amount = Money::usd(usd);
    if amount.is_negative() {
        return Err(format!("negative USD amount {}", usd));
    }
    amount
        .convert(rate, Currency::ars())
        .map(|m| m.value)
        .ok_or_else(|| format!("{} * {} overflows", usd, rate))
}

/// Rewrites `price_ars` on every product variant.
pub struct VariantPriceCascade {
    store: Arc<dyn VariantStore>,
}

impl VariantPriceCascade {
    pub fn new(store: Arc<dyn VariantStore>) -> Self {
        Self { store }
    }

    /// Recompute every variant's ARS price from its USD price.
    ///
    /// Full recomputation rather than a delta, so missed runs never leave
    /// drift behind.
    #[instrument(skip(self))]
    pub async fn recompute_all_variant_prices(
        &self,
        effective_value: Decimal,
    ) -> Result<CascadeReport<VariantId>, CascadeError> {
        let stage = CascadeStage::Variants;
        check_rate(stage, effective_value)?;

        let variants = self
            .store
            .list_variants()
            .await
            .map_err(|source| CascadeError::Store { stage, source })?;

        let mut updates = Vec::with_capacity(variants.len());
        let mut failed = Vec::new();

        for variant in &variants {
            match to_ars(variant.price_usd, effective_value) {
                Ok(price_ars) => updates.push(VariantPriceUpdate {
                    id: variant.id,
                    price_ars,
                }),
                Err(reason) => {
                    warn!(variant_id = %variant.id, sku = %variant.sku, %reason, "Skipping variant");
                    failed.push(RecordFailure {
                        id: variant.id,
                        reason,
                    });
                }
            }
        }

        let written = self
            .store
            .apply_variant_prices(&updates)
            .await
            .map_err(|source| CascadeError::Store { stage, source })?;

        failed.extend(written.unmatched.into_iter().map(|id| RecordFailure {
            id,
            reason: "variant no longer exists".to_string(),
        }));

        info!(
            effective_value = %effective_value,
            scanned = variants.len(),
            updated = written.updated,
            failed = failed.len(),
            "Variant prices recomputed"
        );

        Ok(CascadeReport {
            stage,
            scanned: variants.len(),
            updated: written.updated,
            failed,
        })
    }
}

/// Rewrites `total_amount_ars` on orders that are not final yet.
pub struct OrderPriceCascade {
    store: Arc<dyn OrderStore>,
}

impl OrderPriceCascade {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Recompute ARS totals for orders in a re-priceable status.
    ///
    /// Final orders are never selected, and the write repeats the status
    /// predicate so an order paid mid-run keeps its settled total.
    #[instrument(skip(self))]
    pub async fn recompute_eligible_order_totals(
        &self,
        effective_value: Decimal,
    ) -> Result<CascadeReport<OrderId>, CascadeError> {
        let stage = CascadeStage::Orders;
        check_rate(stage, effective_value)?;

        let eligible = &OrderStatus::REPRICEABLE;
        let orders = self
            .store
            .list_orders_with_status(eligible)
            .await
            .map_err(|source| CascadeError::Store { stage, source })?;

        let mut updates = Vec::with_capacity(orders.len());
        let mut failed = Vec::new();

        for order in &orders {
            match to_ars(order.total_amount, effective_value) {
                Ok(total_amount_ars) => updates.push(OrderTotalUpdate {
                    id: order.id,
                    total_amount_ars,
                }),
                Err(reason) => {
                    warn!(order_id = %order.id, %reason, "Skipping order");
                    failed.push(RecordFailure {
                        id: order.id,
                        reason,
                    });
                }
            }
        }

        let written = self
            .store
            .apply_order_totals(&updates, eligible)
            .await
            .map_err(|source| CascadeError::Store { stage, source })?;

        failed.extend(written.unmatched.into_iter().map(|id| RecordFailure {
            id,
            reason: "order finalized or removed during cascade".to_string(),
        }));

        info!(
            effective_value = %effective_value,
            scanned = orders.len(),
            updated = written.updated,
            failed = failed.len(),
            "Order totals recomputed"
        );

        Ok(CascadeReport {
            stage,
            scanned: orders.len(),
            updated: written.updated,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::memory::MemoryStore;
    use crate::repository::BulkWriteResult;
    use async_trait::async_trait;
    use pricesync_common::{Order, ProductId, ProductVariant};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<MemoryStore>, VariantPriceCascade, OrderPriceCascade) {
        let store = Arc::new(MemoryStore::new());
        let variants = VariantPriceCascade::new(store.clone());
        let orders = OrderPriceCascade::new(store.clone());
        (store, variants, orders)
    }

    #[tokio::test]
    async fn test_variant_prices_follow_rate() {
        let (store, variants, _) = setup();
        let product = ProductId::new();
        let shirt = ProductVariant::new(product, "SHIRT-M", dec!(50));
        let mug = ProductVariant::new(product, "MUG", dec!(12.35));
        store.insert_variant(shirt.clone());
        store.insert_variant(mug.clone());

        let report = variants.recompute_all_variant_prices(dec!(1100)).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.updated, 2);
        assert!(report.is_clean());
        assert_eq!(store.variant(&shirt.id).unwrap().price_ars, dec!(55000));
        assert_eq!(store.variant(&mug.id).unwrap().price_ars, dec!(13585));
    }

    #[tokio::test]
    async fn test_variant_cascade_rounds_to_centavos() {
        let (store, variants, _) = setup();
        let variant = ProductVariant::new(ProductId::new(), "CAP", dec!(9.99));
        store.insert_variant(variant.clone());

        variants
            .recompute_all_variant_prices(dec!(1050.555))
            .await
            .unwrap();

        // 9.99 * 1050.555 = 10495.04445
        assert_eq!(store.variant(&variant.id).unwrap().price_ars, dec!(10495.04));
    }

    #[tokio::test]
    async fn test_bad_variant_does_not_abort_batch() {
        let (store, variants, _) = setup();
        let good = ProductVariant::new(ProductId::new(), "GOOD", dec!(10));
        let mut bad = ProductVariant::new(ProductId::new(), "BAD", dec!(-1));
        bad.price_ars = dec!(123);
        store.insert_variant(good.clone());
        store.insert_variant(bad.clone());

        let report = variants.recompute_all_variant_prices(dec!(1000)).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, bad.id);
        assert_eq!(store.variant(&good.id).unwrap().price_ars, dec!(10000));
        assert_eq!(store.variant(&bad.id).unwrap().price_ars, dec!(123));
    }

    #[tokio::test]
    async fn test_non_positive_rate_rejected() {
        let (_, variants, orders) = setup();

        let err = variants.recompute_all_variant_prices(Decimal::ZERO).await.unwrap_err();
        assert_eq!(err.stage(), CascadeStage::Variants);

        let err = orders.recompute_eligible_order_totals(dec!(-5)).await.unwrap_err();
        assert!(matches!(err, CascadeError::InvalidRate { stage: CascadeStage::Orders, .. }));
    }

    #[tokio::test]
    async fn test_final_orders_keep_their_total() {
        let (store, _, orders) = setup();
        let pending = Order::new(OrderStatus::Pending, dec!(100), dec!(90000));
        let awaiting = Order::new(OrderStatus::AwaitingPayment, dec!(20), dec!(18000));
        let paid = Order::new(OrderStatus::Paid, dec!(100), dec!(90000));
        let delivered = Order::new(OrderStatus::Delivered, dec!(30), dec!(27000));
        for order in [&pending, &awaiting, &paid, &delivered] {
            store.insert_order(order.clone());
        }

        let report = orders.recompute_eligible_order_totals(dec!(1050)).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.updated, 2);
        assert_eq!(store.order(&pending.id).unwrap().total_amount_ars, dec!(105000));
        assert_eq!(store.order(&awaiting.id).unwrap().total_amount_ars, dec!(21000));
        assert_eq!(store.order(&paid.id).unwrap().total_amount_ars, dec!(90000));
        assert_eq!(store.order(&delivered.id).unwrap().total_amount_ars, dec!(27000));
        assert!(store.order(&paid.id).unwrap().priced_at.is_none());
    }

    #[tokio::test]
    async fn test_empty_catalog_is_a_clean_run() {
        let (_, variants, orders) = setup();

        let v = variants.recompute_all_variant_prices(dec!(1000)).await.unwrap();
        let o = orders.recompute_eligible_order_totals(dec!(1000)).await.unwrap();

        assert_eq!((v.scanned, v.updated), (0, 0));
        assert_eq!((o.scanned, o.updated), (0, 0));
    }

    /// Order store where payment lands right after the eligible orders are read.
    struct PaidDuringRun {
        store: Arc<MemoryStore>,
        paid: OrderId,
    }

    #[async_trait]
    impl OrderStore for PaidDuringRun {
        async fn list_orders_with_status(
            &self,
            statuses: &[OrderStatus],
        ) -> StoreResult<Vec<Order>> {
            let orders = self.store.list_orders_with_status(statuses).await?;
            self.store.set_order_status(&self.paid, OrderStatus::Paid);
            Ok(orders)
        }

        async fn apply_order_totals(
            &self,
            updates: &[OrderTotalUpdate],
            statuses: &[OrderStatus],
        ) -> StoreResult<BulkWriteResult<OrderId>> {
            self.store.apply_order_totals(updates, statuses).await
        }
    }

    #[tokio::test]
    async fn test_order_paid_mid_run_keeps_total() {
        let store = Arc::new(MemoryStore::new());
        let paying = Order::new(OrderStatus::AwaitingPayment, dec!(100), dec!(90000));
        let pending = Order::new(OrderStatus::Pending, dec!(10), dec!(9000));
        store.insert_order(paying.clone());
        store.insert_order(pending.clone());
        let cascade = OrderPriceCascade::new(Arc::new(PaidDuringRun {
            store: store.clone(),
            paid: paying.id,
        }));

        let report = cascade.recompute_eligible_order_totals(dec!(1100)).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, paying.id);
        let settled = store.order(&paying.id).unwrap();
        assert_eq!(settled.status, OrderStatus::Paid);
        assert_eq!(settled.total_amount_ars, dec!(90000));
        assert_eq!(store.order(&pending.id).unwrap().total_amount_ars, dec!(11000));
    }

    /// Variant store where a variant is deleted right after the catalog is read.
    struct DeletedDuringRun {
        store: Arc<MemoryStore>,
        deleted: VariantId,
    }

    #[async_trait]
    impl VariantStore for DeletedDuringRun {
        async fn list_variants(&self) -> StoreResult<Vec<ProductVariant>> {
            let variants = self.store.list_variants().await?;
            self.store.remove_variant(&self.deleted);
            Ok(variants)
        }

        async fn apply_variant_prices(
            &self,
            updates: &[VariantPriceUpdate],
        ) -> StoreResult<BulkWriteResult<VariantId>> {
            self.store.apply_variant_prices(updates).await
        }
    }

    #[tokio::test]
    async fn test_variant_deleted_mid_run_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let product = ProductId::new();
        let kept = ProductVariant::new(product, "KEPT", dec!(5));
        let gone = ProductVariant::new(product, "GONE", dec!(7));
        store.insert_variant(kept.clone());
        store.insert_variant(gone.clone());
        let cascade = VariantPriceCascade::new(Arc::new(DeletedDuringRun {
            store: store.clone(),
            deleted: gone.id,
        }));

        let report = cascade.recompute_all_variant_prices(dec!(1000)).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, gone.id);
        assert!(store.variant(&gone.id).is_none());
        assert_eq!(store.variant(&kept.id).unwrap().price_ars, dec!(5000));
    }
}
