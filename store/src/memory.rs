//! In-memory store backend.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use pricesync_common::{
    ExchangeRate, Order, OrderId, OrderStatus, ProductVariant, VariantId, DOLLAR_RATE_KEY,
};

use crate::error::{StoreError, StoreResult};
use crate::repository::{
    BulkWriteResult, OrderStore, OrderTotalUpdate, RateStore, RateWrite, VariantPriceUpdate,
    VariantStore,
};

/// Thread-safe in-memory store.
///
/// The rate lives under the well-known key, so creation through the map's
/// entry API can only ever produce one record. Variants and orders sit
/// behind a single lock each, so a bulk write is never observed half-applied.
pub struct MemoryStore {
    rates: DashMap<&'static str, ExchangeRate>,
    variants: RwLock<BTreeMap<VariantId, ProductVariant>>,
    orders: RwLock<BTreeMap<OrderId, Order>>,
    rate_writes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            rates: DashMap::new(),
            variants: RwLock::new(BTreeMap::new()),
            orders: RwLock::new(BTreeMap::new()),
            rate_writes: AtomicU64::new(0),
        }
    }

    pub fn insert_variant(&self, variant: ProductVariant) {
        self.variants.write().insert(variant.id, variant);
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.write().insert(order.id, order);
    }

    /// Delete a variant, as a catalog edit would.
    pub fn remove_variant(&self, id: &VariantId) -> Option<ProductVariant> {
        self.variants.write().remove(id)
    }

    /// Change an order's status, as checkout or payment would.
    pub fn set_order_status(&self, id: &OrderId, status: OrderStatus) -> bool {
        match self.orders.write().get_mut(id) {
            Some(order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }

    pub fn variant(&self, id: &VariantId) -> Option<ProductVariant> {
        self.variants.read().get(id).cloned()
    }

    pub fn order(&self, id: &OrderId) -> Option<Order> {
        self.orders.read().get(id).cloned()
    }

    /// Number of rate records held. Never exceeds one.
    pub fn rate_record_count(&self) -> usize {
        self.rates.len()
    }

    /// Successful rate writes since creation.
    pub fn rate_write_count(&self) -> u64 {
        self.rate_writes.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn read(&self) -> StoreResult<Option<ExchangeRate>> {
        Ok(self.rates.get(DOLLAR_RATE_KEY).map(|r| r.clone()))
    }

    async fn upsert(&self, write: RateWrite) -> StoreResult<ExchangeRate> {
        let now = Utc::now();

        let rate = match write {
            RateWrite::Create(values) => match self.rates.entry(DOLLAR_RATE_KEY) {
                Entry::Occupied(_) => return Err(StoreError::Conflict("exchange_rate")),
                Entry::Vacant(slot) => {
                    let rate = ExchangeRate {
                        base_value: values.base_value,
                        markup: values.markup,
                        effective_value: values.effective_value,
                        provider: values.provider,
                        source_fetched_at: values.source_fetched_at,
                        created_at: now,
                        updated_at: now,
                        version: 1,
                    };
                    slot.insert(rate.clone());
                    rate
                }
            },
            RateWrite::Update {
                expected_version,
                values,
            } => {
                let mut existing = self
                    .rates
                    .get_mut(DOLLAR_RATE_KEY)
                    .ok_or_else(|| StoreError::NotFound(DOLLAR_RATE_KEY.to_string()))?;

                if existing.version != expected_version {
                    return Err(StoreError::Conflict("exchange_rate"));
                }

                existing.base_value = values.base_value;
                existing.markup = values.markup;
                existing.effective_value = values.effective_value;
                existing.provider = values.provider;
                existing.source_fetched_at = values.source_fetched_at;
                existing.updated_at = now;
                existing.version += 1;
                existing.clone()
            }
        };

        self.rate_writes.fetch_add(1, Ordering::Relaxed);
        debug!(version = rate.version, "Rate record written");
        Ok(rate)
    }
}

#[async_trait]
impl VariantStore for MemoryStore {
    async fn list_variants(&self) -> StoreResult<Vec<ProductVariant>> {
        Ok(self.variants.read().values().cloned().collect())
    }

    async fn apply_variant_prices(
        &self,
        updates: &[VariantPriceUpdate],
    ) -> StoreResult<BulkWriteResult<VariantId>> {
        let now = Utc::now();
        let mut result = BulkWriteResult::empty();
        let mut variants = self.variants.write();

        for update in updates {
            match variants.get_mut(&update.id) {
                Some(variant) => {
                    variant.price_ars = update.price_ars;
                    variant.priced_at = Some(now);
                    result.updated += 1;
                }
                None => result.unmatched.push(update.id),
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn list_orders_with_status(&self, statuses: &[OrderStatus]) -> StoreResult<Vec<Order>> {
        let wanted: HashSet<OrderStatus> = statuses.iter().copied().collect();
        Ok(self
            .orders
            .read()
            .values()
            .filter(|o| wanted.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn apply_order_totals(
        &self,
        updates: &[OrderTotalUpdate],
        statuses: &[OrderStatus],
    ) -> StoreResult<BulkWriteResult<OrderId>> {
        let now = Utc::now();
        let wanted: HashSet<OrderStatus> = statuses.iter().copied().collect();
        let mut result = BulkWriteResult::empty();
        let mut orders = self.orders.write();

        for update in updates {
            match orders.get_mut(&update.id) {
                Some(order) if wanted.contains(&order.status) => {
                    order.total_amount_ars = update.total_amount_ars;
                    order.priced_at = Some(now);
                    result.updated += 1;
                }
                _ => result.unmatched.push(update.id),
            }
        }

        Ok(result)
    }
}
