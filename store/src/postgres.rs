//! PostgreSQL store backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{error, info, instrument};
use uuid::Uuid;

use pricesync_common::{
    ExchangeRate, Markup, Order, OrderId, OrderStatus, ProductId, ProductVariant, ProviderName,
    VariantId, DOLLAR_RATE_KEY,
};

use crate::error::{StoreError, StoreResult};
use crate::repository::{
    BulkWriteResult, OrderStore, OrderTotalUpdate, RateStore, RateWrite, VariantPriceUpdate,
    VariantStore,
};

const UNIQUE_VIOLATION: &str = "23505";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS exchange_rate (
        id TEXT PRIMARY KEY CHECK (id = 'dollar'),
        base_value NUMERIC NOT NULL CHECK (base_value > 0),
        markup_value NUMERIC NOT NULL DEFAULT 0 CHECK (markup_value >= 0),
        markup_is_percentage BOOLEAN NOT NULL DEFAULT FALSE,
        effective_value NUMERIC NOT NULL,
        provider TEXT NOT NULL,
        source_fetched_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        version BIGINT NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS product_variants (
        id UUID PRIMARY KEY,
        product_id UUID NOT NULL,
        sku TEXT NOT NULL,
        price_usd NUMERIC NOT NULL,
        price_ars NUMERIC NOT NULL DEFAULT 0,
        priced_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        status TEXT NOT NULL,
        total_amount NUMERIC NOT NULL,
        total_amount_ars NUMERIC NOT NULL DEFAULT 0,
        priced_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS orders_status_idx ON orders (status)",
];

const RATE_COLUMNS: &str = "base_value, markup_value, markup_is_percentage, effective_value, \
     provider, source_fetched_at, created_at, updated_at, version";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url`.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Create the tables this crate reads and writes, if missing.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn rate_from_row(row: &PgRow) -> StoreResult<ExchangeRate> {
    let provider: String = row.try_get("provider")?;
    let provider = provider
        .parse::<ProviderName>()
        .map_err(|reason| StoreError::Corrupt {
            table: "exchange_rate",
            reason,
        })?;

    Ok(ExchangeRate {
        base_value: row.try_get("base_value")?,
        markup: Markup::new(
            row.try_get("markup_value")?,
            row.try_get("markup_is_percentage")?,
        ),
        effective_value: row.try_get("effective_value")?,
        provider,
        source_fetched_at: row.try_get("source_fetched_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn variant_from_row(row: &PgRow) -> StoreResult<ProductVariant> {
    Ok(ProductVariant {
        id: VariantId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        sku: row.try_get("sku")?,
        price_usd: row.try_get("price_usd")?,
        price_ars: row.try_get("price_ars")?,
        priced_at: row.try_get::<Option<DateTime<Utc>>, _>("priced_at")?,
    })
}

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|reason| StoreError::Corrupt {
            table: "orders",
            reason,
        })?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        status,
        total_amount: row.try_get("total_amount")?,
        total_amount_ars: row.try_get("total_amount_ars")?,
        priced_at: row.try_get::<Option<DateTime<Utc>>, _>("priced_at")?,
    })
}

fn status_names(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl RateStore for PgStore {
    async fn read(&self) -> StoreResult<Option<ExchangeRate>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM exchange_rate WHERE id = $1",
            RATE_COLUMNS
        ))
        .bind(DOLLAR_RATE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(rate_from_row).transpose()
    }

    #[instrument(skip(self, write))]
    async fn upsert(&self, write: RateWrite) -> StoreResult<ExchangeRate> {
        let row = match &write {
            RateWrite::Create(values) => {
                let result = sqlx::query(&format!(
                    r#"
                    INSERT INTO exchange_rate (
                        id, base_value, markup_value, markup_is_percentage,
                        effective_value, provider, source_fetched_at, version
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
                    ON CONFLICT (id) DO NOTHING
                    RETURNING {}
                    "#,
                    RATE_COLUMNS
                ))
                .bind(DOLLAR_RATE_KEY)
                .bind(values.base_value)
                .bind(values.markup.value)
                .bind(values.markup.is_percentage)
                .bind(values.effective_value)
                .bind(values.provider.as_str())
                .bind(values.source_fetched_at)
                .fetch_optional(&self.pool)
                .await;

                match result {
                    Ok(row) => row,
                    Err(sqlx::Error::Database(db))
                        if db.code().as_deref() == Some(UNIQUE_VIOLATION) =>
                    {
                        None
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to create rate record");
                        return Err(StoreError::Database(e));
                    }
                }
            }
            RateWrite::Update {
                expected_version,
                values,
            } => sqlx::query(&format!(
                r#"
                UPDATE exchange_rate SET
                    base_value = $2,
                    markup_value = $3,
                    markup_is_percentage = $4,
                    effective_value = $5,
                    provider = $6,
                    source_fetched_at = $7,
                    updated_at = NOW(),
                    version = version + 1
                WHERE id = $1 AND version = $8
                RETURNING {}
                "#,
                RATE_COLUMNS
            ))
            .bind(DOLLAR_RATE_KEY)
            .bind(values.base_value)
            .bind(values.markup.value)
            .bind(values.markup.is_percentage)
            .bind(values.effective_value)
            .bind(values.provider.as_str())
            .bind(values.source_fetched_at)
            .bind(*expected_version)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to update rate record");
                StoreError::Database(e)
            })?,
        };

        match row {
            Some(row) => rate_from_row(&row),
            None => Err(StoreError::Conflict("exchange_rate")),
        }
    }
}

#[async_trait]
impl VariantStore for PgStore {
    async fn list_variants(&self) -> StoreResult<Vec<ProductVariant>> {
        let rows = sqlx::query(
            "SELECT id, product_id, sku, price_usd, price_ars, priced_at FROM product_variants",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(variant_from_row).collect()
    }

    #[instrument(skip(self, updates), fields(count = updates.len()))]
    async fn apply_variant_prices(
        &self,
        updates: &[VariantPriceUpdate],
    ) -> StoreResult<BulkWriteResult<VariantId>> {
        if updates.is_empty() {
            return Ok(BulkWriteResult::empty());
        }

        let ids: Vec<Uuid> = updates.iter().map(|u| *u.id.as_uuid()).collect();
        let prices: Vec<Decimal> = updates.iter().map(|u| u.price_ars).collect();

        // One statement, so readers see either all old or all new prices.
        let rows = sqlx::query(
            r#"
            UPDATE product_variants AS v
            SET price_ars = u.price_ars, priced_at = NOW()
            FROM UNNEST($1::uuid[], $2::numeric[]) AS u(id, price_ars)
            WHERE v.id = u.id
            RETURNING v.id
            "#,
        )
        .bind(ids)
        .bind(prices)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Bulk variant price update failed");
            StoreError::Database(e)
        })?;

        let touched = rows
            .iter()
            .map(|r| r.try_get::<Uuid, _>("id"))
            .collect::<Result<std::collections::HashSet<_>, _>>()?;

        Ok(BulkWriteResult {
            updated: touched.len(),
            unmatched: updates
                .iter()
                .filter(|u| !touched.contains(u.id.as_uuid()))
                .map(|u| u.id)
                .collect(),
        })
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn list_orders_with_status(&self, statuses: &[OrderStatus]) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, status, total_amount, total_amount_ars, priced_at
            FROM orders
            WHERE status = ANY($1)
            "#,
        )
        .bind(status_names(statuses))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }

    #[instrument(skip(self, updates, statuses), fields(count = updates.len()))]
    async fn apply_order_totals(
        &self,
        updates: &[OrderTotalUpdate],
        statuses: &[OrderStatus],
    ) -> StoreResult<BulkWriteResult<OrderId>> {
        if updates.is_empty() {
            return Ok(BulkWriteResult::empty());
        }

        let ids: Vec<Uuid> = updates.iter().map(|u| *u.id.as_uuid()).collect();
        let totals: Vec<Decimal> = updates.iter().map(|u| u.total_amount_ars).collect();

        let rows = sqlx::query(
            r#"
            UPDATE orders AS o
            SET total_amount_ars = u.total_amount_ars, priced_at = NOW()
            FROM UNNEST($1::uuid[], $2::numeric[]) AS u(id, total_amount_ars)
            WHERE o.id = u.id AND o.status = ANY($3)
            RETURNING o.id
            "#,
        )
        .bind(ids)
        .bind(totals)
        .bind(status_names(statuses))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Bulk order total update failed");
            StoreError::Database(e)
        })?;

        let touched = rows
            .iter()
            .map(|r| r.try_get::<Uuid, _>("id"))
            .collect::<Result<std::collections::HashSet<_>, _>>()?;

        Ok(BulkWriteResult {
            updated: touched.len(),
            unmatched: updates
                .iter()
                .filter(|u| !touched.contains(u.id.as_uuid()))
                .map(|u| u.id)
                .collect(),
        })
    }
}
