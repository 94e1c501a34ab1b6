//! Product-metrics consumer
//!
//! Maintains the denormalized per-product counters. Product-aggregate events
//! (likes, views) are version-gated against the metrics row so a stale or
//! replayed event can never regress a counter; order events carry the order's
//! own sequence, so they rely on the idempotency table alone.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::CoreResult;
use crate::events::consumer::{ConsumerRecord, EventHandler};
use crate::events::{event_types, LikePayload, OrderCreatedPayload, ProductViewedPayload};
use crate::models::ProductMetrics;

pub struct MetricsEventHandler {
    pool: PgPool,
}

impl MetricsEventHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock (creating on first touch) the metrics row of a product. The
    /// insert races with concurrent workers; ON CONFLICT DO NOTHING resolves
    /// the race and the following locked select always finds the row.
    async fn lock_metrics(
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
    ) -> CoreResult<ProductMetrics> {
        sqlx::query("INSERT INTO product_metrics (product_id) VALUES ($1) ON CONFLICT (product_id) DO NOTHING")
            .bind(product_id)
            .execute(&mut **tx)
            .await?;

        let metrics = sqlx::query_as::<_, ProductMetrics>(
            r#"
            SELECT id, product_id, like_count, sales_count, view_count, version, updated_at
            FROM product_metrics WHERE product_id = $1 FOR UPDATE
            "#,
        )
        .bind(product_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(metrics)
    }

    async fn save(tx: &mut Transaction<'_, Postgres>, metrics: &ProductMetrics) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE product_metrics
            SET like_count = $2, sales_count = $3, view_count = $4, version = $5,
                updated_at = NOW()
            WHERE product_id = $1
            "#,
        )
        .bind(metrics.product_id)
        .bind(metrics.like_count)
        .bind(metrics.sales_count)
        .bind(metrics.view_count)
        .bind(metrics.version)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Version-gated like counter update. `delta` is +1 or -1; the counter
    /// never goes negative.
    async fn apply_like_delta(
        &self,
        product_id: i64,
        delta: i64,
        event_version: i64,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut metrics = Self::lock_metrics(&mut tx, product_id).await?;

        if event_version <= metrics.version {
            tracing::debug!(
                product_id = product_id,
                event_version = event_version,
                current = metrics.version,
                "stale like event dropped"
            );
            tx.rollback().await?;
            return Ok(());
        }

        metrics.like_count = (metrics.like_count + delta).max(0);
        metrics.version = event_version;
        Self::save(&mut tx, &metrics).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_view(&self, product_id: i64, event_version: i64) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut metrics = Self::lock_metrics(&mut tx, product_id).await?;

        if event_version <= metrics.version {
            tx.rollback().await?;
            return Ok(());
        }

        metrics.view_count += 1;
        metrics.version = event_version;
        Self::save(&mut tx, &metrics).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_order(&self, payload: OrderCreatedPayload) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for item in &payload.items {
            if item.quantity <= 0 {
                continue;
            }
            let mut metrics = Self::lock_metrics(&mut tx, item.product_id).await?;
            metrics.sales_count += item.quantity;
            Self::save(&mut tx, &metrics).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for MetricsEventHandler {
    fn name(&self) -> &'static str {
        "product-metrics"
    }

    async fn handle(&self, record: &ConsumerRecord) -> CoreResult<()> {
        match record.event_type.as_str() {
            event_types::LIKE_ADDED => {
                let payload: LikePayload = serde_json::from_value(record.payload.clone())?;
                self.apply_like_delta(payload.product_id, 1, record.version)
                    .await
            }
            event_types::LIKE_REMOVED => {
                let payload: LikePayload = serde_json::from_value(record.payload.clone())?;
                self.apply_like_delta(payload.product_id, -1, record.version)
                    .await
            }
            event_types::PRODUCT_VIEWED => {
                let payload: ProductViewedPayload =
                    serde_json::from_value(record.payload.clone())?;
                self.apply_view(payload.product_id, record.version).await
            }
            event_types::ORDER_CREATED => {
                let payload: OrderCreatedPayload =
                    serde_json::from_value(record.payload.clone())?;
                self.apply_order(payload).await
            }
            // OrderCompleted / OrderCanceled ride the same topic but do not
            // touch the metrics read-model.
            _ => Ok(()),
        }
    }
}
