//! Like service
//!
//! Idempotent like/unlike. Only a first insertion (or an actual removal)
//! touches the denormalized counter and emits an event; replays are no-ops at
//! the database, the outbox and the read models alike.

use sqlx::PgPool;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::error::{CoreError, CoreResult};
use crate::events::{DomainEvent, LikePayload};
use crate::models::LikeResponse;
use crate::outbox::OutboxStore;

pub struct LikeService {
    pool: PgPool,
    cache: Arc<CacheManager>,
}

impl LikeService {
    pub fn new(pool: PgPool, cache: Arc<CacheManager>) -> Self {
        Self { pool, cache }
    }

    pub async fn add_like(&self, user_id: i64, product_id: i64) -> CoreResult<LikeResponse> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(CoreError::NotFound("user", user_id.to_string()));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO likes (ref_user_id, ref_product_id)
            VALUES ($1, $2)
            ON CONFLICT (ref_user_id, ref_product_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let like_count = if inserted > 0 {
            let like_count: i64 = sqlx::query_scalar(
                r#"
                UPDATE products SET like_count = like_count + 1, updated_at = NOW()
                WHERE id = $1
                RETURNING like_count
                "#,
            )
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound("product", product_id.to_string()))?;

            OutboxStore::append(
                &mut tx,
                &DomainEvent::LikeAdded(LikePayload {
                    user_id,
                    product_id,
                }),
            )
            .await?;
            like_count
        } else {
            // duplicate like: leave everything untouched
            sqlx::query_scalar::<_, i64>("SELECT like_count FROM products WHERE id = $1")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| CoreError::NotFound("product", product_id.to_string()))?
        };

        tx.commit().await?;

        if inserted > 0 {
            self.invalidate(product_id).await;
        }

        Ok(LikeResponse {
            product_id,
            liked: true,
            like_count,
        })
    }

    pub async fn remove_like(&self, user_id: i64, product_id: i64) -> CoreResult<LikeResponse> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM likes WHERE ref_user_id = $1 AND ref_product_id = $2",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let like_count = if removed > 0 {
            let like_count: i64 = sqlx::query_scalar(
                r#"
                UPDATE products
                SET like_count = GREATEST(like_count - 1, 0), updated_at = NOW()
                WHERE id = $1
                RETURNING like_count
                "#,
            )
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound("product", product_id.to_string()))?;

            OutboxStore::append(
                &mut tx,
                &DomainEvent::LikeRemoved(LikePayload {
                    user_id,
                    product_id,
                }),
            )
            .await?;
            like_count
        } else {
            sqlx::query_scalar::<_, i64>("SELECT like_count FROM products WHERE id = $1")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| CoreError::NotFound("product", product_id.to_string()))?
        };

        tx.commit().await?;

        if removed > 0 {
            self.invalidate(product_id).await;
        }

        Ok(LikeResponse {
            product_id,
            liked: false,
            like_count,
        })
    }

    /// like_count shows up in listings and details, so both get evicted.
    async fn invalidate(&self, product_id: i64) {
        if let Err(e) = self.cache.product().invalidate_product(product_id).await {
            tracing::warn!(product_id = product_id, "cache invalidation failed: {e}");
        }
    }
}
