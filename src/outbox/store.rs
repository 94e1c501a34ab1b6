//! Transactional outbox store
//!
//! An event intent row is appended in the same local transaction as the
//! business mutation. Versions are assigned per (aggregate_id, aggregate_type)
//! inside SQL and guarded by a unique index; races surface as unique
//! violations and are resolved by optimistic retry under a savepoint.

#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Acquire, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::events::DomainEvent;

const MAX_VERSION_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

#[derive(Debug, Clone, FromRow)]
pub struct OutboxEventRow {
    pub id: i64,
    pub event_id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub version: i64,
    pub status: OutboxStatus,
    pub topic: String,
    pub partition_key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct OutboxStore {
    pool: PgPool,
}

impl OutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an event inside the caller's transaction. Returns the assigned
    /// event id. MUST be called within the transaction that performs the
    /// business mutation.
    pub async fn append(
        tx: &mut Transaction<'_, Postgres>,
        event: &DomainEvent,
    ) -> CoreResult<Uuid> {
        let payload = event.payload_json()?;
        let event_id = Uuid::new_v4();
        let aggregate_type = event.aggregate_type();
        let aggregate_id = event.aggregate_id();

        for attempt in 1..=MAX_VERSION_RETRIES {
            // Savepoint so a version race does not poison the outer transaction.
            let mut savepoint = tx.begin().await?;

            let result = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO outbox_events (
                    event_id, aggregate_type, aggregate_id, event_type,
                    version, status, topic, partition_key, payload
                )
                VALUES (
                    $1, $2, $3, $4,
                    (
                        SELECT COALESCE(MAX(version), 0) + 1
                        FROM outbox_events
                        WHERE aggregate_id = $3 AND aggregate_type = $2
                    ),
                    'PENDING', $5, $6, $7
                )
                RETURNING version
                "#,
            )
            .bind(event_id)
            .bind(aggregate_type)
            .bind(&aggregate_id)
            .bind(event.event_type())
            .bind(event.topic())
            .bind(event.partition_key())
            .bind(&payload)
            .fetch_one(&mut *savepoint)
            .await;

            match result {
                Ok(version) => {
                    savepoint.commit().await?;
                    tracing::debug!(
                        event_id = %event_id,
                        event_type = event.event_type(),
                        aggregate_id = %aggregate_id,
                        version = version,
                        "outbox event appended"
                    );
                    return Ok(event_id);
                }
                Err(e) if is_unique_violation(&e) && attempt < MAX_VERSION_RETRIES => {
                    savepoint.rollback().await?;
                    tracing::debug!(
                        aggregate_id = %aggregate_id,
                        attempt = attempt,
                        "outbox version race, retrying"
                    );
                }
                Err(e) => {
                    savepoint.rollback().await.ok();
                    return Err(e.into());
                }
            }
        }

        Err(CoreError::Conflict(format!(
            "outbox version contention on {aggregate_type}/{aggregate_id}"
        )))
    }

    /// Oldest PENDING rows, up to `limit`, in append order.
    pub async fn fetch_pending(&self, limit: i64) -> CoreResult<Vec<OutboxEventRow>> {
        let rows = sqlx::query_as::<_, OutboxEventRow>(
            r#"
            SELECT id, event_id, aggregate_type, aggregate_id, event_type,
                   version, status, topic, partition_key, payload,
                   created_at, published_at
            FROM outbox_events
            WHERE status = 'PENDING'
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_published(&self, id: i64) -> CoreResult<()> {
        sqlx::query(
            "UPDATE outbox_events SET status = 'PUBLISHED', published_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// A failed row stays in the table for an external re-queue to reset.
    pub async fn mark_failed(&self, id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE outbox_events SET status = 'FAILED' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
