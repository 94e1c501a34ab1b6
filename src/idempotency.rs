//! Consumer-side idempotency
//!
//! The `event_handled` table records every applied event id per consumer
//! group. Its primary key enforces at-most-once effect even when Kafka
//! redelivers a batch whose acknowledgement was skipped.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::CoreResult;

#[derive(Clone)]
pub struct EventHandledStore {
    pool: PgPool,
    consumer_group: String,
}

impl EventHandledStore {
    pub fn new(pool: PgPool, consumer_group: &str) -> Self {
        Self {
            pool,
            consumer_group: consumer_group.to_string(),
        }
    }

    /// Whether this event id was already applied by this consumer group.
    pub async fn is_handled(&self, event_id: Uuid) -> CoreResult<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT event_id FROM event_handled WHERE consumer_group = $1 AND event_id = $2",
        )
        .bind(&self.consumer_group)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Record the event as handled. A concurrent worker of the same group may
    /// have recorded it first; the unique violation is treated as success.
    pub async fn mark_handled(
        &self,
        event_id: Uuid,
        event_type: &str,
        topic: &str,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO event_handled (consumer_group, event_id, event_type, topic)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (consumer_group, event_id) DO NOTHING
            "#,
        )
        .bind(&self.consumer_group)
        .bind(event_id)
        .bind(event_type)
        .bind(topic)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
