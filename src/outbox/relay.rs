//! Outbox relay worker
//!
//! Polls PENDING outbox rows and ships them to Kafka with the standard event
//! headers. Each row succeeds or fails on its own; a send failure marks that
//! row FAILED and never aborts the rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreResult;
use crate::events::producer::EventProducer;
use crate::outbox::store::OutboxStore;

pub struct OutboxRelay {
    store: OutboxStore,
    producer: Arc<EventProducer>,
    batch_size: i64,
    poll_interval: Duration,
}

impl OutboxRelay {
    pub fn new(
        store: OutboxStore,
        producer: Arc<EventProducer>,
        batch_size: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            producer,
            batch_size,
            poll_interval,
        }
    }

    /// Run until the process exits.
    pub async fn run(self) {
        tracing::info!(
            batch_size = self.batch_size,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "outbox relay started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            match self.relay_once().await {
                Ok(0) => {}
                Ok(published) => {
                    tracing::debug!(published = published, "outbox batch relayed");
                }
                Err(e) => {
                    tracing::error!("outbox relay cycle failed: {e}");
                }
            }
        }
    }

    /// Relay one batch. Returns the number of rows published.
    pub async fn relay_once(&self) -> CoreResult<usize> {
        let rows = self.store.fetch_pending(self.batch_size).await?;
        let mut published = 0usize;

        for row in rows {
            let sent = self
                .producer
                .publish(
                    &row.topic,
                    &row.partition_key,
                    row.event_id,
                    &row.event_type,
                    row.version,
                    &row.payload,
                )
                .await;

            match sent {
                Ok(()) => {
                    self.store.mark_published(row.id).await?;
                    published += 1;
                    metrics::counter!(crate::metrics::names::OUTBOX_PUBLISHED_TOTAL).increment(1);
                }
                Err(e) => {
                    tracing::warn!(
                        event_id = %row.event_id,
                        event_type = %row.event_type,
                        topic = %row.topic,
                        "outbox publish failed, marking row FAILED: {e}"
                    );
                    self.store.mark_failed(row.id).await?;
                    metrics::counter!(crate::metrics::names::OUTBOX_FAILED_TOTAL).increment(1);
                }
            }
        }

        Ok(published)
    }
}
