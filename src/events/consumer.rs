//! Kafka consumer worker loop
//!
//! Each consumer group runs a pool of worker tasks. A worker polls a batch,
//! processes records one by one (idempotency check, domain effect, handled
//! marker) and then commits the batch offsets manually. A skipped commit only
//! causes redelivery, which the idempotency table makes harmless.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::events::headers;
use crate::idempotency::EventHandledStore;

/// A decoded Kafka record with the standard event headers.
#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub event_id: Option<Uuid>,
    pub event_type: String,
    pub version: i64,
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Domain effect applied per record (step 3 of the per-record protocol; the
/// loop owns the idempotency bookkeeping around it).
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, record: &ConsumerRecord) -> CoreResult<()>;
}

#[derive(Clone)]
pub struct ConsumerLoopConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub topics: Vec<String>,
    pub batch_size: usize,
    pub poll_timeout: Duration,
}

fn build_consumer(config: &ConsumerLoopConfig) -> CoreResult<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("group.id", &config.group_id)
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("max.poll.interval.ms", "300000")
        .set("fetch.min.bytes", "1")
        .create()
        .map_err(|e| CoreError::Internal(format!("kafka consumer init failed: {e}")))?;

    let topic_refs: Vec<&str> = config.topics.iter().map(String::as_str).collect();
    consumer
        .subscribe(&topic_refs)
        .map_err(|e| CoreError::Internal(format!("kafka subscribe failed: {e}")))?;

    Ok(consumer)
}

fn decode_record(message: &rdkafka::message::BorrowedMessage<'_>) -> ConsumerRecord {
    let mut event_id = None;
    let mut event_type = String::new();
    let mut version = 0i64;

    if let Some(hdrs) = message.headers() {
        for header in hdrs.iter() {
            let value = header
                .value
                .map(|v| String::from_utf8_lossy(v).to_string())
                .unwrap_or_default();
            match header.key {
                headers::EVENT_ID => event_id = Uuid::parse_str(&value).ok(),
                headers::EVENT_TYPE => event_type = value,
                headers::VERSION => version = value.parse().unwrap_or(0),
                _ => {}
            }
        }
    }

    let payload = message
        .payload()
        .and_then(|bytes| serde_json::from_slice(bytes).ok())
        .unwrap_or(serde_json::Value::Null);

    ConsumerRecord {
        event_id,
        event_type,
        version,
        topic: message.topic().to_string(),
        payload,
    }
}

/// Process one record through the idempotency protocol. Returns true when the
/// domain effect was applied, false when the record was skipped.
async fn process_record(
    record: &ConsumerRecord,
    handler: &Arc<dyn EventHandler>,
    handled: &EventHandledStore,
) -> CoreResult<bool> {
    let event_id = match record.event_id {
        Some(id) => id,
        None => {
            tracing::warn!(
                consumer = handler.name(),
                topic = %record.topic,
                event_type = %record.event_type,
                "record without eventId header, skipping"
            );
            return Ok(false);
        }
    };

    if handled.is_handled(event_id).await? {
        tracing::debug!(
            consumer = handler.name(),
            event_id = %event_id,
            "event already handled, skipping"
        );
        return Ok(false);
    }

    handler.handle(record).await?;
    handled
        .mark_handled(event_id, &record.event_type, &record.topic)
        .await?;

    Ok(true)
}

/// Run one worker of a consumer group until the process exits.
pub async fn run_consumer_loop(
    config: ConsumerLoopConfig,
    handler: Arc<dyn EventHandler>,
    handled: EventHandledStore,
) {
    let consumer = match build_consumer(&config) {
        Ok(consumer) => consumer,
        Err(e) => {
            tracing::error!(
                consumer = handler.name(),
                group = %config.group_id,
                "failed to start consumer: {e}"
            );
            return;
        }
    };

    tracing::info!(
        consumer = handler.name(),
        group = %config.group_id,
        topics = ?config.topics,
        "consumer worker started"
    );

    loop {
        // Block for the first record, then drain up to batch_size.
        let mut batch = Vec::with_capacity(config.batch_size);
        match consumer.recv().await {
            Ok(message) => batch.push(decode_record(&message)),
            Err(e) => {
                tracing::warn!(consumer = handler.name(), "kafka receive error: {e}");
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
        }
        while batch.len() < config.batch_size {
            match tokio::time::timeout(config.poll_timeout, consumer.recv()).await {
                Ok(Ok(message)) => batch.push(decode_record(&message)),
                Ok(Err(e)) => {
                    tracing::warn!(consumer = handler.name(), "kafka receive error: {e}");
                    break;
                }
                Err(_) => break,
            }
        }

        let mut applied = 0usize;
        for record in &batch {
            match process_record(record, &handler, &handled).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                // Per-record failures are logged and the batch continues;
                // the idempotency table protects the records already applied.
                Err(e) => {
                    tracing::error!(
                        consumer = handler.name(),
                        event_type = %record.event_type,
                        event_id = ?record.event_id,
                        "record processing failed: {e}"
                    );
                    metrics::counter!(crate::metrics::names::CONSUMER_RECORDS_FAILED_TOTAL,
                        "consumer" => handler.name())
                    .increment(1);
                }
            }
        }

        metrics::counter!(crate::metrics::names::CONSUMER_RECORDS_APPLIED_TOTAL,
            "consumer" => handler.name())
        .increment(applied as u64);

        if let Err(e) = consumer.commit_consumer_state(CommitMode::Async) {
            tracing::warn!(consumer = handler.name(), "offset commit failed: {e}");
        }
    }
}
