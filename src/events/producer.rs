//! Kafka producer
//!
//! Idempotent producer used by the outbox relay. Ordering per aggregate is
//! preserved by keying every record with the aggregate's partition key.

use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::events::headers;

pub struct EventProducer {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl EventProducer {
    pub fn new(bootstrap_servers: &str) -> CoreResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| CoreError::Internal(format!("kafka producer init failed: {e}")))?;

        Ok(Self {
            producer,
            delivery_timeout: Duration::from_secs(30),
        })
    }

    /// Send one event. The version header carries the per-aggregate sequence
    /// number consumers use for gating.
    pub async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        event_id: Uuid,
        event_type: &str,
        version: i64,
        payload: &serde_json::Value,
    ) -> CoreResult<()> {
        let payload_str = serde_json::to_string(payload)?;
        let event_id_str = event_id.to_string();
        let version_str = version.to_string();

        let kafka_headers = OwnedHeaders::new()
            .insert(Header {
                key: headers::EVENT_ID,
                value: Some(event_id_str.as_bytes()),
            })
            .insert(Header {
                key: headers::EVENT_TYPE,
                value: Some(event_type.as_bytes()),
            })
            .insert(Header {
                key: headers::VERSION,
                value: Some(version_str.as_bytes()),
            });

        let record = FutureRecord::to(topic)
            .key(partition_key)
            .payload(&payload_str)
            .headers(kafka_headers);

        self.producer
            .send(record, self.delivery_timeout)
            .await
            .map_err(|(err, _)| CoreError::UpstreamFailure(format!("kafka send failed: {err}")))?;

        tracing::debug!(
            event_id = %event_id_str,
            event_type = event_type,
            topic = topic,
            version = version,
            "event published"
        );

        Ok(())
    }
}
