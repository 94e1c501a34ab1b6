//! Metrics Module
//!
//! Prometheus-compatible metrics for the event-driven core:
//! - outbox relay throughput (published/failed rows)
//! - consumer records applied/skipped/failed
//! - cache hits and misses
//! - payment-gateway call outcomes and circuit state
//! - batch ranker run counts

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Metric names as constants for consistency
pub mod names {
    // Outbox relay
    pub const OUTBOX_PUBLISHED_TOTAL: &str = "outbox_published_total";
    pub const OUTBOX_FAILED_TOTAL: &str = "outbox_failed_total";

    // Consumers
    pub const CONSUMER_RECORDS_APPLIED_TOTAL: &str = "consumer_records_applied_total";
    pub const CONSUMER_RECORDS_FAILED_TOTAL: &str = "consumer_records_failed_total";

    // Cache
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";

    // Payment gateway
    pub const PG_CALLS_TOTAL: &str = "pg_calls_total";
    pub const PG_CIRCUIT_OPEN_TOTAL: &str = "pg_circuit_open_total";

    // Batch ranker
    pub const RANK_BATCH_RUNS_TOTAL: &str = "rank_batch_runs_total";
}

/// Label keys
pub mod labels {
    pub const CONSUMER: &str = "consumer";
    pub const CACHE: &str = "cache";
    pub const OUTCOME: &str = "outcome";
    pub const PERIOD: &str = "period";
}

/// Initialize Prometheus metrics exporter. Returns a handle used by the
/// `/metrics` endpoint to render the current snapshot.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a payment-gateway call outcome (success / failure / timeout).
pub fn record_pg_call(outcome: &'static str) {
    counter!(names::PG_CALLS_TOTAL, labels::OUTCOME => outcome).increment(1);
}

/// Record a short-circuited gateway call.
pub fn record_pg_circuit_open() {
    counter!(names::PG_CIRCUIT_OPEN_TOTAL).increment(1);
}

/// Record a completed batch ranker run.
pub fn record_rank_batch_run(period: &'static str) {
    counter!(names::RANK_BATCH_RUNS_TOTAL, labels::PERIOD => period).increment(1);
}
