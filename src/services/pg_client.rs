//! Payment gateway client
//!
//! Every remote call is bounded by a timeout, retried with exponential
//! backoff on transient failures (timeouts, 5xx) and gated by a circuit
//! breaker keyed per downstream. Card numbers are masked before logging.

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::services::circuit_breaker::CircuitBreaker;

pub const PG_DOWNSTREAM: &str = "pg-gateway";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PgPaymentRequest {
    pub order_id: i64,
    pub card_type: String,
    pub card_no: String,
    pub amount: Decimal,
    pub callback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgMeta {
    pub result: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PgTransactionStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgPaymentData {
    pub transaction_key: String,
    pub status: PgTransactionStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PgEnvelope {
    pub meta: PgMeta,
    #[serde(default)]
    pub data: Option<PgPaymentData>,
}

/// Outcome of a gateway call that completed at the HTTP level.
#[derive(Debug, Clone)]
pub enum PgCallOutcome {
    Accepted(PgPaymentData),
    Declined {
        code: Option<String>,
        message: String,
    },
}

/// Mask all but the last four digits for logs.
pub fn mask_card_no(card_no: &str) -> String {
    let visible = 4usize;
    if card_no.len() <= visible {
        return "*".repeat(card_no.len());
    }
    let masked_len = card_no.len() - visible;
    let tail = &card_no[masked_len..];
    format!("{}{}", "*".repeat(masked_len), tail)
}

enum CallError {
    Retryable(CoreError),
    Fatal(CoreError),
}

impl CallError {
    fn into_inner(self) -> CoreError {
        match self {
            CallError::Retryable(e) | CallError::Fatal(e) => e,
        }
    }
}

pub struct PgClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base: Duration,
}

pub struct PgClient {
    http: reqwest::Client,
    config: PgClientConfig,
    breaker: Arc<CircuitBreaker>,
}

impl PgClient {
    pub fn new(config: PgClientConfig, breaker: Arc<CircuitBreaker>) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("http client init failed: {e}")))?;
        Ok(Self {
            http,
            config,
            breaker,
        })
    }

    /// POST /payments. A declined payment is a normal outcome, not an error;
    /// errors mean the gateway could not be reached conclusively.
    pub async fn request_payment(
        &self,
        user_id: i64,
        request: &PgPaymentRequest,
    ) -> CoreResult<PgCallOutcome> {
        tracing::info!(
            order_id = request.order_id,
            card_no = %mask_card_no(&request.card_no),
            amount = %request.amount,
            "requesting payment from gateway"
        );
        let url = format!("{}/payments", self.config.base_url);
        self.call_with_resilience(|| {
            self.http
                .post(&url)
                .header("X-USER-ID", user_id.to_string())
                .json(request)
        })
        .await
    }

    /// GET /payments/{transactionKey} for reconciliation.
    pub async fn get_transaction(
        &self,
        user_id: i64,
        transaction_key: &str,
    ) -> CoreResult<PgCallOutcome> {
        let url = format!("{}/payments/{transaction_key}", self.config.base_url);
        self.call_with_resilience(|| self.http.get(&url).header("X-USER-ID", user_id.to_string()))
            .await
    }

    async fn call_with_resilience<F>(&self, build: F) -> CoreResult<PgCallOutcome>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        self.breaker.try_acquire().map_err(|e| {
            crate::metrics::record_pg_circuit_open();
            e
        })?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.call_once(build()).await {
                Ok(outcome) => {
                    self.breaker.record_success();
                    crate::metrics::record_pg_call("success");
                    return Ok(outcome);
                }
                Err(CallError::Retryable(e)) if attempt <= self.config.max_retries => {
                    crate::metrics::record_pg_call("retry");
                    let backoff = self.backoff_delay(attempt);
                    tracing::warn!(
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "gateway call failed, retrying: {e}"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    self.breaker.record_failure();
                    crate::metrics::record_pg_call("failure");
                    return Err(e.into_inner());
                }
            }
        }
    }

    async fn call_once(&self, request: reqwest::RequestBuilder) -> Result<PgCallOutcome, CallError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                CallError::Retryable(CoreError::UpstreamTimeout(e.to_string()))
            } else {
                CallError::Fatal(CoreError::UpstreamFailure(e.to_string()))
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(CallError::Retryable(CoreError::UpstreamFailure(format!(
                "gateway returned {status}"
            ))));
        }
        if !status.is_success() {
            return Err(CallError::Fatal(CoreError::UpstreamFailure(format!(
                "gateway returned {status}"
            ))));
        }

        let envelope: PgEnvelope = response.json().await.map_err(|e| {
            CallError::Fatal(CoreError::UpstreamFailure(format!(
                "malformed gateway response: {e}"
            )))
        })?;

        if envelope.meta.result == "SUCCESS" {
            match envelope.data {
                Some(data) => Ok(PgCallOutcome::Accepted(data)),
                None => Err(CallError::Fatal(CoreError::UpstreamFailure(
                    "gateway response missing data".to_string(),
                ))),
            }
        } else {
            Ok(PgCallOutcome::Declined {
                code: envelope.meta.error_code,
                message: envelope
                    .meta
                    .message
                    .unwrap_or_else(|| "payment declined".to_string()),
            })
        }
    }

    /// Exponential backoff with jitter: base * 2^(attempt-1) plus up to 50ms.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.config.retry_base.as_millis() as u64 * (1u64 << (attempt - 1).min(8));
        let jitter = rand::thread_rng().gen_range(0..50u64);
        Duration::from_millis(exp + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_numbers_are_masked() {
        assert_eq!(mask_card_no("1234567812345678"), "************5678");
        assert_eq!(mask_card_no("123"), "***");
    }

    #[test]
    fn envelope_parses_success_and_failure() {
        let success: PgEnvelope = serde_json::from_str(
            r#"{"meta":{"result":"SUCCESS"},"data":{"transactionKey":"tx-1","status":"PENDING"}}"#,
        )
        .unwrap();
        assert_eq!(success.meta.result, "SUCCESS");
        assert_eq!(
            success.data.unwrap().status,
            PgTransactionStatus::Pending
        );

        let failure: PgEnvelope = serde_json::from_str(
            r#"{"meta":{"result":"FAIL","errorCode":"LIMIT_EXCEEDED","message":"limit exceeded"}}"#,
        )
        .unwrap();
        assert_eq!(failure.meta.result, "FAIL");
        assert!(failure.data.is_none());
        assert_eq!(failure.meta.error_code.as_deref(), Some("LIMIT_EXCEEDED"));
    }
}
