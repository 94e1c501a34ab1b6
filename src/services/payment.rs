//! Payment handler
//!
//! Creates the Payment row for a PaymentRequested event and drives the
//! gateway call strictly after the local transaction committed, so no DB lock
//! is ever held across the network and a rolled-back write can never leave a
//! charged card behind. Gateway timeouts leave the payment PENDING for the
//! reconciliation worker.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::events::{
    CouponAppliedPayload, DomainEvent, PaymentCompletedPayload, PaymentFailedPayload,
    PaymentRequestedPayload,
};
use crate::models::{Payment, PaymentStatus};
use crate::outbox::OutboxStore;
use crate::services::pg_client::{
    PgCallOutcome, PgClient, PgPaymentRequest, PgTransactionStatus,
};

const MISSING_CARD_REASON: &str = "MISSING_CARD";

/// Asynchronous result posted back by the gateway.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgCallbackRequest {
    pub order_id: i64,
    pub transaction_key: String,
    pub status: PgTransactionStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

pub struct PaymentService {
    pool: PgPool,
    pg_client: Arc<PgClient>,
    callback_url: String,
}

impl PaymentService {
    pub fn new(pool: PgPool, pg_client: Arc<PgClient>, callback_url: String) -> Self {
        Self {
            pool,
            pg_client,
            callback_url,
        }
    }

    /// Consume a PaymentRequested event: persist the PENDING payment, then
    /// (after commit) call the gateway when a card amount remains.
    pub async fn handle_payment_requested(
        &self,
        payload: PaymentRequestedPayload,
    ) -> CoreResult<()> {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM payments WHERE ref_order_id = $1")
                .bind(payload.order_id)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            tracing::warn!(order_id = payload.order_id, "payment already exists, skipping");
            return Ok(());
        }

        let paid_amount = (payload.total_amount - payload.used_point_amount).max(Decimal::ZERO);

        let mut tx = self.pool.begin().await?;
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                ref_order_id, ref_user_id, status, total_amount,
                used_point, paid_amount, card_type, card_no
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, ref_order_id, ref_user_id, status, total_amount, used_point,
                      paid_amount, card_type, card_no, transaction_key, failure_reason,
                      created_at, updated_at
            "#,
        )
        .bind(payload.order_id)
        .bind(payload.user_id)
        .bind(PaymentStatus::Pending)
        .bind(payload.total_amount)
        .bind(payload.used_point_amount)
        .bind(paid_amount)
        .bind(&payload.card_type)
        .bind(&payload.card_no)
        .fetch_one(&mut *tx)
        .await?;

        // Fully covered by points: complete synchronously, no gateway involved.
        if paid_amount == Decimal::ZERO {
            let mut paid = payment.clone();
            paid.mark_success(None)?;
            update_payment_row(&mut tx, &paid).await?;
            OutboxStore::append(
                &mut tx,
                &DomainEvent::PaymentCompleted(PaymentCompletedPayload {
                    order_id: paid.ref_order_id,
                    payment_id: paid.id,
                    transaction_key: None,
                }),
            )
            .await?;
            tx.commit().await?;
            tracing::info!(order_id = payload.order_id, "payment covered by points");
            return Ok(());
        }

        let card = match (&payload.card_type, &payload.card_no) {
            (Some(card_type), Some(card_no))
                if !card_type.trim().is_empty() && !card_no.trim().is_empty() =>
            {
                Some((card_type.clone(), card_no.clone()))
            }
            _ => None,
        };

        // A card amount remains but no card was supplied.
        let (card_type, card_no) = match card {
            Some(card) => card,
            None => {
                let mut failed = payment.clone();
                failed.mark_failed(MISSING_CARD_REASON)?;
                update_payment_row(&mut tx, &failed).await?;
                OutboxStore::append(
                    &mut tx,
                    &DomainEvent::PaymentFailed(PaymentFailedPayload {
                        order_id: failed.ref_order_id,
                        payment_id: failed.id,
                        reason: MISSING_CARD_REASON.to_string(),
                        refund_point_amount: failed.used_point,
                    }),
                )
                .await?;
                tx.commit().await?;
                tracing::warn!(order_id = payload.order_id, "payment failed: missing card");
                return Ok(());
            }
        };

        // Commit before the remote call.
        tx.commit().await?;

        let outcome = self
            .pg_client
            .request_payment(
                payload.user_id,
                &PgPaymentRequest {
                    order_id: payload.order_id,
                    card_type,
                    card_no,
                    amount: paid_amount,
                    callback_url: self.callback_url.clone(),
                },
            )
            .await;

        match outcome {
            Ok(PgCallOutcome::Accepted(data)) => {
                self.store_transaction_key(payment.id, &data.transaction_key)
                    .await?;
                if data.status == PgTransactionStatus::Success {
                    self.complete_payment(payload.order_id, Some(data.transaction_key))
                        .await?;
                }
                // PENDING: the callback or the reconciler finishes the flow.
            }
            Ok(PgCallOutcome::Declined { code, message }) => {
                let reason = match code {
                    Some(code) => format!("{code}: {message}"),
                    None => message,
                };
                self.fail_payment(payload.order_id, &reason).await?;
            }
            Err(e) => {
                // Timeout or open circuit: payment stays PENDING; reservations
                // are kept until reconciliation resolves the transaction.
                tracing::warn!(
                    order_id = payload.order_id,
                    "gateway unresolved, payment left PENDING: {e}"
                );
            }
        }

        Ok(())
    }

    /// Consume a CouponApplied event: recompute the PENDING payment from the
    /// discounted total. Absent or terminal payments are a no-op.
    pub async fn handle_coupon_applied(&self, payload: CouponAppliedPayload) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let payment = lock_payment_by_order(&mut tx, payload.order_id).await?;

        let mut payment = match payment {
            Some(payment) if payment.status == PaymentStatus::Pending => payment,
            _ => {
                tx.rollback().await?;
                return Ok(());
            }
        };

        let new_total = (payment.total_amount - payload.discount_amount).max(Decimal::ZERO);
        payment.reprice(new_total)?;
        update_payment_row(&mut tx, &payment).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = payload.order_id,
            new_total = %new_total,
            "payment repriced after coupon"
        );
        Ok(())
    }

    /// Gateway callback endpoint entry point.
    pub async fn handle_pg_callback(&self, callback: PgCallbackRequest) -> CoreResult<()> {
        match callback.status {
            PgTransactionStatus::Success => {
                self.complete_payment(callback.order_id, Some(callback.transaction_key))
                    .await
            }
            PgTransactionStatus::Failed => {
                let reason = callback
                    .reason
                    .unwrap_or_else(|| "payment failed at gateway".to_string());
                self.fail_payment(callback.order_id, &reason).await
            }
            PgTransactionStatus::Pending => Ok(()),
        }
    }

    /// Re-query the gateway for PENDING payments that already hold a
    /// transaction key and are older than `min_age`.
    pub async fn reconcile_pending(&self, min_age: ChronoDuration) -> CoreResult<usize> {
        let cutoff = Utc::now() - min_age;
        let stale = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, ref_order_id, ref_user_id, status, total_amount, used_point,
                   paid_amount, card_type, card_no, transaction_key, failure_reason,
                   created_at, updated_at
            FROM payments
            WHERE status = $1 AND created_at < $2
            ORDER BY created_at ASC
            LIMIT 100
            "#,
        )
        .bind(PaymentStatus::Pending)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut resolved = 0usize;
        for payment in stale {
            let key = match &payment.transaction_key {
                Some(key) => key.clone(),
                None => {
                    // The request never left this process; nothing to query.
                    tracing::warn!(
                        payment_id = payment.id,
                        order_id = payment.ref_order_id,
                        "stale PENDING payment without transaction key"
                    );
                    continue;
                }
            };

            match self
                .pg_client
                .get_transaction(payment.ref_user_id, &key)
                .await
            {
                Ok(PgCallOutcome::Accepted(data)) => match data.status {
                    PgTransactionStatus::Success => {
                        self.complete_payment(payment.ref_order_id, Some(key)).await?;
                        resolved += 1;
                    }
                    PgTransactionStatus::Failed => {
                        self.fail_payment(payment.ref_order_id, "failed at gateway")
                            .await?;
                        resolved += 1;
                    }
                    PgTransactionStatus::Pending => {}
                },
                Ok(PgCallOutcome::Declined { message, .. }) => {
                    self.fail_payment(payment.ref_order_id, &message).await?;
                    resolved += 1;
                }
                Err(e) => {
                    tracing::warn!(payment_id = payment.id, "reconciliation query failed: {e}");
                }
            }
        }

        Ok(resolved)
    }

    async fn store_transaction_key(&self, payment_id: i64, key: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE payments SET transaction_key = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(payment_id)
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// PENDING -> SUCCESS + PaymentCompleted intent. Idempotent on terminal
    /// payments.
    async fn complete_payment(
        &self,
        order_id: i64,
        transaction_key: Option<String>,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let payment = lock_payment_by_order(&mut tx, order_id).await?;
        let mut payment = match payment {
            Some(payment) if payment.status == PaymentStatus::Pending => payment,
            Some(_) => {
                tx.rollback().await?;
                return Ok(());
            }
            None => return Err(CoreError::NotFound("payment", order_id.to_string())),
        };

        payment.mark_success(transaction_key)?;
        update_payment_row(&mut tx, &payment).await?;
        OutboxStore::append(
            &mut tx,
            &DomainEvent::PaymentCompleted(PaymentCompletedPayload {
                order_id: payment.ref_order_id,
                payment_id: payment.id,
                transaction_key: payment.transaction_key.clone(),
            }),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(order_id = order_id, "payment completed");
        Ok(())
    }

    /// PENDING -> FAILED + PaymentFailed intent carrying the refundable
    /// points. Idempotent on terminal payments.
    async fn fail_payment(&self, order_id: i64, reason: &str) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let payment = lock_payment_by_order(&mut tx, order_id).await?;
        let mut payment = match payment {
            Some(payment) if payment.status == PaymentStatus::Pending => payment,
            Some(_) => {
                tx.rollback().await?;
                return Ok(());
            }
            None => return Err(CoreError::NotFound("payment", order_id.to_string())),
        };

        payment.mark_failed(reason)?;
        update_payment_row(&mut tx, &payment).await?;
        OutboxStore::append(
            &mut tx,
            &DomainEvent::PaymentFailed(PaymentFailedPayload {
                order_id: payment.ref_order_id,
                payment_id: payment.id,
                reason: reason.to_string(),
                refund_point_amount: payment.used_point,
            }),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(order_id = order_id, reason = reason, "payment failed");
        Ok(())
    }

    pub async fn get_payment(&self, order_id: i64) -> CoreResult<Payment> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, ref_order_id, ref_user_id, status, total_amount, used_point,
                   paid_amount, card_type, card_no, transaction_key, failure_reason,
                   created_at, updated_at
            FROM payments WHERE ref_order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::NotFound("payment", order_id.to_string()))
    }
}

async fn lock_payment_by_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i64,
) -> CoreResult<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, ref_order_id, ref_user_id, status, total_amount, used_point,
               paid_amount, card_type, card_no, transaction_key, failure_reason,
               created_at, updated_at
        FROM payments WHERE ref_order_id = $1 FOR UPDATE
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(payment)
}

async fn update_payment_row(
    tx: &mut Transaction<'_, Postgres>,
    payment: &Payment,
) -> CoreResult<()> {
    sqlx::query(
        r#"
        UPDATE payments
        SET status = $2, total_amount = $3, paid_amount = $4,
            transaction_key = $5, failure_reason = $6, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(payment.id)
    .bind(payment.status)
    .bind(payment.total_amount)
    .bind(payment.paid_amount)
    .bind(&payment.transaction_key)
    .bind(&payment.failure_reason)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
