use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Success => write!(f, "SUCCESS"),
            PaymentStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub ref_order_id: i64,
    pub ref_user_id: i64,
    pub status: PaymentStatus,
    pub total_amount: Decimal,
    pub used_point: Decimal,
    pub paid_amount: Decimal,
    pub card_type: Option<String>,
    // never leaves the service unmasked
    #[serde(skip_serializing)]
    pub card_no: Option<String>,
    pub transaction_key: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// PENDING -> SUCCESS. Terminal states are sticky.
    pub fn mark_success(&mut self, transaction_key: Option<String>) -> CoreResult<()> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Success;
                self.transaction_key = transaction_key;
                Ok(())
            }
            terminal => Err(CoreError::InvalidState(format!(
                "payment {} is already {}",
                self.id, terminal
            ))),
        }
    }

    /// PENDING -> FAILED with a non-empty reason. Terminal states are sticky.
    pub fn mark_failed(&mut self, reason: &str) -> CoreResult<()> {
        if reason.trim().is_empty() {
            return Err(CoreError::BadRequest(
                "failure reason must not be empty".to_string(),
            ));
        }
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Failed;
                self.failure_reason = Some(reason.to_string());
                Ok(())
            }
            terminal => Err(CoreError::InvalidState(format!(
                "payment {} is already {}",
                self.id, terminal
            ))),
        }
    }

    /// Recompute `paid_amount` after a coupon changed the order total.
    /// Permitted only while PENDING.
    pub fn reprice(&mut self, new_total: Decimal) -> CoreResult<()> {
        if self.status != PaymentStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "payment {} is already {}",
                self.id, self.status
            )));
        }
        self.total_amount = new_total;
        self.paid_amount = (new_total - self.used_point).max(Decimal::ZERO);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending_payment() -> Payment {
        Payment {
            id: 1,
            ref_order_id: 1,
            ref_user_id: 10,
            status: PaymentStatus::Pending,
            total_amount: dec!(20000),
            used_point: dec!(5000),
            paid_amount: dec!(15000),
            card_type: None,
            card_no: None,
            transaction_key: None,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn success_is_sticky() {
        let mut payment = pending_payment();
        payment.mark_success(Some("tx-1".to_string())).unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert!(payment.mark_failed("late failure").is_err());
        assert!(payment.mark_success(None).is_err());
    }

    #[test]
    fn failure_requires_reason() {
        let mut payment = pending_payment();
        assert!(payment.mark_failed("  ").is_err());
        payment.mark_failed("card declined").unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("card declined"));
    }

    #[test]
    fn reprice_recomputes_paid_amount() {
        let mut payment = pending_payment();
        payment.reprice(dec!(17000)).unwrap();
        assert_eq!(payment.paid_amount, dec!(12000));
    }

    #[test]
    fn reprice_never_goes_negative() {
        let mut payment = pending_payment();
        payment.reprice(dec!(3000)).unwrap();
        assert_eq!(payment.paid_amount, Decimal::ZERO);
    }

    #[test]
    fn reprice_requires_pending() {
        let mut payment = pending_payment();
        payment.mark_success(None).unwrap();
        assert!(payment.reprice(dec!(1)).is_err());
    }
}
