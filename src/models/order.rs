use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Completed => write!(f, "COMPLETED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Snapshot of a product at order time. Immutable once taken.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub ref_product_id: i64,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub ref_user_id: i64,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Subtotal before any coupon discount.
    pub fn subtotal(&self) -> Decimal {
        self.total_amount + self.discount_amount
    }

    /// PENDING -> COMPLETED. Terminal states are sticky.
    pub fn complete(&mut self) -> CoreResult<()> {
        match self.status {
            OrderStatus::Pending => {
                self.status = OrderStatus::Completed;
                Ok(())
            }
            terminal => Err(CoreError::InvalidState(format!(
                "order {} is already {}",
                self.id, terminal
            ))),
        }
    }

    /// PENDING -> CANCELED. Terminal states are sticky.
    pub fn cancel(&mut self) -> CoreResult<()> {
        match self.status {
            OrderStatus::Pending => {
                self.status = OrderStatus::Canceled;
                Ok(())
            }
            terminal => Err(CoreError::InvalidState(format!(
                "order {} is already {}",
                self.id, terminal
            ))),
        }
    }

    /// Apply a coupon discount, recomputing the total. Permitted only while
    /// PENDING; applying a second coupon is rejected.
    pub fn apply_discount(&mut self, coupon_code: &str, discount: Decimal) -> CoreResult<()> {
        if self.status != OrderStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "order {} is already {}",
                self.id, self.status
            )));
        }
        if self.coupon_code.is_some() {
            return Err(CoreError::Conflict(format!(
                "order {} already has a coupon applied",
                self.id
            )));
        }
        if discount < Decimal::ZERO {
            return Err(CoreError::BadRequest(
                "discount must not be negative".to_string(),
            ));
        }
        let subtotal = self.subtotal();
        let discount = discount.min(subtotal);
        self.coupon_code = Some(coupon_code.to_string());
        self.discount_amount = discount;
        self.total_amount = subtotal - discount;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CardInfo {
    pub card_type: String,
    pub card_no: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: i64,
    pub items: Vec<OrderItemRequest>,
    #[serde(default)]
    pub point_amount: Option<Decimal>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub card: Option<CardInfo>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: i64,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending_order() -> Order {
        Order {
            id: 1,
            ref_user_id: 10,
            status: OrderStatus::Pending,
            total_amount: dec!(20000),
            discount_amount: Decimal::ZERO,
            coupon_code: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pending_completes_once() {
        let mut order = pending_order();
        order.complete().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.complete().is_err());
        assert!(order.cancel().is_err());
    }

    #[test]
    fn pending_cancels_once() {
        let mut order = pending_order();
        order.cancel().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert!(order.complete().is_err());
    }

    #[test]
    fn discount_recomputes_total() {
        let mut order = pending_order();
        order.apply_discount("WELCOME", dec!(3000)).unwrap();
        assert_eq!(order.discount_amount, dec!(3000));
        assert_eq!(order.total_amount, dec!(17000));
        assert_eq!(order.subtotal(), dec!(20000));
    }

    #[test]
    fn discount_is_capped_at_subtotal() {
        let mut order = pending_order();
        order.apply_discount("BIG", dec!(99999)).unwrap();
        assert_eq!(order.total_amount, Decimal::ZERO);
        assert_eq!(order.discount_amount, dec!(20000));
    }

    #[test]
    fn second_coupon_is_rejected() {
        let mut order = pending_order();
        order.apply_discount("A", dec!(1000)).unwrap();
        let err = order.apply_discount("B", dec!(1000)).unwrap_err();
        assert_eq!(err.error_type(), "CONFLICT");
    }

    #[test]
    fn discount_requires_pending() {
        let mut order = pending_order();
        order.complete().unwrap();
        let err = order.apply_discount("A", dec!(1000)).unwrap_err();
        assert_eq!(err.error_type(), "INVALID_STATE");
    }

    #[test]
    fn item_line_total() {
        let item = OrderItem {
            ref_product_id: 1,
            product_name: "sneaker".to_string(),
            price: dec!(10000),
            quantity: 2,
        };
        assert_eq!(item.line_total(), dec!(20000));
    }
}
