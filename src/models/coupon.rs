use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "coupon_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponType {
    FixedAmount,
    Percentage,
}

/// An issued coupon. A coupon is applied at most once, to at most one order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub ref_user_id: i64,
    pub coupon_type: CouponType,
    pub discount_value: Decimal,
    pub used: bool,
    pub used_order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Pure discount computation over the order amount.
    pub fn discount(&self, order_amount: Decimal) -> Decimal {
        discount(order_amount, self.coupon_type, self.discount_value)
    }

    pub fn use_for_order(&mut self, order_id: i64) -> CoreResult<()> {
        if self.used {
            return Err(CoreError::Conflict(format!(
                "coupon {} already used",
                self.code
            )));
        }
        self.used = true;
        self.used_order_id = Some(order_id);
        Ok(())
    }
}

/// Discount for an order amount under the given coupon variant. Fixed coupons
/// are capped at the order amount; percentage coupons round to whole cents.
pub fn discount(order_amount: Decimal, coupon_type: CouponType, value: Decimal) -> Decimal {
    if order_amount <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    match coupon_type {
        CouponType::FixedAmount => value.min(order_amount).max(Decimal::ZERO),
        CouponType::Percentage => {
            (order_amount * value / Decimal::from(100)).round_dp(2).min(order_amount)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fixed_discount_is_capped_at_order_amount() {
        assert_eq!(
            discount(dec!(5000), CouponType::FixedAmount, dec!(3000)),
            dec!(3000)
        );
        assert_eq!(
            discount(dec!(2000), CouponType::FixedAmount, dec!(3000)),
            dec!(2000)
        );
    }

    #[test]
    fn percentage_discount() {
        assert_eq!(
            discount(dec!(20000), CouponType::Percentage, dec!(10)),
            dec!(2000)
        );
        assert_eq!(
            discount(dec!(999), CouponType::Percentage, dec!(15)),
            dec!(149.85)
        );
    }

    #[test]
    fn zero_order_amount_discounts_nothing() {
        assert_eq!(
            discount(Decimal::ZERO, CouponType::FixedAmount, dec!(1000)),
            Decimal::ZERO
        );
        assert_eq!(
            discount(dec!(-10), CouponType::Percentage, dec!(10)),
            Decimal::ZERO
        );
    }

    #[test]
    fn coupon_is_single_use() {
        let mut coupon = Coupon {
            id: 1,
            code: "WELCOME".to_string(),
            ref_user_id: 7,
            coupon_type: CouponType::FixedAmount,
            discount_value: dec!(1000),
            used: false,
            used_order_id: None,
            created_at: Utc::now(),
        };
        coupon.use_for_order(42).unwrap();
        assert_eq!(coupon.used_order_id, Some(42));
        assert!(coupon.use_for_order(43).is_err());
    }
}
