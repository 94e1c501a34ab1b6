//! Coupon service
//!
//! Marks an issued coupon used and appends the CouponApplied intent; the
//! order and payment aggregates react to the event, never inside this
//! transaction.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::events::{CouponAppliedPayload, DomainEvent};
use crate::models::{Coupon, CouponType, Order, OrderStatus};
use crate::outbox::OutboxStore;

pub struct CouponService {
    pool: PgPool,
}

impl CouponService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn issue_coupon(
        &self,
        user_id: i64,
        coupon_type: CouponType,
        discount_value: Decimal,
    ) -> CoreResult<Coupon> {
        if discount_value <= Decimal::ZERO {
            return Err(CoreError::BadRequest(
                "discount value must be positive".to_string(),
            ));
        }
        if coupon_type == CouponType::Percentage && discount_value > Decimal::from(100) {
            return Err(CoreError::BadRequest(
                "percentage discount cannot exceed 100".to_string(),
            ));
        }

        let code = format!("CPN-{}", Uuid::new_v4().simple());
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            INSERT INTO coupons (code, ref_user_id, coupon_type, discount_value)
            VALUES ($1, $2, $3, $4)
            RETURNING id, code, ref_user_id, coupon_type, discount_value,
                      used, used_order_id, created_at
            "#,
        )
        .bind(&code)
        .bind(user_id)
        .bind(coupon_type)
        .bind(discount_value)
        .fetch_one(&self.pool)
        .await?;

        Ok(coupon)
    }

    /// Apply a coupon to an order. The coupon row is the single aggregate
    /// mutated here; the discount reaches the order and payment through the
    /// CouponApplied event.
    pub async fn apply_coupon(&self, order_id: i64, code: &str) -> CoreResult<Decimal> {
        let mut tx = self.pool.begin().await?;

        let mut coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT id, code, ref_user_id, coupon_type, discount_value,
                   used, used_order_id, created_at
            FROM coupons WHERE code = $1 FOR UPDATE
            "#,
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::NotFound("coupon", code.to_string()))?;

        // snapshot read; the order consumer re-validates its own state
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, ref_user_id, status, total_amount, discount_amount,
                   coupon_code, created_at, updated_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::NotFound("order", order_id.to_string()))?;

        if order.status != OrderStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "order {} is already {}",
                order.id, order.status
            )));
        }
        if coupon.ref_user_id != order.ref_user_id {
            return Err(CoreError::BadRequest(
                "coupon belongs to a different user".to_string(),
            ));
        }

        let discount = coupon.discount(order.subtotal());
        coupon.use_for_order(order_id)?;

        sqlx::query("UPDATE coupons SET used = TRUE, used_order_id = $2 WHERE id = $1")
            .bind(coupon.id)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        OutboxStore::append(
            &mut tx,
            &DomainEvent::CouponApplied(CouponAppliedPayload {
                order_id,
                coupon_code: coupon.code.clone(),
                discount_amount: discount,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = order_id,
            coupon = %coupon.code,
            discount = %discount,
            "coupon applied"
        );
        Ok(discount)
    }
}
