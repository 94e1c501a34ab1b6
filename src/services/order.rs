//! Order orchestrator
//!
//! `create_order` reserves stock and points and appends the outbox intents in
//! one local transaction; nothing survives a failed step. Compensation
//! (cancellation) restores every reservation and is idempotent on terminal
//! orders. Cross-aggregate effects (payment, metrics, ranking) happen through
//! the outbox, never inside this transaction.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{CoreError, CoreResult};
use crate::events::{
    DomainEvent, OrderCanceledPayload, OrderCompletedPayload, OrderCreatedPayload,
    OrderItemPayload, PaymentRequestedPayload,
};
use crate::models::{
    CreateOrderRequest, Order, OrderItem, OrderResponse, OrderStatus, PaymentStatus, Product, User,
};
use crate::outbox::OutboxStore;

pub struct OrderService {
    pool: PgPool,
}

impl OrderService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Place an order: lock user, lock products in ascending id order, reserve
    /// stock and points, persist the order and append the outbox intents.
    pub async fn create_order(&self, request: CreateOrderRequest) -> CoreResult<OrderResponse> {
        if request.items.is_empty() {
            return Err(CoreError::BadRequest("order has no items".to_string()));
        }
        let requested_point = request.point_amount.unwrap_or(Decimal::ZERO);
        if requested_point < Decimal::ZERO {
            return Err(CoreError::BadRequest(
                "point amount must not be negative".to_string(),
            ));
        }

        // ascending product id order avoids lock cycles between orders
        let mut items = request.items;
        items.sort_by_key(|item| item.product_id);
        if items.windows(2).any(|w| w[0].product_id == w[1].product_id) {
            return Err(CoreError::BadRequest(
                "duplicate product in order".to_string(),
            ));
        }
        if items.iter().any(|item| item.quantity <= 0) {
            return Err(CoreError::BadRequest(
                "quantity must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let user = lock_user(&mut tx, request.user_id).await?;

        let mut order_items = Vec::with_capacity(items.len());
        for item in &items {
            let mut product = lock_product(&mut tx, item.product_id).await?;
            product.decrease_stock(item.quantity)?;
            sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
                .bind(product.id)
                .bind(product.stock)
                .execute(&mut *tx)
                .await?;
            order_items.push(OrderItem {
                ref_product_id: product.id,
                product_name: product.name.clone(),
                price: product.price,
                quantity: item.quantity,
            });
        }

        let subtotal: Decimal = order_items.iter().map(OrderItem::line_total).sum();
        let used_point = requested_point.min(user.point_balance).min(subtotal);
        let new_point = user.point().subtract(used_point)?;
        sqlx::query("UPDATE users SET point_balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(user.id)
            .bind(new_point.balance())
            .execute(&mut *tx)
            .await?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (ref_user_id, status, total_amount, discount_amount)
            VALUES ($1, $2, $3, 0)
            RETURNING id, ref_user_id, status, total_amount, discount_amount,
                      coupon_code, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(OrderStatus::Pending)
        .bind(subtotal)
        .fetch_one(&mut *tx)
        .await?;

        for item in &order_items {
            sqlx::query(
                r#"
                INSERT INTO order_items (ref_order_id, ref_product_id, product_name, price, quantity)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id)
            .bind(item.ref_product_id)
            .bind(&item.product_name)
            .bind(item.price)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        let item_payloads: Vec<OrderItemPayload> = order_items
            .iter()
            .map(|item| OrderItemPayload {
                product_id: item.ref_product_id,
                product_name: item.product_name.clone(),
                price: item.price,
                quantity: item.quantity,
            })
            .collect();

        OutboxStore::append(
            &mut tx,
            &DomainEvent::OrderCreated(OrderCreatedPayload {
                order_id: order.id,
                user_id: user.id,
                subtotal,
                used_point_amount: used_point,
                items: item_payloads,
            }),
        )
        .await?;

        OutboxStore::append(
            &mut tx,
            &DomainEvent::PaymentRequested(PaymentRequestedPayload {
                order_id: order.id,
                user_id: user.id,
                total_amount: subtotal,
                used_point_amount: used_point,
                card_type: request.card.as_ref().map(|c| c.card_type.clone()),
                card_no: request.card.as_ref().map(|c| c.card_no.clone()),
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = order.id,
            user_id = user.id,
            subtotal = %subtotal,
            used_point = %used_point,
            "order created"
        );

        Ok(OrderResponse {
            order_id: order.id,
            status: order.status,
            total_amount: order.total_amount,
            discount_amount: order.discount_amount,
            items: order_items,
            created_at: order.created_at,
        })
    }

    /// User-initiated cancellation. A no-op when the order is terminal.
    pub async fn cancel_order(&self, order_id: i64) -> CoreResult<OrderResponse> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, order_id).await?;

        if order.status.is_terminal() {
            tx.rollback().await?;
            return self.get_order(order_id).await;
        }

        let refund_points = requested_point_amount(&mut tx, order_id).await?;
        let order = cancel_within_tx(&mut tx, order, refund_points).await?;
        tx.commit().await?;

        tracing::info!(order_id = order.id, refund = %refund_points, "order canceled");
        self.order_response(order).await
    }

    /// Reconcile a payment result into the order state machine. Terminal
    /// orders are left untouched.
    pub async fn on_payment_result(
        &self,
        order_id: i64,
        status: PaymentStatus,
        reason: Option<&str>,
        refund_points: Option<Decimal>,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut order = lock_order(&mut tx, order_id).await?;

        if order.status.is_terminal() {
            tx.rollback().await?;
            return Ok(());
        }

        match status {
            PaymentStatus::Success => {
                order.complete()?;
                sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
                    .bind(order.id)
                    .bind(order.status)
                    .execute(&mut *tx)
                    .await?;
                OutboxStore::append(
                    &mut tx,
                    &DomainEvent::OrderCompleted(OrderCompletedPayload {
                        order_id: order.id,
                        user_id: order.ref_user_id,
                        total_amount: order.total_amount,
                    }),
                )
                .await?;
                tx.commit().await?;
                tracing::info!(order_id = order_id, "order completed");
            }
            PaymentStatus::Failed => {
                let reason = reason
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| {
                        CoreError::BadRequest("payment failure requires a reason".to_string())
                    })?;
                let refund = refund_points.unwrap_or(Decimal::ZERO);
                if refund < Decimal::ZERO {
                    return Err(CoreError::BadRequest(
                        "refund points must not be negative".to_string(),
                    ));
                }
                cancel_within_tx(&mut tx, order, refund).await?;
                tx.commit().await?;
                tracing::info!(order_id = order_id, reason = reason, "order canceled on payment failure");
            }
            PaymentStatus::Pending => {
                tx.rollback().await?;
            }
        }

        Ok(())
    }

    /// Apply a coupon discount to a PENDING order (CouponApplied consumer).
    pub async fn apply_coupon_discount(
        &self,
        order_id: i64,
        coupon_code: &str,
        discount_amount: Decimal,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut order = lock_order(&mut tx, order_id).await?;

        order.apply_discount(coupon_code, discount_amount)?;
        sqlx::query(
            r#"
            UPDATE orders
            SET total_amount = $2, discount_amount = $3, coupon_code = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.total_amount)
        .bind(order.discount_amount)
        .bind(&order.coupon_code)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(
            order_id = order_id,
            coupon = coupon_code,
            discount = %discount_amount,
            "coupon discount applied to order"
        );
        Ok(())
    }

    pub async fn get_order(&self, order_id: i64) -> CoreResult<OrderResponse> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, ref_user_id, status, total_amount, discount_amount,
                   coupon_code, created_at, updated_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::NotFound("order", order_id.to_string()))?;

        self.order_response(order).await
    }

    async fn order_response(&self, order: Order) -> CoreResult<OrderResponse> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT ref_product_id, product_name, price, quantity
            FROM order_items WHERE ref_order_id = $1 ORDER BY id
            "#,
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderResponse {
            order_id: order.id,
            status: order.status,
            total_amount: order.total_amount,
            discount_amount: order.discount_amount,
            items,
            created_at: order.created_at,
        })
    }
}

async fn lock_user(tx: &mut Transaction<'_, Postgres>, user_id: i64) -> CoreResult<User> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, user_id, email, birth_date, gender, point_balance, created_at, updated_at
        FROM users WHERE id = $1 FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| CoreError::NotFound("user", user_id.to_string()))
}

async fn lock_product(tx: &mut Transaction<'_, Postgres>, product_id: i64) -> CoreResult<Product> {
    sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, price, stock, ref_brand_id, like_count, created_at, updated_at
        FROM products WHERE id = $1 FOR UPDATE
        "#,
    )
    .bind(product_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| CoreError::NotFound("product", product_id.to_string()))
}

async fn lock_order(tx: &mut Transaction<'_, Postgres>, order_id: i64) -> CoreResult<Order> {
    sqlx::query_as::<_, Order>(
        r#"
        SELECT id, ref_user_id, status, total_amount, discount_amount,
               coupon_code, created_at, updated_at
        FROM orders WHERE id = $1 FOR UPDATE
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| CoreError::NotFound("order", order_id.to_string()))
}

/// Points the order reserved at creation, read back from the PaymentRequested
/// outbox intent written in the same transaction as the order.
async fn requested_point_amount(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i64,
) -> CoreResult<Decimal> {
    let payload: Option<(serde_json::Value,)> = sqlx::query_as(
        r#"
        SELECT payload FROM outbox_events
        WHERE aggregate_type = 'PAYMENT' AND aggregate_id = $1 AND event_type = 'PaymentRequested'
        ORDER BY version DESC LIMIT 1
        "#,
    )
    .bind(order_id.to_string())
    .fetch_optional(&mut **tx)
    .await?;

    match payload {
        Some((value,)) => {
            let payload: crate::events::PaymentRequestedPayload = serde_json::from_value(value)?;
            Ok(payload.used_point_amount)
        }
        None => Ok(Decimal::ZERO),
    }
}

/// Compensation: restore stock per item, refund points, flip the order to
/// CANCELED and append the OrderCanceled intent. Runs in the caller's
/// transaction; the caller commits.
async fn cancel_within_tx(
    tx: &mut Transaction<'_, Postgres>,
    mut order: Order,
    refund_points: Decimal,
) -> CoreResult<Order> {
    let mut items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT ref_product_id, product_name, price, quantity
        FROM order_items WHERE ref_order_id = $1
        "#,
    )
    .bind(order.id)
    .fetch_all(&mut **tx)
    .await?;
    items.sort_by_key(|item| item.ref_product_id);

    for item in &items {
        let mut product = lock_product(tx, item.ref_product_id).await?;
        product.increase_stock(item.quantity)?;
        sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(product.id)
            .bind(product.stock)
            .execute(&mut **tx)
            .await?;
    }

    let user = lock_user(tx, order.ref_user_id).await?;
    let refunded = user.point().add(refund_points)?;
    sqlx::query("UPDATE users SET point_balance = $2, updated_at = NOW() WHERE id = $1")
        .bind(user.id)
        .bind(refunded.balance())
        .execute(&mut **tx)
        .await?;

    order.cancel()?;
    sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(order.id)
        .bind(order.status)
        .execute(&mut **tx)
        .await?;

    OutboxStore::append(
        tx,
        &DomainEvent::OrderCanceled(OrderCanceledPayload {
            order_id: order.id,
            user_id: order.ref_user_id,
            refund_point_amount: refund_points,
        }),
    )
    .await?;

    Ok(order)
}
