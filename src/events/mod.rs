//! Domain events
//!
//! Every external event is appended to the outbox in the same transaction as
//! the business mutation, then relayed to Kafka. Payloads are JSON; the
//! `eventId`, `eventType` and `version` ride in message headers.

pub mod consumer;
pub mod producer;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod topics {
    pub const ORDER_EVENTS: &str = "order-events";
    pub const LIKE_EVENTS: &str = "like-events";
    pub const PRODUCT_EVENTS: &str = "product-events";
    pub const PAYMENT_EVENTS: &str = "payment-events";
    pub const COUPON_EVENTS: &str = "coupon-events";
    pub const USER_EVENTS: &str = "user-events";
}

pub mod headers {
    pub const EVENT_ID: &str = "eventId";
    pub const EVENT_TYPE: &str = "eventType";
    pub const VERSION: &str = "version";
}

pub mod aggregate_types {
    pub const ORDER: &str = "ORDER";
    pub const PRODUCT: &str = "PRODUCT";
    pub const PAYMENT: &str = "PAYMENT";
    pub const USER: &str = "USER";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemPayload {
    pub product_id: i64,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedPayload {
    pub order_id: i64,
    pub user_id: i64,
    pub subtotal: Decimal,
    pub used_point_amount: Decimal,
    pub items: Vec<OrderItemPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCompletedPayload {
    pub order_id: i64,
    pub user_id: i64,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCanceledPayload {
    pub order_id: i64,
    pub user_id: i64,
    pub refund_point_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequestedPayload {
    pub order_id: i64,
    pub user_id: i64,
    pub total_amount: Decimal,
    pub used_point_amount: Decimal,
    pub card_type: Option<String>,
    pub card_no: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedPayload {
    pub order_id: i64,
    pub payment_id: i64,
    pub transaction_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedPayload {
    pub order_id: i64,
    pub payment_id: i64,
    pub reason: String,
    pub refund_point_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponAppliedPayload {
    pub order_id: i64,
    pub coupon_code: String,
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikePayload {
    pub user_id: i64,
    pub product_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductViewedPayload {
    pub product_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegisteredPayload {
    pub user_id: i64,
    pub login_id: String,
}

/// All events the core emits, with their routing policy.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    OrderCreated(OrderCreatedPayload),
    OrderCompleted(OrderCompletedPayload),
    OrderCanceled(OrderCanceledPayload),
    PaymentRequested(PaymentRequestedPayload),
    PaymentCompleted(PaymentCompletedPayload),
    PaymentFailed(PaymentFailedPayload),
    CouponApplied(CouponAppliedPayload),
    LikeAdded(LikePayload),
    LikeRemoved(LikePayload),
    ProductViewed(ProductViewedPayload),
    UserRegistered(UserRegisteredPayload),
}

pub mod event_types {
    pub const ORDER_CREATED: &str = "OrderCreated";
    pub const ORDER_COMPLETED: &str = "OrderCompleted";
    pub const ORDER_CANCELED: &str = "OrderCanceled";
    pub const PAYMENT_REQUESTED: &str = "PaymentRequested";
    pub const PAYMENT_COMPLETED: &str = "PaymentCompleted";
    pub const PAYMENT_FAILED: &str = "PaymentFailed";
    pub const COUPON_APPLIED: &str = "CouponApplied";
    pub const LIKE_ADDED: &str = "LikeAdded";
    pub const LIKE_REMOVED: &str = "LikeRemoved";
    pub const PRODUCT_VIEWED: &str = "ProductViewed";
    pub const USER_REGISTERED: &str = "UserRegistered";
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_) => event_types::ORDER_CREATED,
            DomainEvent::OrderCompleted(_) => event_types::ORDER_COMPLETED,
            DomainEvent::OrderCanceled(_) => event_types::ORDER_CANCELED,
            DomainEvent::PaymentRequested(_) => event_types::PAYMENT_REQUESTED,
            DomainEvent::PaymentCompleted(_) => event_types::PAYMENT_COMPLETED,
            DomainEvent::PaymentFailed(_) => event_types::PAYMENT_FAILED,
            DomainEvent::CouponApplied(_) => event_types::COUPON_APPLIED,
            DomainEvent::LikeAdded(_) => event_types::LIKE_ADDED,
            DomainEvent::LikeRemoved(_) => event_types::LIKE_REMOVED,
            DomainEvent::ProductViewed(_) => event_types::PRODUCT_VIEWED,
            DomainEvent::UserRegistered(_) => event_types::USER_REGISTERED,
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_)
            | DomainEvent::OrderCompleted(_)
            | DomainEvent::OrderCanceled(_) => topics::ORDER_EVENTS,
            DomainEvent::PaymentRequested(_)
            | DomainEvent::PaymentCompleted(_)
            | DomainEvent::PaymentFailed(_) => topics::PAYMENT_EVENTS,
            DomainEvent::CouponApplied(_) => topics::COUPON_EVENTS,
            DomainEvent::LikeAdded(_) | DomainEvent::LikeRemoved(_) => topics::LIKE_EVENTS,
            DomainEvent::ProductViewed(_) => topics::PRODUCT_EVENTS,
            DomainEvent::UserRegistered(_) => topics::USER_EVENTS,
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_)
            | DomainEvent::OrderCompleted(_)
            | DomainEvent::OrderCanceled(_)
            | DomainEvent::CouponApplied(_) => aggregate_types::ORDER,
            DomainEvent::PaymentRequested(_)
            | DomainEvent::PaymentCompleted(_)
            | DomainEvent::PaymentFailed(_) => aggregate_types::PAYMENT,
            DomainEvent::LikeAdded(_)
            | DomainEvent::LikeRemoved(_)
            | DomainEvent::ProductViewed(_) => aggregate_types::PRODUCT,
            DomainEvent::UserRegistered(_) => aggregate_types::USER,
        }
    }

    /// Aggregate identity for outbox version sequencing.
    pub fn aggregate_id(&self) -> String {
        match self {
            DomainEvent::OrderCreated(p) => p.order_id.to_string(),
            DomainEvent::OrderCompleted(p) => p.order_id.to_string(),
            DomainEvent::OrderCanceled(p) => p.order_id.to_string(),
            DomainEvent::CouponApplied(p) => p.order_id.to_string(),
            DomainEvent::PaymentRequested(p) => p.order_id.to_string(),
            DomainEvent::PaymentCompleted(p) => p.order_id.to_string(),
            DomainEvent::PaymentFailed(p) => p.order_id.to_string(),
            DomainEvent::LikeAdded(p) | DomainEvent::LikeRemoved(p) => p.product_id.to_string(),
            DomainEvent::ProductViewed(p) => p.product_id.to_string(),
            DomainEvent::UserRegistered(p) => p.user_id.to_string(),
        }
    }

    /// Partition key policy: order/payment/coupon events key on the order id,
    /// like/product events on the product id, user events on the user id.
    pub fn partition_key(&self) -> String {
        self.aggregate_id()
    }

    pub fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            DomainEvent::OrderCreated(p) => serde_json::to_value(p),
            DomainEvent::OrderCompleted(p) => serde_json::to_value(p),
            DomainEvent::OrderCanceled(p) => serde_json::to_value(p),
            DomainEvent::PaymentRequested(p) => serde_json::to_value(p),
            DomainEvent::PaymentCompleted(p) => serde_json::to_value(p),
            DomainEvent::PaymentFailed(p) => serde_json::to_value(p),
            DomainEvent::CouponApplied(p) => serde_json::to_value(p),
            DomainEvent::LikeAdded(p) | DomainEvent::LikeRemoved(p) => serde_json::to_value(p),
            DomainEvent::ProductViewed(p) => serde_json::to_value(p),
            DomainEvent::UserRegistered(p) => serde_json::to_value(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_events_partition_on_order_id() {
        let event = DomainEvent::OrderCreated(OrderCreatedPayload {
            order_id: 42,
            user_id: 7,
            subtotal: dec!(20000),
            used_point_amount: dec!(5000),
            items: vec![],
        });
        assert_eq!(event.topic(), topics::ORDER_EVENTS);
        assert_eq!(event.partition_key(), "42");
        assert_eq!(event.aggregate_type(), aggregate_types::ORDER);
    }

    #[test]
    fn like_events_partition_on_product_id() {
        let event = DomainEvent::LikeAdded(LikePayload {
            user_id: 7,
            product_id: 42,
        });
        assert_eq!(event.topic(), topics::LIKE_EVENTS);
        assert_eq!(event.partition_key(), "42");
        assert_eq!(event.event_type(), "LikeAdded");
    }

    #[test]
    fn payment_events_partition_on_order_id() {
        let event = DomainEvent::PaymentCompleted(PaymentCompletedPayload {
            order_id: 9,
            payment_id: 3,
            transaction_key: Some("tx".to_string()),
        });
        assert_eq!(event.topic(), topics::PAYMENT_EVENTS);
        assert_eq!(event.partition_key(), "9");
    }

    #[test]
    fn payloads_serialize_to_json_objects() {
        let event = DomainEvent::ProductViewed(ProductViewedPayload { product_id: 5 });
        let value = event.payload_json().unwrap();
        assert_eq!(value["product_id"], 5);
    }
}
