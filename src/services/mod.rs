pub mod batch_rank;
pub mod circuit_breaker;
pub mod coupon;
pub mod like;
pub mod metrics_consumer;
pub mod order;
pub mod payment;
pub mod pg_client;
pub mod product;
pub mod ranking_consumer;
pub mod user;
pub mod workflow;
