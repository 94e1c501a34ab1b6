#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's like on a product. The (user, product) pair is unique; addition is
/// idempotent and removal of an absent like is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Like {
    pub id: i64,
    pub ref_user_id: i64,
    pub ref_product_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub product_id: i64,
    pub liked: bool,
    pub like_count: i64,
}
