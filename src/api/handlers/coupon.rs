//! Coupon API Handlers

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{Coupon, CouponType};
use crate::utils::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct IssueCouponRequest {
    pub user_id: i64,
    pub coupon_type: CouponType,
    pub discount_value: Decimal,
}

/// POST /coupons
pub async fn issue_coupon(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IssueCouponRequest>,
) -> Result<Json<ApiResponse<Coupon>>, CoreError> {
    let coupon = state
        .coupon_service
        .issue_coupon(request.user_id, request.coupon_type, request.discount_value)
        .await?;
    Ok(Json(ApiResponse::success(coupon)))
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub order_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ApplyCouponResponse {
    pub order_id: i64,
    pub discount_amount: Decimal,
}

/// POST /coupons/:code/apply
pub async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<ApiResponse<ApplyCouponResponse>>, CoreError> {
    let discount_amount = state
        .coupon_service
        .apply_coupon(request.order_id, &code)
        .await?;
    Ok(Json(ApiResponse::success(ApplyCouponResponse {
        order_id: request.order_id,
        discount_amount,
    })))
}
