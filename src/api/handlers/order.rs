//! Order API Handlers

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{CreateOrderRequest, OrderResponse};
use crate::utils::response::ApiResponse;
use crate::AppState;

/// POST /orders
///
/// Creation returns PENDING; payment resolution arrives through the event
/// flow. A requested coupon is applied after the order transaction commits
/// and reaches the order via CouponApplied.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, CoreError> {
    let coupon_code = request.coupon_code.clone();
    let order = state.order_service.create_order(request).await?;

    if let Some(code) = coupon_code {
        if let Err(e) = state
            .coupon_service
            .apply_coupon(order.order_id, &code)
            .await
        {
            // the order stands; the coupon just did not attach
            tracing::warn!(order_id = order.order_id, coupon = %code, "coupon apply failed: {e}");
        }
    }

    evict_stale_details(&state, &order).await;
    Ok(Json(ApiResponse::success(order)))
}

/// Stock moved for every ordered product; their cached details are stale.
async fn evict_stale_details(state: &Arc<AppState>, order: &OrderResponse) {
    for item in &order.items {
        if let Err(e) = state
            .cache
            .product()
            .invalidate_detail(item.ref_product_id)
            .await
        {
            tracing::warn!(product_id = item.ref_product_id, "detail eviction failed: {e}");
        }
    }
}

/// GET /orders/:order_id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<OrderResponse>>, CoreError> {
    let order = state.order_service.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /orders/:order_id/cancel
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<OrderResponse>>, CoreError> {
    let order = state.order_service.cancel_order(order_id).await?;
    evict_stale_details(&state, &order).await;
    Ok(Json(ApiResponse::success(order)))
}
