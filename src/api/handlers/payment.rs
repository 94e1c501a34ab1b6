//! Payment API Handlers

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::Payment;
use crate::services::payment::PgCallbackRequest;
use crate::utils::response::ApiResponse;
use crate::AppState;

/// POST /payments/callback: asynchronous result pushed by the gateway.
pub async fn pg_callback(
    State(state): State<Arc<AppState>>,
    Json(callback): Json<PgCallbackRequest>,
) -> Result<Json<ApiResponse<()>>, CoreError> {
    state.payment_service.handle_pg_callback(callback).await?;
    Ok(Json(ApiResponse::success(())))
}

/// GET /orders/:order_id/payment
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<Payment>>, CoreError> {
    let payment = state.payment_service.get_payment(order_id).await?;
    Ok(Json(ApiResponse::success(payment)))
}
