//! User API Handlers

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{SignupRequest, UserResponse};
use crate::utils::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChargePointRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PointResponse {
    pub user_id: i64,
    pub balance: Decimal,
}

/// POST /users
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, CoreError> {
    let user = state.user_service.signup(request).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// POST /users/:user_id/points/charge
pub async fn charge_points(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(request): Json<ChargePointRequest>,
) -> Result<Json<ApiResponse<PointResponse>>, CoreError> {
    let balance = state
        .user_service
        .charge_point(user_id, request.amount)
        .await?;
    Ok(Json(ApiResponse::success(PointResponse { user_id, balance })))
}

/// GET /users/:user_id/points
pub async fn get_points(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<ApiResponse<PointResponse>>, CoreError> {
    let balance = state.user_service.get_points(user_id).await?;
    Ok(Json(ApiResponse::success(PointResponse { user_id, balance })))
}
