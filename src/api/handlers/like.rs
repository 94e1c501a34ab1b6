//! Like API Handlers
//!
//! The acting user rides in the X-USER-ID header (the same convention the
//! payment gateway contract uses).

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::LikeResponse;
use crate::utils::response::ApiResponse;
use crate::AppState;

fn user_id_from_headers(headers: &HeaderMap) -> Result<i64, CoreError> {
    headers
        .get("X-USER-ID")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| CoreError::BadRequest("missing or invalid X-USER-ID header".to_string()))
}

/// PUT /products/:product_id/likes
pub async fn add_like(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<LikeResponse>>, CoreError> {
    let user_id = user_id_from_headers(&headers)?;
    let like = state.like_service.add_like(user_id, product_id).await?;
    Ok(Json(ApiResponse::success(like)))
}

/// DELETE /products/:product_id/likes
pub async fn remove_like(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<LikeResponse>>, CoreError> {
    let user_id = user_id_from_headers(&headers)?;
    let like = state.like_service.remove_like(user_id, product_id).await?;
    Ok(Json(ApiResponse::success(like)))
}
