//! Product API Handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{ProductDetail, ProductSort, ProductSummary};
use crate::utils::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub brand_id: Option<i64>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// GET /products
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ApiResponse<Vec<ProductSummary>>>, CoreError> {
    let sort = match query.sort.as_deref() {
        Some(sort) => sort.parse()?,
        None => ProductSort::Latest,
    };
    let products = state
        .product_service
        .list_products(
            query.brand_id,
            sort,
            query.page.unwrap_or(0),
            query.size.unwrap_or(20),
        )
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

/// GET /products/:product_id
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
) -> Result<Json<ApiResponse<ProductDetail>>, CoreError> {
    let product = state.product_service.get_product(product_id).await?;
    Ok(Json(ApiResponse::success(product)))
}
