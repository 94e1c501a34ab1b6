//! Ranking API Handlers

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{PeriodType, ProductRank};
use crate::utils::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TodayRankingQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RankedProduct {
    pub rank: usize,
    pub product_id: i64,
    pub score: f64,
}

/// GET /rankings/today: live leaderboard straight from the daily ZSET.
pub async fn today_ranking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TodayRankingQuery>,
) -> Result<Json<ApiResponse<Vec<RankedProduct>>>, CoreError> {
    let limit = query.limit.unwrap_or(10).min(100);
    let today = Utc::now().date_naive();
    let entries = state.cache.ranking().top_n(today, limit).await?;

    let ranked = entries
        .into_iter()
        .enumerate()
        .map(|(index, (product_id, score))| RankedProduct {
            rank: index + 1,
            product_id,
            score,
        })
        .collect();
    Ok(Json(ApiResponse::success(ranked)))
}

#[derive(Debug, Deserialize)]
pub struct PeriodRankingQuery {
    pub period_type: String,
    pub date: Option<NaiveDate>,
}

/// GET /rankings: materialized weekly/monthly leaderboard.
pub async fn period_ranking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeriodRankingQuery>,
) -> Result<Json<ApiResponse<Vec<ProductRank>>>, CoreError> {
    let period_type: PeriodType = query.period_type.parse()?;
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let ranks = state.batch_ranker.get_ranks(period_type, date).await?;
    Ok(Json(ApiResponse::success(ranks)))
}

#[derive(Debug, Deserialize)]
pub struct RunRankingRequest {
    pub period_type: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct RunRankingResponse {
    pub ranked: usize,
}

/// POST /internal/rankings/run: operational trigger for a batch run.
pub async fn run_ranking(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRankingRequest>,
) -> Result<Json<ApiResponse<RunRankingResponse>>, CoreError> {
    let period_type: PeriodType = request.period_type.parse()?;
    let date = request.date.unwrap_or_else(|| Utc::now().date_naive());
    let ranked = state.batch_ranker.run(period_type, date).await?;
    Ok(Json(ApiResponse::success(RunRankingResponse { ranked })))
}
