//! Read-model rows fed by the event consumers and the batch ranker.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Denormalized per-product counters, version-gated against stale events.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductMetrics {
    pub id: i64,
    pub product_id: i64,
    pub like_count: i64,
    pub sales_count: i64,
    pub view_count: i64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Per-run aggregation row, recomputed by Step 1 of the batch ranker.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductRankScore {
    pub product_id: i64,
    pub like_count: i64,
    pub sales_count: i64,
    pub view_count: i64,
    pub score: f64,
}

/// Materialized leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductRank {
    pub period_type: PeriodType,
    pub period_start_date: NaiveDate,
    pub product_id: i64,
    pub rank: i32,
    pub like_count: i64,
    pub sales_count: i64,
    pub view_count: i64,
    pub score: f64,
}

const LIKE_SCORE_WEIGHT: f64 = 0.3;
const SALES_SCORE_WEIGHT: f64 = 0.5;
const VIEW_SCORE_WEIGHT: f64 = 0.2;

/// Weighted batch score over the aggregated counters.
pub fn rank_score(like_count: i64, sales_count: i64, view_count: i64) -> f64 {
    LIKE_SCORE_WEIGHT * like_count as f64
        + SALES_SCORE_WEIGHT * sales_count as f64
        + VIEW_SCORE_WEIGHT * view_count as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "period_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodType {
    Weekly,
    Monthly,
}

impl PeriodType {
    /// Start of the period containing `target`: Monday of the week, or the
    /// first of the month.
    pub fn period_start(&self, target: NaiveDate) -> NaiveDate {
        match self {
            PeriodType::Weekly => {
                let days_from_monday = target.weekday().num_days_from_monday() as i64;
                target - chrono::Duration::days(days_from_monday)
            }
            PeriodType::Monthly => target.with_day(1).expect("day 1 always valid"),
        }
    }

    /// Exclusive end of the period containing `target`.
    pub fn period_end(&self, target: NaiveDate) -> NaiveDate {
        let start = self.period_start(target);
        match self {
            PeriodType::Weekly => start + chrono::Duration::weeks(1),
            PeriodType::Monthly => start + Months::new(1),
        }
    }
}

impl std::str::FromStr for PeriodType {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WEEKLY" => Ok(PeriodType::Weekly),
            "MONTHLY" => Ok(PeriodType::Monthly),
            other => Err(crate::error::CoreError::BadRequest(format!(
                "unsupported period type: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekly_period_starts_on_monday() {
        // 2024-06-13 is a Thursday
        assert_eq!(PeriodType::Weekly.period_start(d(2024, 6, 13)), d(2024, 6, 10));
        // a Monday maps to itself
        assert_eq!(PeriodType::Weekly.period_start(d(2024, 6, 10)), d(2024, 6, 10));
        // a Sunday belongs to the preceding Monday
        assert_eq!(PeriodType::Weekly.period_start(d(2024, 6, 16)), d(2024, 6, 10));
        assert_eq!(PeriodType::Weekly.period_end(d(2024, 6, 13)), d(2024, 6, 17));
    }

    #[test]
    fn monthly_period_covers_the_calendar_month() {
        assert_eq!(PeriodType::Monthly.period_start(d(2024, 2, 29)), d(2024, 2, 1));
        assert_eq!(PeriodType::Monthly.period_end(d(2024, 2, 29)), d(2024, 3, 1));
        assert_eq!(PeriodType::Monthly.period_end(d(2024, 12, 5)), d(2025, 1, 1));
    }

    #[test]
    fn rank_score_weights() {
        assert_eq!(rank_score(0, 0, 0), 0.0);
        // 0.3*10 + 0.5*4 + 0.2*5 = 6.0
        assert!((rank_score(10, 4, 5) - 6.0).abs() < 1e-9);
        // sales dominate likes and views at equal counts
        assert!(rank_score(0, 10, 0) > rank_score(10, 0, 0));
        assert!(rank_score(10, 0, 0) > rank_score(0, 0, 10));
    }
}
