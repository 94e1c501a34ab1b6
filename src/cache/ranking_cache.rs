//! Daily Ranking Index
//!
//! One Redis ZSET per day (`ranking:all:YYYYMMDD`), member = product id,
//! score = accumulated weighted activity. Keys expire two days after their
//! first write; `carry_over` seeds the next day with a decayed copy.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

use super::keys::{ttl, CacheKey};
use super::redis_client::RedisHandle;
use super::CacheError;

pub const LIKE_WEIGHT: f64 = 0.2;
pub const VIEW_WEIGHT: f64 = 0.1;
pub const ORDER_WEIGHT: f64 = 0.6;
pub const CARRY_OVER_WEIGHT: f64 = 0.1;

/// Score contribution of one ordered line. The amount is log-damped so a
/// single huge order cannot pin the leaderboard for days.
pub fn order_increment(average_unit_price: f64, quantity: i64) -> f64 {
    let amount = average_unit_price * quantity as f64;
    amount.max(0.0).ln_1p() * ORDER_WEIGHT
}

/// Per-product increments for an order: `averageUnitPrice = subtotal / Σqty`,
/// each line contributing `log1p(averageUnitPrice · qty) · ORDER_WEIGHT`.
pub fn order_increments(subtotal: Decimal, lines: &[(i64, i64)]) -> Vec<(i64, f64)> {
    let total_quantity: i64 = lines.iter().map(|(_, qty)| qty).sum();
    if total_quantity <= 0 {
        return Vec::new();
    }
    let average_unit_price = subtotal.to_f64().unwrap_or(0.0) / total_quantity as f64;
    lines
        .iter()
        .map(|&(product_id, qty)| (product_id, order_increment(average_unit_price, qty)))
        .collect()
}

pub struct RankingCache {
    redis: Arc<RedisHandle>,
}

impl RankingCache {
    pub fn new(redis: Arc<RedisHandle>) -> Self {
        Self { redis }
    }

    /// ZINCRBY followed by EXPIRE when the key has no TTL yet.
    async fn increment(
        &self,
        date: NaiveDate,
        product_id: i64,
        delta: f64,
    ) -> Result<f64, CacheError> {
        let key = CacheKey::ranking_daily(date);
        let score = self.redis.zincr(&key, &product_id.to_string(), delta).await?;
        if self.redis.ttl(&key).await? < 0 {
            self.redis.expire(&key, ttl::RANKING_SECS).await?;
        }
        Ok(score)
    }

    pub async fn record_like_added(
        &self,
        date: NaiveDate,
        product_id: i64,
    ) -> Result<f64, CacheError> {
        self.increment(date, product_id, LIKE_WEIGHT).await
    }

    pub async fn record_like_removed(
        &self,
        date: NaiveDate,
        product_id: i64,
    ) -> Result<f64, CacheError> {
        self.increment(date, product_id, -LIKE_WEIGHT).await
    }

    pub async fn record_view(&self, date: NaiveDate, product_id: i64) -> Result<f64, CacheError> {
        self.increment(date, product_id, VIEW_WEIGHT).await
    }

    pub async fn record_order(
        &self,
        date: NaiveDate,
        subtotal: Decimal,
        lines: &[(i64, i64)],
    ) -> Result<(), CacheError> {
        for (product_id, delta) in order_increments(subtotal, lines) {
            self.increment(date, product_id, delta).await?;
        }
        Ok(())
    }

    /// Seed `tomorrow` with today's scores decayed by `weight`
    /// (ZUNIONSTORE tomorrow 1 today WEIGHTS w).
    pub async fn carry_over(
        &self,
        today: NaiveDate,
        tomorrow: NaiveDate,
        weight: f64,
    ) -> Result<i64, CacheError> {
        let today_key = CacheKey::ranking_daily(today);
        let tomorrow_key = CacheKey::ranking_daily(tomorrow);
        let carried = self
            .redis
            .zunionstore_weighted(&tomorrow_key, &today_key, weight)
            .await?;
        if self.redis.ttl(&tomorrow_key).await? < 0 {
            self.redis.expire(&tomorrow_key, ttl::RANKING_SECS).await?;
        }
        tracing::info!(
            from = %today_key,
            to = %tomorrow_key,
            weight = weight,
            members = carried,
            "ranking carry-over complete"
        );
        Ok(carried)
    }

    /// Top-N of a day's leaderboard, best first.
    pub async fn top_n(
        &self,
        date: NaiveDate,
        limit: usize,
    ) -> Result<Vec<(i64, f64)>, CacheError> {
        let key = CacheKey::ranking_daily(date);
        let raw = self
            .redis
            .zrevrange_withscores(&key, 0, limit as isize - 1)
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|(member, score)| member.parse::<i64>().ok().map(|id| (id, score)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_increment_is_monotonic_in_amount() {
        let small = order_increment(1_000.0, 1);
        let large = order_increment(100_000.0, 1);
        assert!(large > small);
        assert!(order_increment(0.0, 0) == 0.0);
    }

    #[test]
    fn bigger_order_outranks_modest_activity() {
        // product A: 10 views, 2 likes and a 1_000 order
        let a = 10.0 * VIEW_WEIGHT
            + 2.0 * LIKE_WEIGHT
            + order_increments(dec!(1000), &[(1, 1)])[0].1;
        // product B: a single 100_000 order
        let b = order_increments(dec!(100000), &[(2, 1)])[0].1;
        assert!(b > a, "expected {b} > {a}");
    }

    #[test]
    fn order_increments_split_by_average_unit_price() {
        // subtotal 30_000 over 3 units -> average 10_000
        let increments = order_increments(dec!(30000), &[(1, 2), (2, 1)]);
        assert_eq!(increments.len(), 2);
        let (first, second) = (increments[0].1, increments[1].1);
        // two units weigh more than one, but sublinearly (log damping)
        assert!(first > second);
        assert!(first < 2.0 * second);
        let expected_second = (10_000.0f64).ln_1p() * ORDER_WEIGHT;
        assert!((second - expected_second).abs() < 1e-9);
    }

    #[test]
    fn empty_or_zero_quantity_orders_score_nothing() {
        assert!(order_increments(dec!(1000), &[]).is_empty());
        assert!(order_increments(dec!(1000), &[(1, 0)]).is_empty());
    }
}
