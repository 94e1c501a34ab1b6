//! Two-step batch ranker
//!
//! Step 1 pages through `product_metrics` rows touched inside the period and
//! accumulates them into `product_rank_scores`. Step 2 streams the scores
//! best-first, assigns contiguous ranks through a stateful counter, keeps the
//! top 100 and replaces the materialized `product_ranks` set in one
//! delete-then-insert, which makes a repeated run converge to the same state.

use chrono::NaiveDate;
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::error::CoreResult;
use crate::models::{rank_score, PeriodType, ProductRank, ProductRankScore};

pub const RANK_LIMIT: i32 = 100;

/// Explicit rank counter (no thread-locals): `assign` hands out 1, 2, 3, …
/// and stops past the limit.
pub struct RankAssigner {
    next_rank: i32,
    limit: i32,
}

impl RankAssigner {
    pub fn new(limit: i32) -> Self {
        Self {
            next_rank: 0,
            limit,
        }
    }

    pub fn assign(&mut self) -> Option<i32> {
        self.next_rank += 1;
        if self.next_rank > self.limit {
            None
        } else {
            Some(self.next_rank)
        }
    }
}

pub struct BatchRanker {
    pool: PgPool,
    chunk_size: i64,
}

impl BatchRanker {
    pub fn new(pool: PgPool, chunk_size: i64) -> Self {
        Self { pool, chunk_size }
    }

    /// Run both steps for the period containing `target_date`. Returns the
    /// number of materialized ranks.
    pub async fn run(&self, period_type: PeriodType, target_date: NaiveDate) -> CoreResult<usize> {
        let period_start = period_type.period_start(target_date);
        let period_end = period_type.period_end(target_date);

        tracing::info!(
            period = ?period_type,
            start = %period_start,
            end = %period_end,
            "batch ranking run starting"
        );

        // the score table is per-run scratch space
        sqlx::query("TRUNCATE product_rank_scores")
            .execute(&self.pool)
            .await?;

        let aggregated = self.aggregate_scores(period_start, period_end).await?;
        let ranked = self.select_ranks(period_type, period_start).await?;

        crate::metrics::record_rank_batch_run(match period_type {
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
        });

        tracing::info!(
            period = ?period_type,
            start = %period_start,
            scored = aggregated,
            ranked = ranked,
            "batch ranking run complete"
        );
        Ok(ranked)
    }

    /// Step 1: chunked read of the period's metrics, accumulated into the
    /// score table. Chunks aggregate on top of whatever previous chunks wrote,
    /// so one product spread over chunk boundaries sums correctly.
    async fn aggregate_scores(
        &self,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> CoreResult<usize> {
        let mut last_product_id = 0i64;
        let mut scored = 0usize;

        loop {
            let chunk: Vec<(i64, i64, i64, i64)> = sqlx::query_as(
                r#"
                SELECT product_id, like_count, sales_count, view_count
                FROM product_metrics
                WHERE updated_at >= $1 AND updated_at < $2 AND product_id > $3
                ORDER BY product_id ASC
                LIMIT $4
                "#,
            )
            .bind(period_start.and_hms_opt(0, 0, 0).unwrap().and_utc())
            .bind(period_end.and_hms_opt(0, 0, 0).unwrap().and_utc())
            .bind(last_product_id)
            .bind(self.chunk_size)
            .fetch_all(&self.pool)
            .await?;

            if chunk.is_empty() {
                break;
            }
            last_product_id = chunk.last().map(|row| row.0).unwrap_or(last_product_id);

            // group within the chunk
            let mut grouped: BTreeMap<i64, (i64, i64, i64)> = BTreeMap::new();
            for (product_id, likes, sales, views) in &chunk {
                let entry = grouped.entry(*product_id).or_insert((0, 0, 0));
                entry.0 += likes;
                entry.1 += sales;
                entry.2 += views;
            }

            let product_ids: Vec<i64> = grouped.keys().copied().collect();
            let existing: Vec<ProductRankScore> = sqlx::query_as(
                r#"
                SELECT product_id, like_count, sales_count, view_count, score
                FROM product_rank_scores WHERE product_id = ANY($1)
                "#,
            )
            .bind(&product_ids)
            .fetch_all(&self.pool)
            .await?;
            let existing: BTreeMap<i64, ProductRankScore> = existing
                .into_iter()
                .map(|row| (row.product_id, row))
                .collect();

            let mut tx = self.pool.begin().await?;
            for (product_id, (likes, sales, views)) in grouped {
                let (base_likes, base_sales, base_views) = existing
                    .get(&product_id)
                    .map(|row| (row.like_count, row.sales_count, row.view_count))
                    .unwrap_or((0, 0, 0));

                let like_count = base_likes + likes;
                let sales_count = base_sales + sales;
                let view_count = base_views + views;
                let score = rank_score(like_count, sales_count, view_count);

                sqlx::query(
                    r#"
                    INSERT INTO product_rank_scores
                        (product_id, like_count, sales_count, view_count, score)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (product_id) DO UPDATE
                    SET like_count = EXCLUDED.like_count,
                        sales_count = EXCLUDED.sales_count,
                        view_count = EXCLUDED.view_count,
                        score = EXCLUDED.score
                    "#,
                )
                .bind(product_id)
                .bind(like_count)
                .bind(sales_count)
                .bind(view_count)
                .bind(score)
                .execute(&mut *tx)
                .await?;
                scored += 1;
            }
            tx.commit().await?;
        }

        Ok(scored)
    }

    /// Step 2: stream scores best-first, keep the top 100, replace the
    /// materialized set once at step completion.
    async fn select_ranks(
        &self,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> CoreResult<usize> {
        let mut assigner = RankAssigner::new(RANK_LIMIT);
        let mut ranked: Vec<ProductRank> = Vec::with_capacity(RANK_LIMIT as usize);
        let mut cursor: Option<(f64, i64)> = None;

        'stream: loop {
            let chunk: Vec<ProductRankScore> = match cursor {
                None => {
                    sqlx::query_as(
                        r#"
                        SELECT product_id, like_count, sales_count, view_count, score
                        FROM product_rank_scores
                        ORDER BY score DESC, product_id ASC
                        LIMIT $1
                        "#,
                    )
                    .bind(self.chunk_size)
                    .fetch_all(&self.pool)
                    .await?
                }
                Some((last_score, last_id)) => {
                    sqlx::query_as(
                        r#"
                        SELECT product_id, like_count, sales_count, view_count, score
                        FROM product_rank_scores
                        WHERE score < $1 OR (score = $1 AND product_id > $2)
                        ORDER BY score DESC, product_id ASC
                        LIMIT $3
                        "#,
                    )
                    .bind(last_score)
                    .bind(last_id)
                    .bind(self.chunk_size)
                    .fetch_all(&self.pool)
                    .await?
                }
            };

            if chunk.is_empty() {
                break;
            }
            cursor = chunk.last().map(|row| (row.score, row.product_id));

            for row in chunk {
                match assigner.assign() {
                    Some(rank) => ranked.push(ProductRank {
                        period_type,
                        period_start_date: period_start,
                        product_id: row.product_id,
                        rank,
                        like_count: row.like_count,
                        sales_count: row.sales_count,
                        view_count: row.view_count,
                        score: row.score,
                    }),
                    None => break 'stream,
                }
            }
        }

        self.save_ranks(period_type, period_start, &ranked).await?;
        Ok(ranked.len())
    }

    /// Replace the (period_type, period_start) rank set atomically. Reruns
    /// converge because the delete wipes whatever a previous run left.
    async fn save_ranks(
        &self,
        period_type: PeriodType,
        period_start: NaiveDate,
        ranks: &[ProductRank],
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM product_ranks WHERE period_type = $1 AND period_start_date = $2")
            .bind(period_type)
            .bind(period_start)
            .execute(&mut *tx)
            .await?;

        for rank in ranks {
            sqlx::query(
                r#"
                INSERT INTO product_ranks
                    (period_type, period_start_date, product_id, rank,
                     like_count, sales_count, view_count, score)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(rank.period_type)
            .bind(rank.period_start_date)
            .bind(rank.product_id)
            .bind(rank.rank)
            .bind(rank.like_count)
            .bind(rank.sales_count)
            .bind(rank.view_count)
            .bind(rank.score)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Materialized leaderboard for a period, best first.
    pub async fn get_ranks(
        &self,
        period_type: PeriodType,
        target_date: NaiveDate,
    ) -> CoreResult<Vec<ProductRank>> {
        let period_start = period_type.period_start(target_date);
        let ranks = sqlx::query_as::<_, ProductRank>(
            r#"
            SELECT period_type, period_start_date, product_id, rank,
                   like_count, sales_count, view_count, score
            FROM product_ranks
            WHERE period_type = $1 AND period_start_date = $2
            ORDER BY rank ASC
            "#,
        )
        .bind(period_type)
        .bind(period_start)
        .fetch_all(&self.pool)
        .await?;
        Ok(ranks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigner_hands_out_contiguous_ranks() {
        let mut assigner = RankAssigner::new(3);
        assert_eq!(assigner.assign(), Some(1));
        assert_eq!(assigner.assign(), Some(2));
        assert_eq!(assigner.assign(), Some(3));
        assert_eq!(assigner.assign(), None);
        assert_eq!(assigner.assign(), None);
    }

    #[test]
    fn assigner_cuts_at_the_default_limit() {
        let mut assigner = RankAssigner::new(RANK_LIMIT);
        let assigned: Vec<i32> = std::iter::from_fn(|| assigner.assign()).collect();
        assert_eq!(assigned.len(), 100);
        assert_eq!(assigned.first(), Some(&1));
        assert_eq!(assigned.last(), Some(&100));
        // ranks form a contiguous 1..=100 permutation
        assert!(assigned.windows(2).all(|w| w[1] == w[0] + 1));
    }
}
