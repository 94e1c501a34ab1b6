//! Ranking consumer
//!
//! Feeds the daily Redis ZSET with weighted activity increments. The ZSET is
//! a pure accumulator; redelivery protection comes from the shared
//! idempotency protocol in the consumer loop.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::error::CoreResult;
use crate::events::consumer::{ConsumerRecord, EventHandler};
use crate::events::{event_types, LikePayload, OrderCreatedPayload, ProductViewedPayload};

pub struct RankingEventHandler {
    cache: Arc<CacheManager>,
}

impl RankingEventHandler {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventHandler for RankingEventHandler {
    fn name(&self) -> &'static str {
        "product-ranking"
    }

    async fn handle(&self, record: &ConsumerRecord) -> CoreResult<()> {
        let today = Utc::now().date_naive();
        let ranking = self.cache.ranking();

        match record.event_type.as_str() {
            event_types::LIKE_ADDED => {
                let payload: LikePayload = serde_json::from_value(record.payload.clone())?;
                ranking.record_like_added(today, payload.product_id).await?;
            }
            event_types::LIKE_REMOVED => {
                let payload: LikePayload = serde_json::from_value(record.payload.clone())?;
                ranking
                    .record_like_removed(today, payload.product_id)
                    .await?;
            }
            event_types::PRODUCT_VIEWED => {
                let payload: ProductViewedPayload =
                    serde_json::from_value(record.payload.clone())?;
                ranking.record_view(today, payload.product_id).await?;
            }
            event_types::ORDER_CREATED => {
                let payload: OrderCreatedPayload =
                    serde_json::from_value(record.payload.clone())?;
                let lines: Vec<(i64, i64)> = payload
                    .items
                    .iter()
                    .map(|item| (item.product_id, item.quantity))
                    .collect();
                ranking
                    .record_order(today, payload.subtotal, &lines)
                    .await?;
            }
            _ => {}
        }

        Ok(())
    }
}
