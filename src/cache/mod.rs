//! Redis-backed read-side caches
//!
//! The cache layer degrades gracefully: when Redis is down the read side goes
//! straight to the database and writes skip invalidation with a warning.

pub mod keys;
pub mod product_cache;
pub mod ranking_cache;
pub mod redis_client;

use std::sync::Arc;

pub use product_cache::ProductCache;
pub use ranking_cache::RankingCache;
pub use redis_client::RedisHandle;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CacheError> for crate::error::CoreError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Redis(e) => crate::error::CoreError::Redis(e),
            CacheError::Serialization(e) => crate::error::CoreError::Serialization(e),
        }
    }
}

pub struct CacheManager {
    product: ProductCache,
    ranking: RankingCache,
    available: bool,
}

impl CacheManager {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let redis = Arc::new(RedisHandle::connect(url).await?);
        let available = redis.is_available().await;
        Ok(Self {
            product: ProductCache::new(redis.clone()),
            ranking: RankingCache::new(redis),
            available,
        })
    }

    pub fn product(&self) -> &ProductCache {
        &self.product
    }

    pub fn ranking(&self) -> &RankingCache {
        &self.ranking
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}
