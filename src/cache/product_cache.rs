//! Product Read-Side Cache
//!
//! Read-through caching for product listings and details:
//! - only page 0 of list queries is cached (deep pagination is rare)
//! - entries are JSON strings with a 5 minute TTL
//! - invalidation deletes by pattern with a server-side SCAN/DEL Lua script

#![allow(dead_code)]
use std::sync::Arc;
use tracing::debug;

use super::keys::{ttl, CacheKey};
use super::redis_client::RedisHandle;
use super::CacheError;
use crate::models::{ProductDetail, ProductSort, ProductSummary};

/// SCAN with bounded COUNT, deleting matches cooperatively. KEYS would block
/// the server at large keyspaces.
const SCAN_DELETE_SCRIPT: &str = r#"
local cursor = '0'
local deleted = 0
repeat
    local result = redis.call('SCAN', cursor, 'MATCH', ARGV[1], 'COUNT', 100)
    cursor = result[1]
    for _, key in ipairs(result[2]) do
        redis.call('DEL', key)
        deleted = deleted + 1
    end
until cursor == '0'
return deleted
"#;

pub struct ProductCache {
    redis: Arc<RedisHandle>,
}

impl ProductCache {
    pub fn new(redis: Arc<RedisHandle>) -> Self {
        Self { redis }
    }

    // ==================== Listing Pages ====================

    pub async fn get_list_page(
        &self,
        brand_id: Option<i64>,
        sort: ProductSort,
        page: i64,
        size: i64,
    ) -> Result<Option<Vec<ProductSummary>>, CacheError> {
        if page != 0 {
            return Ok(None);
        }
        let key = CacheKey::product_list(brand_id, sort.as_str(), page, size);
        let data = self.redis.get_string(&key).await?;

        match data {
            Some(json) => {
                let items: Vec<ProductSummary> = serde_json::from_str(&json)?;
                debug!("cache hit for {key}");
                metrics::counter!(crate::metrics::names::CACHE_HITS_TOTAL, "cache" => "product_list")
                    .increment(1);
                Ok(Some(items))
            }
            None => {
                debug!("cache miss for {key}");
                metrics::counter!(crate::metrics::names::CACHE_MISSES_TOTAL, "cache" => "product_list")
                    .increment(1);
                Ok(None)
            }
        }
    }

    pub async fn set_list_page(
        &self,
        brand_id: Option<i64>,
        sort: ProductSort,
        page: i64,
        size: i64,
        items: &[ProductSummary],
    ) -> Result<(), CacheError> {
        if page != 0 {
            return Ok(());
        }
        let key = CacheKey::product_list(brand_id, sort.as_str(), page, size);
        let json = serde_json::to_string(items)?;
        self.redis.put_string(&key, &json, ttl::PRODUCT).await?;
        Ok(())
    }

    // ==================== Details ====================

    pub async fn get_detail(&self, product_id: i64) -> Result<Option<ProductDetail>, CacheError> {
        let key = CacheKey::product_detail(product_id);
        let data = self.redis.get_string(&key).await?;

        match data {
            Some(json) => {
                let detail: ProductDetail = serde_json::from_str(&json)?;
                debug!("cache hit for product detail {product_id}");
                metrics::counter!(crate::metrics::names::CACHE_HITS_TOTAL, "cache" => "product_detail")
                    .increment(1);
                Ok(Some(detail))
            }
            None => {
                metrics::counter!(crate::metrics::names::CACHE_MISSES_TOTAL, "cache" => "product_detail")
                    .increment(1);
                Ok(None)
            }
        }
    }

    pub async fn set_detail(&self, detail: &ProductDetail) -> Result<(), CacheError> {
        let key = CacheKey::product_detail(detail.id);
        let json = serde_json::to_string(detail)?;
        self.redis.put_string(&key, &json, ttl::PRODUCT).await?;
        Ok(())
    }

    // ==================== Invalidation ====================

    /// On product mutation: drop the detail entry and every listing page.
    pub async fn invalidate_product(&self, product_id: i64) -> Result<(), CacheError> {
        self.redis.delete(&CacheKey::product_detail(product_id)).await?;
        let deleted = self
            .redis
            .eval_count(SCAN_DELETE_SCRIPT, &CacheKey::product_list_pattern_all())
            .await?;
        debug!("evicted {deleted} listing pages after product {product_id} mutation");
        Ok(())
    }

    /// On stock movement: only the detail entry is stale (listings do not
    /// show stock).
    pub async fn invalidate_detail(&self, product_id: i64) -> Result<(), CacheError> {
        self.redis.delete(&CacheKey::product_detail(product_id)).await?;
        Ok(())
    }

    /// On brand-scoped mutation: drop that brand's listing pages.
    pub async fn invalidate_brand(&self, brand_id: i64) -> Result<(), CacheError> {
        let deleted = self
            .redis
            .eval_count(SCAN_DELETE_SCRIPT, &CacheKey::product_list_pattern_brand(brand_id))
            .await?;
        debug!("evicted {deleted} listing pages for brand {brand_id}");
        Ok(())
    }
}
