//! Cache key construction
//!
//! All Redis keys used by the read side live here so the invalidation
//! patterns and the writers can never drift apart.

use chrono::NaiveDate;

/// TTLs in seconds
pub mod ttl {
    /// Product list/detail entries
    pub const PRODUCT: u64 = 300;
    /// Daily ranking ZSET, measured from first write
    pub const RANKING_SECS: i64 = 2 * 86400;
}

pub struct CacheKey;

impl CacheKey {
    /// `product:list:brand:{B|all}:sort:{sort}:page:{P}:size:{S}`
    pub fn product_list(brand_id: Option<i64>, sort: &str, page: i64, size: i64) -> String {
        let brand = match brand_id {
            Some(id) => id.to_string(),
            None => "all".to_string(),
        };
        format!("product:list:brand:{brand}:sort:{sort}:page:{page}:size:{size}")
    }

    /// `product:detail:{productId}`
    pub fn product_detail(product_id: i64) -> String {
        format!("product:detail:{product_id}")
    }

    /// Pattern matching every cached listing page.
    pub fn product_list_pattern_all() -> String {
        "product:list:*".to_string()
    }

    /// Pattern matching the cached listing pages of one brand.
    pub fn product_list_pattern_brand(brand_id: i64) -> String {
        format!("product:list:brand:{brand_id}:*")
    }

    /// `ranking:all:YYYYMMDD`
    pub fn ranking_daily(date: NaiveDate) -> String {
        format!("ranking:all:{}", date.format("%Y%m%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_list_key_shape() {
        assert_eq!(
            CacheKey::product_list(Some(3), "price_asc", 0, 20),
            "product:list:brand:3:sort:price_asc:page:0:size:20"
        );
        assert_eq!(
            CacheKey::product_list(None, "latest", 0, 20),
            "product:list:brand:all:sort:latest:page:0:size:20"
        );
    }

    #[test]
    fn ranking_key_uses_compact_date() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 13).unwrap();
        assert_eq!(CacheKey::ranking_daily(date), "ranking:all:20240613");
    }

    #[test]
    fn brand_pattern_covers_brand_keys_only() {
        let key = CacheKey::product_list(Some(3), "latest", 0, 20);
        let pattern = CacheKey::product_list_pattern_brand(3);
        // prefix match sanity: the brand pattern is a prefix of its keys
        assert!(key.starts_with(pattern.trim_end_matches('*')));
        let other = CacheKey::product_list(Some(4), "latest", 0, 20);
        assert!(!other.starts_with(pattern.trim_end_matches('*')));
    }
}
