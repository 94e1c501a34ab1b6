//! Product read side
//!
//! Read-through cached listings and details. Listings batch-load the brands
//! of a page in one query instead of joining per row. Reading a detail
//! appends a ProductViewed intent so the metrics and ranking consumers see
//! views.

use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::error::{CoreError, CoreResult};
use crate::events::{DomainEvent, ProductViewedPayload};
use crate::models::{Brand, Product, ProductDetail, ProductSort, ProductSummary};
use crate::outbox::OutboxStore;

const MAX_PAGE_SIZE: i64 = 100;

pub struct ProductService {
    pool: PgPool,
    cache: Arc<CacheManager>,
}

impl ProductService {
    pub fn new(pool: PgPool, cache: Arc<CacheManager>) -> Self {
        Self { pool, cache }
    }

    pub async fn list_products(
        &self,
        brand_id: Option<i64>,
        sort: ProductSort,
        page: i64,
        size: i64,
    ) -> CoreResult<Vec<ProductSummary>> {
        if page < 0 || size <= 0 || size > MAX_PAGE_SIZE {
            return Err(CoreError::BadRequest(format!(
                "page must be >= 0 and size in 1..={MAX_PAGE_SIZE}"
            )));
        }

        if let Ok(Some(cached)) = self
            .cache
            .product()
            .get_list_page(brand_id, sort, page, size)
            .await
        {
            return Ok(cached);
        }

        let order_clause = match sort {
            ProductSort::Latest => "created_at DESC, id DESC",
            ProductSort::PriceAsc => "price ASC, id ASC",
            ProductSort::LikesDesc => "like_count DESC, id ASC",
        };

        let sql = match brand_id {
            Some(_) => format!(
                "SELECT id, name, price, stock, ref_brand_id, like_count, created_at, updated_at \
                 FROM products WHERE ref_brand_id = $1 ORDER BY {order_clause} LIMIT $2 OFFSET $3"
            ),
            None => format!(
                "SELECT id, name, price, stock, ref_brand_id, like_count, created_at, updated_at \
                 FROM products ORDER BY {order_clause} LIMIT $1 OFFSET $2"
            ),
        };

        let products: Vec<Product> = match brand_id {
            Some(brand) => {
                sqlx::query_as(&sql)
                    .bind(brand)
                    .bind(size)
                    .bind(page * size)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as(&sql)
                    .bind(size)
                    .bind(page * size)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let brands = self.load_brands(&products).await?;
        let summaries: Vec<ProductSummary> = products
            .into_iter()
            .map(|product| {
                let brand_name = brands
                    .get(&product.ref_brand_id)
                    .map(|brand| brand.name.clone())
                    .unwrap_or_default();
                ProductSummary {
                    id: product.id,
                    name: product.name,
                    price: product.price,
                    brand_id: product.ref_brand_id,
                    brand_name,
                    like_count: product.like_count,
                }
            })
            .collect();

        if let Err(e) = self
            .cache
            .product()
            .set_list_page(brand_id, sort, page, size, &summaries)
            .await
        {
            tracing::warn!("listing cache write failed: {e}");
        }

        Ok(summaries)
    }

    pub async fn get_product(&self, product_id: i64) -> CoreResult<ProductDetail> {
        let detail = match self.cache.product().get_detail(product_id).await {
            Ok(Some(cached)) => cached,
            _ => {
                let product = sqlx::query_as::<_, Product>(
                    r#"
                    SELECT id, name, price, stock, ref_brand_id, like_count, created_at, updated_at
                    FROM products WHERE id = $1
                    "#,
                )
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| CoreError::NotFound("product", product_id.to_string()))?;

                let brand = sqlx::query_as::<_, Brand>(
                    "SELECT id, name, created_at FROM brands WHERE id = $1",
                )
                .bind(product.ref_brand_id)
                .fetch_optional(&self.pool)
                .await?;

                let detail = ProductDetail {
                    id: product.id,
                    name: product.name,
                    price: product.price,
                    stock: product.stock,
                    brand_id: product.ref_brand_id,
                    brand_name: brand.map(|brand| brand.name).unwrap_or_default(),
                    like_count: product.like_count,
                };

                if let Err(e) = self.cache.product().set_detail(&detail).await {
                    tracing::warn!("detail cache write failed: {e}");
                }
                detail
            }
        };

        self.record_view(product_id).await;
        Ok(detail)
    }

    /// A view is activity, not a mutation of the product: it only appends the
    /// outbox intent. Failures are logged, never surfaced to the reader.
    async fn record_view(&self, product_id: i64) {
        let result = async {
            let mut tx = self.pool.begin().await?;
            OutboxStore::append(
                &mut tx,
                &DomainEvent::ProductViewed(ProductViewedPayload { product_id }),
            )
            .await?;
            tx.commit().await?;
            Ok::<(), CoreError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(product_id = product_id, "view event append failed: {e}");
        }
    }

    /// Avoids the per-row brand lookup: one batch query for the page's brands.
    async fn load_brands(&self, products: &[Product]) -> CoreResult<HashMap<i64, Brand>> {
        let mut brand_ids: Vec<i64> = products.iter().map(|p| p.ref_brand_id).collect();
        brand_ids.sort_unstable();
        brand_ids.dedup();
        if brand_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let brands = sqlx::query_as::<_, Brand>(
            "SELECT id, name, created_at FROM brands WHERE id = ANY($1)",
        )
        .bind(&brand_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(brands.into_iter().map(|brand| (brand.id, brand)).collect())
    }
}
