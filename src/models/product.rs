use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Brand {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
    pub ref_brand_id: i64,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Reserve stock for an order item. Stock never goes negative.
    pub fn decrease_stock(&mut self, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return Err(CoreError::BadRequest(
                "quantity must be positive".to_string(),
            ));
        }
        if self.stock < quantity {
            return Err(CoreError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available: self.stock,
            });
        }
        self.stock -= quantity;
        Ok(())
    }

    /// Restore stock on cancellation.
    pub fn increase_stock(&mut self, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return Err(CoreError::BadRequest(
                "quantity must be positive".to_string(),
            ));
        }
        self.stock += quantity;
        Ok(())
    }
}

/// Sort orders accepted by the product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    Latest,
    PriceAsc,
    LikesDesc,
}

impl ProductSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductSort::Latest => "latest",
            ProductSort::PriceAsc => "price_asc",
            ProductSort::LikesDesc => "likes_desc",
        }
    }
}

impl std::str::FromStr for ProductSort {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(ProductSort::Latest),
            "price_asc" => Ok(ProductSort::PriceAsc),
            "likes_desc" => Ok(ProductSort::LikesDesc),
            other => Err(CoreError::BadRequest(format!(
                "unsupported sort: {other}"
            ))),
        }
    }
}

/// One row of a product listing page, with the brand denormalized in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub brand_id: i64,
    pub brand_name: String,
    pub like_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetail {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
    pub brand_id: i64,
    pub brand_name: String,
    pub like_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(stock: i64) -> Product {
        Product {
            id: 1,
            name: "sneaker".to_string(),
            price: dec!(10000),
            stock,
            ref_brand_id: 1,
            like_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn decrease_stock_reserves() {
        let mut p = product(3);
        p.decrease_stock(2).unwrap();
        assert_eq!(p.stock, 1);
    }

    #[test]
    fn decrease_stock_fails_without_mutating() {
        let mut p = product(1);
        let err = p.decrease_stock(2).unwrap_err();
        assert_eq!(err.error_type(), "INSUFFICIENT_STOCK");
        assert_eq!(p.stock, 1);
    }

    #[test]
    fn increase_stock_is_monotonic() {
        let mut p = product(0);
        p.increase_stock(5).unwrap();
        p.increase_stock(1).unwrap();
        assert_eq!(p.stock, 6);
    }

    #[test]
    fn zero_or_negative_quantities_are_rejected() {
        let mut p = product(10);
        assert!(p.decrease_stock(0).is_err());
        assert!(p.increase_stock(-1).is_err());
    }

    #[test]
    fn sort_round_trips() {
        for sort in [
            ProductSort::Latest,
            ProductSort::PriceAsc,
            ProductSort::LikesDesc,
        ] {
            assert_eq!(sort.as_str().parse::<ProductSort>().unwrap(), sort);
        }
        assert!("newest".parse::<ProductSort>().is_err());
    }
}
