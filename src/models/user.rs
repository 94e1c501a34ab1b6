#![allow(dead_code)]
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gender")]
pub enum Gender {
    M,
    F,
}

/// Point balance value object. Arithmetic returns new values; the balance can
/// never go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    balance: Decimal,
}

impl Point {
    pub fn new(balance: Decimal) -> CoreResult<Self> {
        if balance < Decimal::ZERO {
            return Err(CoreError::BadRequest(
                "point balance must not be negative".to_string(),
            ));
        }
        Ok(Self { balance })
    }

    pub fn zero() -> Self {
        Self {
            balance: Decimal::ZERO,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn add(&self, amount: Decimal) -> CoreResult<Self> {
        if amount < Decimal::ZERO {
            return Err(CoreError::BadRequest(
                "point amount must not be negative".to_string(),
            ));
        }
        Ok(Self {
            balance: self.balance + amount,
        })
    }

    pub fn subtract(&self, amount: Decimal) -> CoreResult<Self> {
        if amount < Decimal::ZERO {
            return Err(CoreError::BadRequest(
                "point amount must not be negative".to_string(),
            ));
        }
        if self.balance < amount {
            return Err(CoreError::InsufficientPoint {
                requested: amount,
                available: self.balance,
            });
        }
        Ok(Self {
            balance: self.balance - amount,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub user_id: String,
    pub email: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub point_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The embedded point balance, persisted as a column on the user row.
    pub fn point(&self) -> Point {
        Point {
            balance: self.point_balance,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(
        length(min = 1, max = 10, message = "user_id must be 1-10 characters"),
        custom = "validate_alphanumeric"
    )]
    pub user_id: String,
    #[validate(email(message = "invalid email"))]
    pub email: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
}

fn validate_alphanumeric(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ValidationError::new("user_id must be alphanumeric"))
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub user_id: String,
    pub email: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub point_balance: Decimal,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            user_id: user.user_id,
            email: user.email,
            birth_date: user.birth_date,
            gender: user.gender,
            point_balance: user.point_balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn point_add_returns_new_value() {
        let point = Point::new(dec!(1000)).unwrap();
        let charged = point.add(dec!(500)).unwrap();
        assert_eq!(point.balance(), dec!(1000));
        assert_eq!(charged.balance(), dec!(1500));
    }

    #[test]
    fn point_subtract_fails_when_balance_short() {
        let point = Point::new(dec!(100)).unwrap();
        let err = point.subtract(dec!(101)).unwrap_err();
        assert_eq!(err.error_type(), "INSUFFICIENT_POINT");
        // failed subtraction leaves the original untouched
        assert_eq!(point.balance(), dec!(100));
    }

    #[test]
    fn point_subtract_to_zero_is_allowed() {
        let point = Point::new(dec!(100)).unwrap();
        assert_eq!(point.subtract(dec!(100)).unwrap().balance(), Decimal::ZERO);
    }

    #[test]
    fn point_rejects_negative_amounts() {
        assert!(Point::new(dec!(-1)).is_err());
        let point = Point::zero();
        assert!(point.add(dec!(-5)).is_err());
        assert!(point.subtract(dec!(-5)).is_err());
    }

    #[test]
    fn signup_request_validation() {
        let ok = SignupRequest {
            user_id: "abc123".to_string(),
            email: "user@example.com".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            gender: Gender::F,
        };
        assert!(ok.validate().is_ok());

        let too_long = SignupRequest {
            user_id: "abcdefgh12345".to_string(),
            ..ok_request()
        };
        assert!(too_long.validate().is_err());

        let not_alphanumeric = SignupRequest {
            user_id: "abc-123".to_string(),
            ..ok_request()
        };
        assert!(not_alphanumeric.validate().is_err());

        let bad_email = SignupRequest {
            email: "not-an-email".to_string(),
            ..ok_request()
        };
        assert!(bad_email.validate().is_err());
    }

    fn ok_request() -> SignupRequest {
        SignupRequest {
            user_id: "abc123".to_string(),
            email: "user@example.com".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            gender: Gender::M,
        }
    }
}
