//! User service
//!
//! Signup creates the User aggregate the order path locks and debits. Point
//! charging is the single post-signup mutation.

use rust_decimal::Decimal;
use sqlx::PgPool;
use validator::Validate;

use crate::error::{CoreError, CoreResult};
use crate::events::{DomainEvent, UserRegisteredPayload};
use crate::models::{SignupRequest, User, UserResponse};
use crate::outbox::OutboxStore;

pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn signup(&self, request: SignupRequest) -> CoreResult<UserResponse> {
        request
            .validate()
            .map_err(|e| CoreError::BadRequest(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, birth_date, gender, point_balance)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING id, user_id, email, birth_date, gender, point_balance,
                      created_at, updated_at
            "#,
        )
        .bind(&request.user_id)
        .bind(&request.email)
        .bind(request.birth_date)
        .bind(request.gender)
        .fetch_one(&mut *tx)
        .await;

        let user = match inserted {
            Ok(user) => user,
            Err(e)
                if e.as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false) =>
            {
                return Err(CoreError::Conflict(format!(
                    "user_id {} is already taken",
                    request.user_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        OutboxStore::append(
            &mut tx,
            &DomainEvent::UserRegistered(UserRegisteredPayload {
                user_id: user.id,
                login_id: user.user_id.clone(),
            }),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, login_id = %user.user_id, "user registered");
        Ok(user.into())
    }

    pub async fn charge_point(&self, user_id: i64, amount: Decimal) -> CoreResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::BadRequest(
                "charge amount must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, user_id, email, birth_date, gender, point_balance,
                   created_at, updated_at
            FROM users WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::NotFound("user", user_id.to_string()))?;

        let charged = user.point().add(amount)?;
        sqlx::query("UPDATE users SET point_balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(user.id)
            .bind(charged.balance())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(charged.balance())
    }

    pub async fn get_points(&self, user_id: i64) -> CoreResult<Decimal> {
        sqlx::query_scalar::<_, Decimal>("SELECT point_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound("user", user_id.to_string()))
    }
}
