//! Crate-wide error type
//!
//! Domain validation failures propagate synchronously to the caller; remote
//! failures in the payment path never abort an order (the order stays PENDING
//! and reconciliation drives the transition later).

/// Error taxonomy shared by every core operation.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    #[error("{0}")]
    Conflict(String),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("insufficient point balance: requested {requested}, available {available}")]
    InsufficientPoint {
        requested: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("circuit open for downstream {0}")]
    CircuitOpen(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable error-type string reported to callers.
    pub fn error_type(&self) -> &'static str {
        match self {
            CoreError::BadRequest(_) => "BAD_REQUEST",
            CoreError::NotFound(..) => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CoreError::InsufficientPoint { .. } => "INSUFFICIENT_POINT",
            CoreError::InvalidState(_) => "INVALID_STATE",
            CoreError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            CoreError::UpstreamFailure(_) => "UPSTREAM_FAILURE",
            CoreError::CircuitOpen(_) => "CIRCUIT_OPEN",
            CoreError::Database(_)
            | CoreError::Redis(_)
            | CoreError::Serialization(_)
            | CoreError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a remote-call failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::UpstreamTimeout(_) | CoreError::UpstreamFailure(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn error_types_are_stable() {
        let e = CoreError::InsufficientStock {
            product_id: 7,
            requested: 2,
            available: 1,
        };
        assert_eq!(e.error_type(), "INSUFFICIENT_STOCK");

        let e = CoreError::InsufficientPoint {
            requested: dec!(500),
            available: dec!(100),
        };
        assert_eq!(e.error_type(), "INSUFFICIENT_POINT");

        assert_eq!(
            CoreError::CircuitOpen("pg-gateway".into()).error_type(),
            "CIRCUIT_OPEN"
        );
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(CoreError::UpstreamTimeout("connect".into()).is_transient());
        assert!(CoreError::UpstreamFailure("502".into()).is_transient());
        assert!(!CoreError::BadRequest("bad".into()).is_transient());
        assert!(!CoreError::CircuitOpen("pg".into()).is_transient());
    }
}
