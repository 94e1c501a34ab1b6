//! Response envelope
//!
//! Every endpoint answers `{success, data, error, timestamp}`. Handlers only
//! ever build the success arm; the error arm is derived from `CoreError`
//! through its `IntoResponse` impl below.

#![allow(dead_code)]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Serialize)]
pub struct ApiError {
    code: String,
    message: String,
}

impl From<&CoreError> for ApiError {
    fn from(err: &CoreError) -> Self {
        Self {
            code: err.error_type().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    timestamp: i64,
    data: Option<T>,
    error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    fn stamped(data: Option<T>, error: Option<ApiError>) -> Self {
        Self {
            success: error.is_none(),
            timestamp: chrono::Utc::now().timestamp(),
            data,
            error,
        }
    }

    pub fn success(data: T) -> Self {
        Self::stamped(Some(data), None)
    }
}

impl ApiResponse<()> {
    pub fn failure(error: ApiError) -> Self {
        Self::stamped(None, Some(error))
    }
}

fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::BadRequest(_)
        | CoreError::InsufficientStock { .. }
        | CoreError::InsufficientPoint { .. } => StatusCode::BAD_REQUEST,
        CoreError::NotFound(..) => StatusCode::NOT_FOUND,
        CoreError::Conflict(_) | CoreError::InvalidState(_) => StatusCode::CONFLICT,
        CoreError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CoreError::UpstreamFailure(_) | CoreError::CircuitOpen(_) => StatusCode::BAD_GATEWAY,
        CoreError::Database(_)
        | CoreError::Redis(_)
        | CoreError::Serialization(_)
        | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
        }
        let body = ApiResponse::failure(ApiError::from(&self));
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_wire_shape() {
        let json = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json["error"].is_null());
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn failure_envelope_carries_the_taxonomy_code() {
        let err = CoreError::InsufficientStock {
            product_id: 7,
            requested: 2,
            available: 1,
        };
        let json = serde_json::to_value(ApiResponse::failure(ApiError::from(&err))).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["data"].is_null());
        assert_eq!(json["error"]["code"], "INSUFFICIENT_STOCK");
    }

    #[test]
    fn validation_errors_map_to_400() {
        assert_eq!(
            status_for(&CoreError::BadRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&CoreError::InsufficientStock {
                product_id: 1,
                requested: 2,
                available: 0
            }),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn terminal_state_mutations_map_to_409() {
        assert_eq!(
            status_for(&CoreError::InvalidState("order already CANCELED".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn upstream_errors_map_to_gateway_codes() {
        assert_eq!(
            status_for(&CoreError::UpstreamTimeout("pg".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&CoreError::CircuitOpen("pg".into())),
            StatusCode::BAD_GATEWAY
        );
    }
}
