//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use shiroine_pay_store::StoreError;

use crate::gateway::GatewayError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unauthorized - callback signature did not verify.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The gateway is missing credentials.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The payment provider failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Too many requests from one client.
    #[error("rate limit exceeded")]
    RateLimited,
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::Configuration(msg) => {
                tracing::error!(error = %msg, "Payment gateway misconfigured");
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error", msg)
            }
            Self::Upstream(msg) => {
                tracing::warn!(error = %msg, "Payment provider error");
                (StatusCode::BAD_GATEWAY, "upstream_error", msg)
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests, try again later".to_string(),
            ),
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(msg) | GatewayError::Parse(msg) => Self::BadRequest(msg),
            GatewayError::Authentication(msg) => Self::Unauthorized(msg),
            GatewayError::NotFound(msg) => Self::NotFound(msg),
            GatewayError::Configuration(msg) => Self::Configuration(msg),
            GatewayError::Upstream { .. } | GatewayError::Http(_) => Self::Upstream(err.to_string()),
            GatewayError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("record not found".into()),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_to_status_codes() {
        let cases = [
            (GatewayError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (GatewayError::Parse("x".into()), StatusCode::BAD_REQUEST),
            (GatewayError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (GatewayError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                GatewayError::Configuration("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GatewayError::Upstream {
                    provider: "tripay",
                    message: "x".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                GatewayError::Store(StoreError::Database("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.into_response().status(), expected);
        }
    }

    #[test]
    fn rate_limited_is_429() {
        assert_eq!(
            ApiError::RateLimited.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
