//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses `{"error", "message"}` with
//! appropriate status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mealdash_core::schedule::SwitchRejection;
use mealdash_core::{CoreError, CouponRejection, ValidationError};
use serde_json::json;

use crate::db::DbError;
use crate::integrations::IntegrationError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Validation failed (400)
    Validation(ValidationError),

    /// Request body could not be understood (400)
    BadRequest(String),

    /// Missing or wrong credentials (401)
    Unauthorized,

    /// Authenticated but not allowed (403)
    Forbidden { reason: String },

    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },

    /// Conflicts with current state (409)
    Conflict(String),

    /// A business rule refused the request (422)
    Rejected { code: &'static str, message: String },

    /// Payment, dispatch or email provider failed (502, logged)
    Upstream(IntegrationError),

    /// Database error (500, logged)
    Database(DbError),

    /// Internal error (500)
    Internal { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_error",
                    "message": e.to_string()
                }),
            ),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "bad_request",
                    "message": message
                }),
            ),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({
                    "error": "unauthorized",
                    "message": "missing or invalid credentials"
                }),
            ),
            Self::Forbidden { reason } => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "forbidden",
                    "message": reason
                }),
            ),
            Self::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("{} '{}' not found", resource, id)
                }),
            ),
            Self::Conflict(message) => (
                StatusCode::CONFLICT,
                json!({
                    "error": "conflict",
                    "message": message
                }),
            ),
            Self::Rejected { code, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": code,
                    "message": message
                }),
            ),
            Self::Upstream(e) => {
                tracing::error!("Upstream error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "error": "upstream_error",
                        "message": "a payment or delivery provider is unavailable"
                    }),
                )
            }
            Self::Database(e) => {
                // Log the actual error, return generic message
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
            Self::Internal { message } => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { resource, id } => Self::NotFound { resource, id },
            DbError::Conflict(message) => Self::Conflict(message),
            DbError::Invalid(v) => Self::Validation(v),
            DbError::Rejected(message) => Self::Rejected {
                code: "invalid_transition",
                message,
            },
            _ => Self::Database(e),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(DbError::Sqlx(e))
    }
}

impl From<CouponRejection> for ApiError {
    fn from(e: CouponRejection) -> Self {
        Self::Rejected {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<SwitchRejection> for ApiError {
    fn from(e: SwitchRejection) -> Self {
        Self::Rejected {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<IntegrationError> for ApiError {
    fn from(e: IntegrationError) -> Self {
        match e {
            IntegrationError::Signature(_) => Self::Unauthorized,
            IntegrationError::Payload { .. } => Self::BadRequest(e.to_string()),
            IntegrationError::NotConfigured { .. } => Self::internal(e.to_string()),
            _ => Self::Upstream(e),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(v) => Self::Validation(v),
            CoreError::Rule(message) => Self::Rejected {
                code: "rule_violation",
                message,
            },
            other => Self::internal(other.to_string()),
        }
    }
}
