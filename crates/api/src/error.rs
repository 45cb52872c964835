//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cache::{IdempotencyError, SessionError};
use checkout::CheckoutError;
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// Authenticated but not allowed.
    Forbidden(String),
    /// Resource not found.
    NotFound(String),
    /// The request conflicts with current state.
    Conflict(String),
    /// Well-formed but unprocessable request.
    Unprocessable(String),
    /// A downstream dependency failed.
    Upstream(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Upstream(msg) => {
                tracing::error!(error = %msg, "upstream dependency failed");
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match &err {
            CheckoutError::PendingOrderExists | CheckoutError::InsufficientStock { .. } => {
                ApiError::Conflict(err.to_string())
            }
            CheckoutError::NotFound(_) => ApiError::NotFound(err.to_string()),
            CheckoutError::Unprocessable(_) => ApiError::Unprocessable(err.to_string()),
            CheckoutError::Gateway(_) => ApiError::Upstream(err.to_string()),
            CheckoutError::Idempotency(inner) => idempotency_error_to_response(inner),
            CheckoutError::Domain(inner) => domain_error_to_response(inner),
            CheckoutError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}

fn idempotency_error_to_response(err: &IdempotencyError) -> ApiError {
    match err {
        IdempotencyError::MissingToken => ApiError::BadRequest(err.to_string()),
        IdempotencyError::InFlight => ApiError::Conflict(err.to_string()),
        IdempotencyError::StoreUnavailable(_) | IdempotencyError::CorruptRecord(_) => {
            ApiError::Internal(err.to_string())
        }
    }
}

fn domain_error_to_response(err: &DomainError) -> ApiError {
    match err {
        DomainError::InvalidStatusTransition { .. } => ApiError::Conflict(err.to_string()),
        DomainError::UnknownStatus(_) => ApiError::BadRequest(err.to_string()),
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match &err {
            SessionError::Unauthorized => ApiError::Unauthorized(err.to_string()),
            SessionError::Cache(_) | SessionError::Serialization(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<store::StoreError> for ApiError {
    fn from(err: store::StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        domain_error_to_response(&err)
    }
}
