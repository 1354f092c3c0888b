//! Mapping from core errors to HTTP responses.
//!
//! Every error body has the shape `{"error": {"code", "message", "field"?}}`. Internal failures
//! are logged with their detail and reported to the client generically.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hms_core::HmsError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{field}: {message}")]
    Validation { field: Option<String>, message: String },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, field) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
                None,
            ),
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, "FORBIDDEN", detail, None),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail, None),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail, None),
            ApiError::Validation { field, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_FAILED",
                message,
                field,
            ),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail, None),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                field,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<HmsError> for ApiError {
    fn from(err: HmsError) -> Self {
        match err {
            HmsError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            HmsError::Validation { field, message } => ApiError::Validation {
                field: Some(field),
                message,
            },
            HmsError::InvalidEnum { field, value } => ApiError::Validation {
                message: format!("invalid value: {value}"),
                field: Some(field),
            },
            HmsError::Text(e) => ApiError::Validation {
                field: None,
                message: e.to_string(),
            },
            HmsError::InvalidTimestamp(value) => ApiError::Validation {
                field: None,
                message: format!("invalid timestamp: {value}"),
            },
            HmsError::Conflict(detail) => ApiError::Conflict(detail),
            HmsError::Forbidden(detail) => ApiError::Forbidden(detail),
            HmsError::InvalidInput(detail) => ApiError::BadRequest(detail),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_statuses() {
        let cases = [
            (HmsError::not_found("patient", 7), StatusCode::NOT_FOUND),
            (HmsError::validation("amount_cents", "too large"), StatusCode::UNPROCESSABLE_ENTITY),
            (HmsError::Conflict("busy".into()), StatusCode::CONFLICT),
            (HmsError::Forbidden("admin only".into()), StatusCode::FORBIDDEN),
            (HmsError::LockPoisoned, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn validation_keeps_the_field() {
        match ApiError::from(HmsError::validation("lab_test_id", "inactive")) {
            ApiError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("lab_test_id")),
            other => panic!("unexpected: {other}"),
        }
    }
}
