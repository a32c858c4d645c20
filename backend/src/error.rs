//! Error handling for the Fleet Management Platform
//!
//! Every failure leaves the API as `{"error": {"code", "message", "field"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use shared::TransitionError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // External service errors
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a field-level validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a conflict on `resource`
    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        match fields.first() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("{} is invalid", field));
                AppError::Validation {
                    field: field.to_string(),
                    message,
                }
            }
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::AlreadySigned => {
                AppError::conflict("agreement", "Agreement has already been signed")
            }
            other => AppError::InvalidStateTransition(other.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Map database errors that the client caused to 409s; everything else is a 500
fn database_error_detail(err: &sqlx::Error) -> (StatusCode, ErrorDetail) {
    if let sqlx::Error::Database(db_err) = err {
        let constraint = db_err.constraint().unwrap_or("record").to_string();
        match db_err.code().as_deref() {
            Some("23505") => {
                return (
                    StatusCode::CONFLICT,
                    ErrorDetail::new(
                        "DUPLICATE_ENTRY",
                        "A record with these details already exists",
                    )
                    .with_field(constraint),
                )
            }
            Some("23503") => {
                return (
                    StatusCode::CONFLICT,
                    ErrorDetail::new(
                        "CONFLICT",
                        "The record is referenced by, or references, another record",
                    )
                    .with_field(constraint),
                )
            }
            _ => {}
        }
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_CREDENTIALS", "Invalid email or password"),
            ),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("TOKEN_EXPIRED", "Token has expired"),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", "Invalid token"),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                ),
            ),
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone()),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone()).with_field(field.clone()),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "DUPLICATE_ENTRY",
                    format!("A record with this {} already exists", field),
                )
                .with_field(field.clone()),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone()).with_field(resource.clone()),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::Gone(msg) => (StatusCode::GONE, ErrorDetail::new("GONE", msg.clone())),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorDetail::new("PAYLOAD_TOO_LARGE", msg.clone()),
            ),
            AppError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorDetail::new("UNSUPPORTED_MEDIA_TYPE", msg.clone()),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INVALID_STATE_TRANSITION", msg.clone()),
            ),
            AppError::StorageError(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new("STORAGE_ERROR", format!("Storage error: {}", msg)),
            ),
            AppError::EmailError(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("EMAIL_ERROR", format!("Email delivery failed: {}", msg)),
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("CONFIGURATION_ERROR", format!("Configuration error: {}", msg)),
            ),
            AppError::DatabaseError(err) => database_error_detail(err),
            AppError::Internal(_) | AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Input {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AppError::InsufficientPermissions, StatusCode::FORBIDDEN),
            (AppError::validation("name", "bad"), StatusCode::BAD_REQUEST),
            (AppError::NotFound("Vehicle".into()), StatusCode::NOT_FOUND),
            (AppError::conflict("vehicle", "taken"), StatusCode::CONFLICT),
            (AppError::Gone("expired".into()), StatusCode::GONE),
            (
                AppError::InvalidStateTransition("no".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::StorageError("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::EmailError("refused".into()), StatusCode::BAD_GATEWAY),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                AppError::DatabaseError(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_validator_errors_name_the_field() {
        let errors = Input {
            name: String::new(),
        }
        .validate()
        .unwrap_err();

        match AppError::from(errors) {
            AppError::Validation { field, message } => {
                assert_eq!(field, "name");
                assert_eq!(message, "Name is required");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_transition_errors() {
        assert!(matches!(
            AppError::from(TransitionError::AlreadySigned),
            AppError::Conflict { .. }
        ));
        assert!(matches!(
            AppError::from(TransitionError::Terminated),
            AppError::InvalidStateTransition(_)
        ));
    }
}
