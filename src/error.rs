use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use jsonwebtoken::errors::ErrorKind;
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::storage::StorageError;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema, TS)]
#[ts(export)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// ApiError
///
/// Every failure a handler or extractor can surface. Each variant maps to exactly one
/// HTTP status; the `code` strings are part of the public contract and clients switch on them.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Password does not meet requirements")]
    WeakPassword(Vec<String>),

    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("{message}")]
    Unauthorized { code: &'static str, message: String },

    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// 423: the account exists but cannot be used right now.
    #[error("{message}")]
    Locked { code: &'static str, message: String },

    #[error("{message}")]
    ServiceUnavailable { code: &'static str, message: String },

    #[error("{message}")]
    TooManyRequests { message: String, retry_after: u64 },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn locked(code: &'static str, message: impl Into<String>) -> Self {
        Self::Locked {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Shorthand for a single-field validation failure.
    pub fn invalid_field(field: &str, message: &str) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::WeakPassword(_) | ApiError::BadRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Locked { .. } => StatusCode::LOCKED,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Repository(err) => match err {
                RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
                RepositoryError::Duplicate(_) => StatusCode::CONFLICT,
                RepositoryError::ConstraintViolation(_) => StatusCode::BAD_REQUEST,
                RepositoryError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::WeakPassword(_) => "WEAK_PASSWORD",
            ApiError::BadRequest { code, .. }
            | ApiError::Unauthorized { code, .. }
            | ApiError::Forbidden { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Conflict { code, .. }
            | ApiError::Locked { code, .. }
            | ApiError::ServiceUnavailable { code, .. } => code,
            ApiError::TooManyRequests { .. } => "RATE_LIMITED",
            ApiError::Repository(err) => match err {
                RepositoryError::NotFound(_) => "NOT_FOUND",
                RepositoryError::Duplicate(_) => "DUPLICATE_RECORD",
                RepositoryError::ConstraintViolation(_) => "INVALID_REFERENCE",
                RepositoryError::Query(_) => "DATABASE_ERROR",
            },
            ApiError::Storage(_) => "UPLOAD_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The message shown to clients. Server-side failures never leak their cause.
    fn public_message(&self) -> String {
        match self {
            ApiError::Repository(RepositoryError::Query(_)) => "Database error".to_string(),
            ApiError::Repository(RepositoryError::Duplicate(_)) => {
                "A record with these values already exists".to_string()
            }
            ApiError::Repository(RepositoryError::ConstraintViolation(_)) => {
                "The request references a record that does not exist".to_string()
            }
            ApiError::Storage(_) => "Failed to generate upload URL".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// ErrorBody
///
/// The JSON shape of every error response.
#[derive(Debug, Serialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub details: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(code = self.code(), "request rejected");
        }

        let mut body = ErrorBody {
            error: self.public_message(),
            code: self.code().to_string(),
            details: None,
            errors: None,
            retry_after: None,
        };
        let mut retry_header = None;

        match self {
            ApiError::Validation(details) => body.details = Some(details),
            ApiError::WeakPassword(errors) => body.errors = Some(errors),
            ApiError::TooManyRequests { retry_after, .. } => {
                body.retry_after = Some(retry_after);
                retry_header = HeaderValue::from_str(&retry_after.to_string()).ok();
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(value) = retry_header {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => ApiError::unauthorized("TOKEN_EXPIRED", "Token expired"),
            _ => ApiError::unauthorized("TOKEN_INVALID", "Invalid token"),
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Foreign key or check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => RepositoryError::Duplicate(db_err.message().to_string()),
                Some("23503") | Some("23514") => {
                    RepositoryError::ConstraintViolation(db_err.message().to_string())
                }
                _ => RepositoryError::Query(err),
            },
            _ => RepositoryError::Query(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_errors_map_to_client_statuses() {
        let dup: ApiError = RepositoryError::Duplicate("users_email_key".into()).into();
        assert_eq!(dup.status(), StatusCode::CONFLICT);
        assert_eq!(dup.code(), "DUPLICATE_RECORD");

        let missing: ApiError = RepositoryError::NotFound("vendor".into()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let fk: ApiError = RepositoryError::ConstraintViolation("fk".into()).into();
        assert_eq!(fk.status(), StatusCode::BAD_REQUEST);
        assert_eq!(fk.code(), "INVALID_REFERENCE");
    }

    #[test]
    fn internal_errors_are_masked() {
        let err = ApiError::internal("connection refused to 10.0.0.4");
        assert_eq!(err.public_message(), "Internal server error");
        let db: ApiError = RepositoryError::Query(SqlxError::PoolTimedOut).into();
        assert_eq!(db.public_message(), "Database error");
        assert_eq!(db.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let storage: ApiError = StorageError::Backend("minio down".into()).into();
        assert_eq!(storage.code(), "UPLOAD_ERROR");
        assert_eq!(storage.public_message(), "Failed to generate upload URL");
    }

    #[test]
    fn rate_limit_sets_retry_after_header() {
        let response = ApiError::TooManyRequests {
            message: "slow down".into(),
            retry_after: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
