//! API Error Types
//!
//! Defines error types for the HTTP surface and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::links::LinkError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Source exceeded its admission budget
    #[error("Rate limit exceeded")]
    RateLimited,

    /// A managed link could not be established
    #[error("Link failed: {0}")]
    LinkFailed(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LinkError> for ApiError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::NotFound(id) => ApiError::NotFound(format!("link {}", id)),
            LinkError::InvalidAddress(_) => ApiError::Validation(e.to_string()),
            other => ApiError::LinkFailed(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            ApiError::LinkFailed(_) => (StatusCode::BAD_GATEWAY, "LINK_FAILED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() || status == StatusCode::BAD_GATEWAY {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::warn!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_link_error_mapping() {
        let not_found: ApiError = LinkError::NotFound(Uuid::new_v4()).into();
        assert_eq!(not_found.status_and_code().0, StatusCode::NOT_FOUND);

        let invalid: ApiError = LinkError::InvalidAddress("nope".into()).into();
        assert_eq!(invalid.status_and_code().0, StatusCode::BAD_REQUEST);

        let exhausted: ApiError = LinkError::Exhausted {
            device_id: "pc".into(),
            attempts: 3,
            last_error: "refused".into(),
        }
        .into();
        assert_eq!(exhausted.status_and_code().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_rate_limited_message() {
        let err = ApiError::RateLimited;
        assert_eq!(err.to_string(), "Rate limit exceeded");
        assert_eq!(err.status_and_code().0, StatusCode::TOO_MANY_REQUESTS);
    }
}
