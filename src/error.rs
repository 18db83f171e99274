//! Common error types for the style-transfer worker

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("No identifiable subject found in the input image")]
    NoSubjectFound,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Engine load failed: {0}")]
    EngineLoad(String),

    #[error("Service not ready: {0}")]
    NotReady(String),

    #[error("Processing timeout after {0}s")]
    ProcessingTimeout(u64),

    #[error("Engine invocation failed: {0}")]
    EngineInvocation(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error kind
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::NoSubjectFound => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::ResourceUnavailable(_) | AppError::EngineLoad(_) | AppError::NotReady(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::ProcessingTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Transfer(_) | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::EngineInvocation(_)
            | AppError::Config(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, independent of the human-readable message
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::Json(_) => "VALIDATION_ERROR",
            AppError::NoSubjectFound => "NO_SUBJECT_FOUND",
            AppError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AppError::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
            AppError::EngineLoad(_) => "ENGINE_LOAD_FAILED",
            AppError::NotReady(_) => "SERVICE_NOT_READY",
            AppError::ProcessingTimeout(_) => "PROCESSING_TIMEOUT",
            AppError::EngineInvocation(_) => "ENGINE_INVOCATION_FAILED",
            AppError::Transfer(_) | AppError::HttpClient(_) => "TRANSFER_FAILED",
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Attach a request id for the response envelope
    pub fn with_request_id(self, request_id: Uuid) -> ApiError {
        ApiError {
            request_id,
            source: self,
        }
    }
}

/// Error envelope returned to callers
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub error_code: String,
    pub request_id: String,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn new(error: &AppError, request_id: Uuid) -> Self {
        // Internal detail must not leak to the caller
        let message = match error {
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        Self {
            error: message,
            error_code: error.code().to_string(),
            request_id: request_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// An error bound to the request it occurred in
#[derive(Debug)]
pub struct ApiError {
    pub request_id: Uuid,
    pub source: AppError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.source.status();
        let body = Json(ErrorEnvelope::new(&self.source, self.request_id));
        (status, body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Error surfaced outside a request-id scope; mint one for correlation
        self.with_request_id(Uuid::new_v4()).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NoSubjectFound.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::ProcessingTimeout(240).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::ResourceUnavailable("weights".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AppError::NoSubjectFound.code(), "NO_SUBJECT_FOUND");
        assert_eq!(AppError::ProcessingTimeout(1).code(), "PROCESSING_TIMEOUT");
        assert_eq!(
            AppError::EngineInvocation("x".into()).code(),
            "ENGINE_INVOCATION_FAILED"
        );
    }

    #[test]
    fn test_internal_detail_not_leaked() {
        let err = AppError::Internal("password=s3cret".into());
        let envelope = ErrorEnvelope::new(&err, Uuid::nil());
        assert_eq!(envelope.error, "Internal server error");
        assert_eq!(envelope.error_code, "INTERNAL_ERROR");
    }
}
