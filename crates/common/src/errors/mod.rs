//! Error types for RuleForge services
//!
//! Provides the service-wide error type with:
//! - Distinct variants for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling
//!
//! The vector store's `StoreError` converts into `AppError` at the HTTP edge.
//! Explain stream failures never become `AppError`s; they travel in-stream.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // External service errors (8xxx)
    VectorStoreError,

    // Internal errors (9xxx)
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::VectorStoreError => 8005,
            ErrorCode::ConfigurationError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::VectorStore { .. } => ErrorCode::VectorStoreError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::VectorStore { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match self {
            AppError::Validation { field, .. } => field,
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Invalid game id".into(),
            field: Some("game_id".into()),
        };
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_vector_store_unavailable() {
        let err = AppError::VectorStore {
            message: "connection refused".into(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code().as_code(), 8005);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_configuration_is_internal() {
        let err = AppError::Configuration {
            message: "unknown backend".into(),
        };
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::VectorStoreError).unwrap();
        assert_eq!(json, "\"VECTOR_STORE_ERROR\"");
    }

    #[tokio::test]
    async fn test_response_body_carries_code_and_field() {
        let response = AppError::Validation {
            message: "length".into(),
            field: Some("game_id".into()),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["field"], "game_id");
    }
}
