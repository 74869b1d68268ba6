//! Domain error types for the headshot pipeline server.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;

use crate::services::archive::ArchiveError;
use crate::services::training::GatewayError;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request conflicts with current resource state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Local filesystem operation failed
    #[error("File system error: {0}")]
    FileSystem(String),

    /// Storage (S3) operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Archive could not be produced
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Training vendor rejected or failed a call
    #[error("Training vendor error: {0}")]
    Vendor(#[from] GatewayError),
}

impl AppError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Conflict(_) => "CONFLICT",
            AppError::FileSystem(_) => "FILE_SYSTEM_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Archive(_) => "ARCHIVE_ERROR",
            AppError::Vendor(_) => "VENDOR_ERROR",
        }
    }

    /// Message that is safe to return to a client.
    ///
    /// Internal failures are logged here and replaced with a generic message.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(err_str) => {
                tracing::error!("Database error: {}", err_str);
                "An internal database error occurred".to_string()
            }
            AppError::FileSystem(err_str) => {
                tracing::error!("File system error: {}", err_str);
                "An internal storage error occurred".to_string()
            }
            AppError::Storage(err_str) => {
                tracing::error!("Storage error: {}", err_str);
                "Failed to store training archive".to_string()
            }
            AppError::Vendor(err) => {
                tracing::error!("Training vendor error: {}", err);
                err.public_message()
            }
            AppError::Archive(err) => err.to_string(),
            AppError::NotFound(_) | AppError::InvalidInput(_) | AppError::Conflict(_) => {
                self.to_string()
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Archive(ArchiveError::Empty { .. }) => StatusCode::BAD_REQUEST,
            AppError::Vendor(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::FileSystem(_)
            | AppError::Storage(_)
            | AppError::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.code().to_string(),
            message: self.public_message(),
        })
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}
