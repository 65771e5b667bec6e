//! Error types for the bizdesk backend
//!
//! All errors use thiserror for structured error handling.
//! Every error can be turned into an [`ErrorResponse`] for the caller;
//! the response code tells conflicts, missing records and bad input apart
//! from generic failures.

use crate::database::EntityKind;
use crate::lock::VersionConflict;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Conflict(#[from] VersionConflict),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("{0}")]
    Generic(String),
}

impl AppError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        AppError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// Map the error onto the structured response sent to callers.
    ///
    /// Server-side failures are logged here with their cause; the caller only
    /// sees a generic message.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            AppError::Conflict(conflict) => ErrorResponse {
                code: ErrorCode::OptimisticLock,
                message: conflict.to_string(),
                status: 409,
            },
            AppError::NotFound { .. } => ErrorResponse {
                code: ErrorCode::NotFound,
                message: self.to_string(),
                status: 404,
            },
            AppError::Validation(message) => ErrorResponse {
                code: ErrorCode::Validation,
                message: message.clone(),
                status: 400,
            },
            AppError::Database(e) => {
                tracing::error!("Write failed: {}", e);
                ErrorResponse {
                    code: ErrorCode::WriteFailed,
                    message: "Failed to save changes".to_string(),
                    status: 500,
                }
            }
            other => {
                tracing::error!("Request failed: {}", other);
                ErrorResponse {
                    code: ErrorCode::Internal,
                    message: "Internal server error".to_string(),
                    status: 500,
                }
            }
        }
    }

    /// True when the datastore rejected the write on a unique or foreign key
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db)) => matches!(
                db.kind(),
                sqlx::error::ErrorKind::UniqueViolation
                    | sqlx::error::ErrorKind::ForeignKeyViolation
                    | sqlx::error::ErrorKind::NotNullViolation
                    | sqlx::error::ErrorKind::CheckViolation
            ),
            _ => false,
        }
    }
}

/// Stable error codes surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    #[serde(rename = "OPTIMISTIC_LOCK_ERROR")]
    OptimisticLock,
    NotFound,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    WriteFailed,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
}

/// Structured error body returned by every command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub status: u16,
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_response().serialize(serializer)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
