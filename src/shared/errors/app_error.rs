use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Source error: {0}")]
    SourceError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::StorageError(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::ValidationError(format!("Invalid UUID: {}", err))
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::StorageError(format!("Frame encoding failed: {}", err))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            AppError::CacheError(format!("Redis unreachable: {}", err))
        } else {
            AppError::CacheError(err.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            AppError::InternalError("Worker task panicked".to_string())
        } else {
            AppError::InternalError(format!("Worker task aborted: {}", err))
        }
    }
}

impl AppError {
    /// Whether the error belongs to the caller (bad input or unknown id)
    /// rather than to the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::ValidationError(_)
                | AppError::NotFound(_)
                | AppError::Conflict(_)
                | AppError::CapacityExceeded(_)
        )
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
