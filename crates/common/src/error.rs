//! Error types for guildest.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Caller Errors ===
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Job Errors ===
    #[error("No handler registered for job type: {0}")]
    HandlerNotFound(String),

    #[error("Handler failed: {0}")]
    HandlerExecution(String),

    #[error("Timed out waiting for result of job {0}")]
    ResultTimeout(String),

    // === Infrastructure Errors ===
    #[error("Queue backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the stable error code for this error, used in published
    /// job results and structured logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::HandlerNotFound(_) => "HANDLER_NOT_FOUND",
            Self::HandlerExecution(_) => "HANDLER_EXECUTION_ERROR",
            Self::ResultTimeout(_) => "TIMED_OUT",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error indicates the shared queue backend
    /// cannot be reached.
    #[must_use]
    pub const fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

// === From implementations ===

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
