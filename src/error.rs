//! Error handling module
//!
//! Centralized error type for use-case handlers. Request boundaries turn it
//! into a response with `error_code()`.

use uuid::Uuid;

use crate::domain::ValidationError;
use crate::gateway::GatewayError;
use crate::persistence::PersistenceError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Category {category_id} is not available to user {user_id}")]
    CategoryNotVisible { category_id: Uuid, user_id: Uuid },

    #[error("Session expired")]
    SessionExpired,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    // Storage and infrastructure
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::EmailTaken(_) => "email_taken",
            AppError::CategoryNotVisible { .. } => "category_not_visible",
            AppError::SessionExpired => "session_expired",
            AppError::Validation(_) => "validation_error",
            AppError::Persistence(err) => match err {
                PersistenceError::Conflict { .. } => "conflict",
                PersistenceError::UniqueViolation { .. } => "unique_violation",
                PersistenceError::NotFound { .. } => "not_found",
                PersistenceError::CommitFailed(_) => "commit_failed",
                PersistenceError::Validation(_) => "validation_error",
                PersistenceError::TransactionAlreadyActive
                | PersistenceError::NoActiveTransaction
                | PersistenceError::Database(_)
                | PersistenceError::Serialization(_) => "database_error",
            },
            AppError::Gateway(_) => "internal_error",
            AppError::Config(_) => "config_error",
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        match self {
            AppError::InvalidCredentials
            | AppError::EmailTaken(_)
            | AppError::CategoryNotVisible { .. }
            | AppError::SessionExpired
            | AppError::Validation(_) => true,
            AppError::Persistence(err) => matches!(
                err,
                PersistenceError::Conflict { .. }
                    | PersistenceError::UniqueViolation { .. }
                    | PersistenceError::NotFound { .. }
                    | PersistenceError::Validation(_)
            ),
            AppError::Gateway(_) | AppError::Config(_) => false,
        }
    }
}
