//! Persistence Errors
//!
//! Error types for repository and unit-of-work operations.

use uuid::Uuid;

use crate::domain::ValidationError;

/// Errors that can occur while reading or writing entities
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// An entity with the same identifier already exists
    #[error("Conflict: {collection} {id} already exists")]
    Conflict { collection: &'static str, id: Uuid },

    /// Another entity already holds a value that must be unique
    #[error("Unique violation: {collection}.{field} is already taken")]
    UniqueViolation {
        collection: &'static str,
        field: &'static str,
    },

    /// The targeted entity does not exist
    #[error("Not found: {collection} {id}")]
    NotFound { collection: &'static str, id: Uuid },

    /// Commit failed; whether the work was applied is unknown
    #[error("Commit failed, durability outcome unknown: {0}")]
    CommitFailed(#[source] sqlx::Error),

    /// `begin` called while a transaction is open
    #[error("A transaction is already active on this unit of work")]
    TransactionAlreadyActive,

    /// `commit` or `rollback` called with no open transaction
    #[error("No active transaction on this unit of work")]
    NoActiveTransaction,

    /// Patch rejected by entity validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Snapshot (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn conflict(collection: &'static str, id: Uuid) -> Self {
        Self::Conflict { collection, id }
    }

    pub fn unique_violation(collection: &'static str, field: &'static str) -> Self {
        Self::UniqueViolation { collection, field }
    }

    pub fn not_found(collection: &'static str, id: Uuid) -> Self {
        Self::NotFound { collection, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// Misuse of the begin/commit/rollback state machine
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::TransactionAlreadyActive | Self::NoActiveTransaction
        )
    }

    /// Check if the caller may reasonably retry.
    ///
    /// Transient connectivity failures, serialization failures and deadlocks
    /// (SQLSTATE class 40) qualify; constraint violations never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CommitFailed(_) => true,
            Self::Database(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => db.code().is_some_and(|code| code.starts_with("40")),
                _ => false,
            },
            _ => false,
        }
    }
}
