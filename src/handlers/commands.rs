//! Command definitions
//!
//! Commands represent intentions to change the system state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =========================================================================
// Registration & sessions
// =========================================================================

/// Command to register a new user
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUserCommand {
    pub name: String,
    pub email: String,
    /// Plaintext password, hashed before anything is stored
    pub password: String,
}

impl RegisterUserCommand {
    pub fn new(name: String, email: String, password: String) -> Self {
        Self {
            name,
            email,
            password,
        }
    }
}

/// Command to open a session with email and password
#[derive(Debug, Clone, Deserialize)]
pub struct LoginCommand {
    pub email: String,
    pub password: String,
}

impl LoginCommand {
    pub fn new(email: String, password: String) -> Self {
        Self { email, password }
    }
}

/// Result of a successful registration
#[derive(Debug, Clone, Serialize)]
pub struct RegisterUserResult {
    pub user_id: Uuid,
    pub email: String,
}

/// Result of a successful login
///
/// `token` is the only copy of the plaintext bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

// =========================================================================
// Transactions
// =========================================================================

/// Command to record an expense
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordExpenseCommand {
    pub user_id: Uuid,
    pub category_id: Uuid,
    /// Amount spent (as string for precise decimal)
    pub amount: String,
    pub description: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl RecordExpenseCommand {
    pub fn new(user_id: Uuid, category_id: Uuid, amount: String) -> Self {
        Self {
            user_id,
            category_id,
            amount,
            description: None,
            occurred_at: None,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }
}

/// Command to record money moved between two users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTransferenceCommand {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    /// Amount moved (as string for precise decimal)
    pub amount: String,
    pub description: Option<String>,
}

impl RecordTransferenceCommand {
    pub fn new(sender_id: Uuid, receiver_id: Uuid, amount: String) -> Self {
        Self {
            sender_id,
            receiver_id,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }
}
