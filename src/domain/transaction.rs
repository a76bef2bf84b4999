//! Financial transaction entities
//!
//! Two kinds are tracked:
//! - `DebitExpenseTransaction`: money a user spent, filed under a category
//! - `TransferenceTransaction`: money moved from one user to another

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::optional_text;
use super::{Amount, Patch, Record, ValidationError};

const MAX_DESCRIPTION_LEN: usize = 255;

// =========================================================================
// Debit expense
// =========================================================================

/// Expense payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitExpenseTransaction {
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub amount: Amount,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Input for recording an expense
#[derive(Debug, Clone)]
pub struct NewDebitExpense {
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub amount: Amount,
    pub description: Option<String>,
    /// Defaults to the creation time
    pub occurred_at: Option<DateTime<Utc>>,
}

impl NewDebitExpense {
    pub fn new(user_id: Uuid, category_id: Uuid, amount: Amount) -> Self {
        Self {
            user_id,
            category_id,
            amount,
            description: None,
            occurred_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }
}

/// Changes to an expense.
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default)]
pub struct DebitExpensePatch {
    pub category_id: Option<Uuid>,
    pub amount: Option<Amount>,
    pub description: Option<Option<String>>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl Patch for DebitExpensePatch {
    fn is_empty(&self) -> bool {
        self.category_id.is_none()
            && self.amount.is_none()
            && self.description.is_none()
            && self.occurred_at.is_none()
    }
}

impl Record for DebitExpenseTransaction {
    type Create = NewDebitExpense;
    type Update = DebitExpensePatch;

    const COLLECTION: &'static str = "debit_expense_transactions";

    fn from_create(input: NewDebitExpense, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        Ok(Self {
            user_id: input.user_id,
            category_id: input.category_id,
            amount: input.amount,
            description: optional_text(
                "description",
                input.description.as_deref(),
                MAX_DESCRIPTION_LEN,
            )?,
            occurred_at: input.occurred_at.unwrap_or(now),
        })
    }

    fn apply_patch(&mut self, patch: &DebitExpensePatch) -> Result<(), ValidationError> {
        if let Some(category_id) = patch.category_id {
            self.category_id = category_id;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(description) = &patch.description {
            self.description =
                optional_text("description", description.as_deref(), MAX_DESCRIPTION_LEN)?;
        }
        if let Some(occurred_at) = patch.occurred_at {
            self.occurred_at = occurred_at;
        }
        Ok(())
    }
}

// =========================================================================
// Transference
// =========================================================================

/// Transference payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferenceTransaction {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: Amount,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl TransferenceTransaction {
    /// Whether `user_id` is the sender or the receiver
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

/// Input for recording a transference
#[derive(Debug, Clone)]
pub struct NewTransference {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: Amount,
    pub description: Option<String>,
    /// Defaults to the creation time
    pub occurred_at: Option<DateTime<Utc>>,
}

impl NewTransference {
    pub fn new(sender_id: Uuid, receiver_id: Uuid, amount: Amount) -> Self {
        Self {
            sender_id,
            receiver_id,
            amount,
            description: None,
            occurred_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Changes to a transference. The parties never change.
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default)]
pub struct TransferencePatch {
    pub amount: Option<Amount>,
    pub description: Option<Option<String>>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl Patch for TransferencePatch {
    fn is_empty(&self) -> bool {
        self.amount.is_none() && self.description.is_none() && self.occurred_at.is_none()
    }
}

impl Record for TransferenceTransaction {
    type Create = NewTransference;
    type Update = TransferencePatch;

    const COLLECTION: &'static str = "transference_transactions";

    fn from_create(input: NewTransference, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        if input.sender_id == input.receiver_id {
            return Err(ValidationError::SameUserTransference);
        }

        Ok(Self {
            sender_id: input.sender_id,
            receiver_id: input.receiver_id,
            amount: input.amount,
            description: optional_text(
                "description",
                input.description.as_deref(),
                MAX_DESCRIPTION_LEN,
            )?,
            occurred_at: input.occurred_at.unwrap_or(now),
        })
    }

    fn apply_patch(&mut self, patch: &TransferencePatch) -> Result<(), ValidationError> {
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(description) = &patch.description {
            self.description =
                optional_text("description", description.as_deref(), MAX_DESCRIPTION_LEN)?;
        }
        if let Some(occurred_at) = patch.occurred_at {
            self.occurred_at = occurred_at;
        }
        Ok(())
    }
}
