//! Transaction category entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::required_text;
use super::{Patch, Record, ValidationError};

const MAX_NAME_LEN: usize = 60;

/// Category payload
///
/// A category without an owning user is global and visible to everyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCategory {
    pub name: String,
    pub user_id: Option<Uuid>,
}

impl TransactionCategory {
    pub fn is_global(&self) -> bool {
        self.user_id.is_none()
    }

    /// Whether `user_id` may file transactions under this category
    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        self.user_id.map_or(true, |owner| owner == user_id)
    }
}

/// Input for creating a category
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    /// `None` creates a global category
    pub user_id: Option<Uuid>,
}

impl NewCategory {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_id: None,
        }
    }

    pub fn owned_by(user_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_id: Some(user_id),
        }
    }
}

/// Changes to a category. Ownership never changes.
#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub name: Option<String>,
}

impl Patch for CategoryPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none()
    }
}

impl Record for TransactionCategory {
    type Create = NewCategory;
    type Update = CategoryPatch;

    const COLLECTION: &'static str = "transaction_categories";

    fn from_create(input: NewCategory, _now: DateTime<Utc>) -> Result<Self, ValidationError> {
        Ok(Self {
            name: required_text("name", &input.name, MAX_NAME_LEN)?,
            user_id: input.user_id,
        })
    }

    fn apply_patch(&mut self, patch: &CategoryPatch) -> Result<(), ValidationError> {
        if let Some(name) = &patch.name {
            self.name = required_text("name", name, MAX_NAME_LEN)?;
        }
        Ok(())
    }
}
