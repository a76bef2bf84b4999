//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::AmountError;

/// Rejection raised by an entity factory or patch.
///
/// These errors represent malformed input for a domain entity.
/// They are independent of the storage layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A required text field was empty after trimming
    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// A text field exceeded its maximum length
    #[error("Field '{field}' exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// A text field is shorter than its minimum length
    #[error("Field '{field}' must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    /// Email address is not well formed
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// Invalid monetary amount
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),

    /// Sender and receiver of a transference are the same user
    #[error("Cannot transfer to the same user")]
    SameUserTransference,

    /// Session expiry is not in the future
    #[error("Session expiry must be in the future")]
    ExpiryInPast,
}

impl ValidationError {
    /// Name of the offending field, when the error is tied to one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::EmptyField(field)
            | Self::TooLong { field, .. }
            | Self::TooShort { field, .. } => Some(*field),
            Self::InvalidEmail(_) => Some("email"),
            Self::InvalidAmount(_) => Some("amount"),
            Self::SameUserTransference => Some("receiver_id"),
            Self::ExpiryInPast => Some("expires_at"),
        }
    }
}

/// Trim a required text field and enforce a maximum length.
pub(crate) fn required_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blank values become `None`.
pub(crate) fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => required_text(field, text, max).map(Some),
    }
}
