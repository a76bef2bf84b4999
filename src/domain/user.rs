//! User entity
//!
//! Profile and credential digest of an account holder. The password hash is
//! produced by a `PasswordHasher` gateway before the entity is built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::required_text;
use super::{Patch, Record, ValidationError};

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;

/// User payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    /// Lowercased, trimmed email (unique per user)
    pub email: String,
    pub password_hash: String,
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Changes to a user
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl Patch for UserPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.password_hash.is_none()
    }
}

/// Normalize and validate an email address.
///
/// Accepts `local@domain.tld` shapes only; anything else is rejected.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(ValidationError::TooLong {
            field: "email",
            max: MAX_EMAIL_LEN,
        });
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
                && domain
                    .split('.')
                    .filter(|label| !label.is_empty())
                    .count()
                    >= 2
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidEmail(raw.trim().to_string()));
    }
    Ok(email)
}

fn required_hash(value: &str) -> Result<String, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField("password_hash"));
    }
    Ok(value.to_string())
}

impl Record for User {
    type Create = NewUser;
    type Update = UserPatch;

    const COLLECTION: &'static str = "users";

    fn from_create(input: NewUser, _now: DateTime<Utc>) -> Result<Self, ValidationError> {
        Ok(Self {
            name: required_text("name", &input.name, MAX_NAME_LEN)?,
            email: normalize_email(&input.email)?,
            password_hash: required_hash(&input.password_hash)?,
        })
    }

    fn apply_patch(&mut self, patch: &UserPatch) -> Result<(), ValidationError> {
        if let Some(name) = &patch.name {
            self.name = required_text("name", name, MAX_NAME_LEN)?;
        }
        if let Some(email) = &patch.email {
            self.email = normalize_email(email)?;
        }
        if let Some(hash) = &patch.password_hash {
            self.password_hash = required_hash(hash)?;
        }
        Ok(())
    }

    fn unique_keys(&self) -> Vec<(&'static str, &str)> {
        vec![("email", self.email.as_str())]
    }
}
