//! Session entity
//!
//! A login session. Only the SHA-256 digest of the bearer token is kept;
//! the plaintext token is handed to the client once and never stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Patch, Record, ValidationError};

/// Session lifetime when the caller does not choose one
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

/// Session payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    /// Hex-encoded SHA-256 of the bearer token
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Digest a plaintext bearer token the way sessions store it
    pub fn hash_token(token: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Check a plaintext token against this session's digest
    pub fn matches_token(&self, token: &str) -> bool {
        Self::hash_token(token) == self.token_hash
    }
}

/// Input for creating a session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    /// Plaintext bearer token, hashed on creation
    pub token: String,
    /// Defaults to creation time + 30 days
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewSession {
    pub fn new(user_id: Uuid, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(Utc::now() + ttl);
        self
    }
}

/// Changes to a session
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub expires_at: Option<DateTime<Utc>>,
}

impl Patch for SessionPatch {
    fn is_empty(&self) -> bool {
        self.expires_at.is_none()
    }
}

fn future_expiry(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ValidationError> {
    if expires_at <= now {
        return Err(ValidationError::ExpiryInPast);
    }
    Ok(expires_at)
}

impl Record for Session {
    type Create = NewSession;
    type Update = SessionPatch;

    const COLLECTION: &'static str = "sessions";

    fn from_create(input: NewSession, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        if input.token.is_empty() {
            return Err(ValidationError::EmptyField("token"));
        }

        let expires_at = input
            .expires_at
            .unwrap_or_else(|| now + Duration::days(DEFAULT_SESSION_TTL_DAYS));

        Ok(Self {
            user_id: input.user_id,
            token_hash: Self::hash_token(&input.token),
            expires_at: future_expiry(expires_at, now)?,
        })
    }

    fn apply_patch(&mut self, patch: &SessionPatch) -> Result<(), ValidationError> {
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = future_expiry(expires_at, Utc::now())?;
        }
        Ok(())
    }

    fn unique_keys(&self) -> Vec<(&'static str, &str)> {
        vec![("token_hash", self.token_hash.as_str())]
    }
}
