//! Entity wrapper
//!
//! Every persisted domain object is an `Entity<T>`: an identifier assigned
//! once at creation, creation/update timestamps, and a payload `T` that
//! carries the domain fields.

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

use super::ValidationError;

/// A partial update. Every field left as `None` is untouched.
pub trait Patch: Debug + Clone + Default + Send + Sync {
    /// True when applying this patch would change nothing
    fn is_empty(&self) -> bool;
}

/// Payload type of an entity.
///
/// Ties the payload to its create-shape, its update-shape and the
/// collection it is stored in.
pub trait Record: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Minimal input required to build a new payload
    type Create: Send;

    /// Fields that may change after creation
    type Update: Patch;

    /// Name of the backing collection (table name in PostgreSQL)
    const COLLECTION: &'static str;

    /// Validate and default create input into a payload.
    fn from_create(input: Self::Create, now: DateTime<Utc>) -> Result<Self, ValidationError>;

    /// Validate and apply a non-empty patch in place.
    fn apply_patch(&mut self, patch: &Self::Update) -> Result<(), ValidationError>;

    /// Serialized fields that must be unique across the collection
    fn unique_keys(&self) -> Vec<(&'static str, &str)> {
        Vec::new()
    }
}

/// Domain object with a stable identity.
///
/// Equality compares identifiers only; compare `data()` for field equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Record")]
pub struct Entity<T: Record> {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    data: T,
}

impl<T: Record> Entity<T> {
    /// Build a new entity from create input, generating its identifier.
    pub fn create(input: T::Create) -> Result<Self, ValidationError> {
        // TIMESTAMPTZ keeps microseconds; truncate so snapshots round-trip.
        let now = Utc::now().trunc_subsecs(6);
        let data = T::from_create(input, now)?;
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            data,
        })
    }

    /// Rebuild an entity from a stored snapshot.
    ///
    /// Storage adapters use this; it performs no validation.
    pub fn restore(
        id: Uuid,
        data: T,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            created_at,
            updated_at,
            data,
        }
    }

    /// Apply a patch in memory. Returns `false` for an empty patch.
    ///
    /// On a validation failure the entity is left unchanged.
    pub fn apply(&mut self, patch: &T::Update) -> Result<bool, ValidationError> {
        if patch.is_empty() {
            return Ok(false);
        }

        let mut data = self.data.clone();
        data.apply_patch(patch)?;
        self.data = data;
        self.updated_at = Utc::now().trunc_subsecs(6).max(self.updated_at);
        Ok(true)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl<T: Record> PartialEq for Entity<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: Record> Eq for Entity<T> {}
