//! Stored row shape shared by the storage backends.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Entity, Record};

use super::PersistenceError;

/// Serialized entity snapshot: `(id, data, created_at, updated_at)`
#[derive(Debug, Clone)]
pub(crate) struct EntityRow {
    pub id: Uuid,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRow {
    pub fn from_entity<T: Record>(entity: &Entity<T>) -> Result<Self, PersistenceError> {
        Ok(Self {
            id: entity.id(),
            data: serde_json::to_value(entity.data())?,
            created_at: entity.created_at(),
            updated_at: entity.updated_at(),
        })
    }

    pub fn into_entity<T: Record>(self) -> Result<Entity<T>, PersistenceError> {
        let data: T = serde_json::from_value(self.data)?;
        Ok(Entity::restore(self.id, data, self.created_at, self.updated_at))
    }
}

type RowTuple = (Uuid, serde_json::Value, DateTime<Utc>, DateTime<Utc>);

impl From<RowTuple> for EntityRow {
    fn from((id, data, created_at, updated_at): RowTuple) -> Self {
        Self {
            id,
            data,
            created_at,
            updated_at,
        }
    }
}

/// Sort key used by every list query
pub(crate) fn list_order<T: Record>(a: &Entity<T>, b: &Entity<T>) -> std::cmp::Ordering {
    a.created_at()
        .cmp(&b.created_at())
        .then_with(|| a.id().cmp(&b.id()))
}
