//! Repository contracts
//!
//! `Repository<T>` is the uniform CRUD contract over one collection.
//! Each entity type narrows it with its own query methods.
//!
//! Policy shared by every implementation:
//! - `create` on an existing id fails with `Conflict`
//! - `find_by_id` on a missing id returns `Ok(None)`
//! - `update` and `delete` on a missing id fail with `NotFound`
//! - list queries are ordered by `created_at`, then id

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    DebitExpenseTransaction, Entity, Record, Session, TransactionCategory,
    TransferenceTransaction, User,
};

use super::PersistenceError;

/// CRUD access to the collection of one entity type
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Persist a new entity snapshot
    async fn create(&self, entity: &Entity<T>) -> Result<(), PersistenceError>;

    /// Load an entity, or `None` if it does not exist
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Entity<T>>, PersistenceError>;

    /// Apply a partial patch to the stored entity
    async fn update(&self, id: Uuid, patch: &T::Update) -> Result<(), PersistenceError>;

    /// Remove the entity
    async fn delete(&self, id: Uuid) -> Result<(), PersistenceError>;
}

#[async_trait]
pub trait UserRepository: Repository<User> {
    /// Lookup by email; the argument is normalized first
    async fn find_by_email(&self, email: &str) -> Result<Option<Entity<User>>, PersistenceError>;
}

#[async_trait]
pub trait SessionRepository: Repository<Session> {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<Session>>, PersistenceError>;

    /// Lookup by plaintext bearer token
    async fn find_by_token(&self, token: &str) -> Result<Option<Entity<Session>>, PersistenceError>;

    /// Remove every session of a user, returning how many were removed
    async fn delete_by_user_id(&self, user_id: Uuid) -> Result<u64, PersistenceError>;
}

#[async_trait]
pub trait CategoryRepository: Repository<TransactionCategory> {
    /// Global categories plus the ones owned by `user_id`
    async fn find_visible_to(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<TransactionCategory>>, PersistenceError>;
}

#[async_trait]
pub trait DebitExpenseRepository: Repository<DebitExpenseTransaction> {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<DebitExpenseTransaction>>, PersistenceError>;

    async fn find_by_category_id(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<Entity<DebitExpenseTransaction>>, PersistenceError>;
}

#[async_trait]
pub trait TransferenceRepository: Repository<TransferenceTransaction> {
    /// Transferences where the user is sender or receiver
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<TransferenceTransaction>>, PersistenceError>;
}
