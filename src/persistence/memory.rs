//! In-memory backend
//!
//! A process-local stand-in for the relational store, used by tests and
//! local tooling. Entities are kept as serialized snapshots, exactly as the
//! PostgreSQL backend keeps them.
//!
//! Isolation: an active unit of work holds the store lock until it commits
//! or rolls back, so transactions are serialized. Operations outside a unit
//! wait for any open transaction to finish. Do not use a standalone
//! repository from the same task that has a unit of work open on the same
//! store; it would wait for itself.

use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    normalize_email, DebitExpenseTransaction, Entity, Patch, Record, Session,
    TransactionCategory, TransferenceTransaction, User,
};

use super::repository::{
    CategoryRepository, DebitExpenseRepository, Repository, SessionRepository,
    TransferenceRepository, UserRepository,
};
use super::row::{list_order, EntityRow};
use super::scope::TransactionScope;
use super::{PersistenceError, ScopeGuard, UnitOfWork};

type Collection = HashMap<Uuid, EntityRow>;

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    collections: HashMap<&'static str, Collection>,
}

impl Tables {
    fn collection(&self, name: &'static str) -> Option<&Collection> {
        self.collections.get(name)
    }

    fn collection_mut(&mut self, name: &'static str) -> &mut Collection {
        self.collections.entry(name).or_default()
    }
}

/// Reject `entity` if another row already holds one of its unique values
fn check_unique<T: Record>(
    rows: &Collection,
    entity: &Entity<T>,
) -> Result<(), PersistenceError> {
    for (field, value) in entity.data().unique_keys() {
        let taken = rows.iter().any(|(id, row)| {
            *id != entity.id()
                && row.data.get(field).and_then(serde_json::Value::as_str) == Some(value)
        });
        if taken {
            return Err(PersistenceError::unique_violation(T::COLLECTION, field));
        }
    }
    Ok(())
}

/// Open in-memory transaction: the held store lock plus a rollback snapshot
pub(crate) struct MemoryTx {
    tables: OwnedMutexGuard<Tables>,
    snapshot: Option<Tables>,
}

impl MemoryTx {
    fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        // Anything but an explicit commit restores the snapshot.
        if let Some(snapshot) = self.snapshot.take() {
            *self.tables = snapshot;
        }
    }
}

/// Shared in-process store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new, idle unit of work over this store
    pub fn unit_of_work(&self) -> InMemoryUnitOfWork {
        InMemoryUnitOfWork::new(self.clone())
    }

    /// A standalone repository that always autocommits
    pub fn repository<T: Record>(&self) -> MemoryRepository<T> {
        MemoryRepository::new(self.clone(), TransactionScope::new())
    }

    /// Number of committed entities in a collection
    pub async fn count(&self, collection: &'static str) -> usize {
        self.tables
            .lock()
            .await
            .collection(collection)
            .map_or(0, HashMap::len)
    }
}

// =========================================================================
// Repository
// =========================================================================

/// Repository over one collection of an `InMemoryStore`
pub struct MemoryRepository<T> {
    store: InMemoryStore,
    scope: TransactionScope<MemoryTx>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> MemoryRepository<T> {
    fn new(store: InMemoryStore, scope: TransactionScope<MemoryTx>) -> Self {
        Self {
            store,
            scope,
            _record: PhantomData,
        }
    }

    /// Run `f` against the open transaction's tables, or the store's.
    async fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut open = self.scope.lock().await;
        if let Some(tx) = open.as_mut() {
            return f(&mut *tx.tables);
        }

        let mut tables = self.store.tables.lock().await;
        f(&mut *tables)
    }

    /// Every entity of the collection matching `predicate`, in list order
    async fn find_where(
        &self,
        predicate: impl Fn(&T) -> bool + Send,
    ) -> Result<Vec<Entity<T>>, PersistenceError> {
        let rows: Vec<EntityRow> = self
            .with_tables(|tables| {
                tables
                    .collection(T::COLLECTION)
                    .map(|rows| rows.values().cloned().collect())
                    .unwrap_or_default()
            })
            .await;

        let mut found = Vec::new();
        for row in rows {
            let entity = row.into_entity::<T>()?;
            if predicate(entity.data()) {
                found.push(entity);
            }
        }
        found.sort_by(list_order);
        Ok(found)
    }

    async fn find_first_where(
        &self,
        predicate: impl Fn(&T) -> bool + Send,
    ) -> Result<Option<Entity<T>>, PersistenceError> {
        Ok(self.find_where(predicate).await?.into_iter().next())
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn create(&self, entity: &Entity<T>) -> Result<(), PersistenceError> {
        let row = EntityRow::from_entity(entity)?;
        let id = row.id;

        self.with_tables(|tables| -> Result<(), PersistenceError> {
            let rows = tables.collection_mut(T::COLLECTION);
            if rows.contains_key(&id) {
                return Err(PersistenceError::conflict(T::COLLECTION, id));
            }
            check_unique(rows, entity)?;
            rows.insert(id, row);
            Ok(())
        })
        .await?;

        tracing::debug!("Created {} {}", T::COLLECTION, id);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Entity<T>>, PersistenceError> {
        let row = self
            .with_tables(|tables| {
                tables
                    .collection(T::COLLECTION)
                    .and_then(|rows| rows.get(&id).cloned())
            })
            .await;

        row.map(EntityRow::into_entity::<T>).transpose()
    }

    async fn update(&self, id: Uuid, patch: &T::Update) -> Result<(), PersistenceError> {
        self.with_tables(|tables| -> Result<(), PersistenceError> {
            let rows = tables.collection_mut(T::COLLECTION);
            let row = rows
                .get(&id)
                .cloned()
                .ok_or_else(|| PersistenceError::not_found(T::COLLECTION, id))?;

            if patch.is_empty() {
                return Ok(());
            }

            let mut entity = row.into_entity::<T>()?;
            entity.apply(patch)?;
            check_unique(rows, &entity)?;
            rows.insert(id, EntityRow::from_entity(&entity)?);
            Ok(())
        })
        .await?;

        tracing::debug!("Updated {} {}", T::COLLECTION, id);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), PersistenceError> {
        self.with_tables(|tables| {
            tables
                .collection_mut(T::COLLECTION)
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| PersistenceError::not_found(T::COLLECTION, id))
        })
        .await?;

        tracing::debug!("Deleted {} {}", T::COLLECTION, id);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryRepository<User> {
    async fn find_by_email(&self, email: &str) -> Result<Option<Entity<User>>, PersistenceError> {
        let Ok(email) = normalize_email(email) else {
            return Ok(None);
        };
        self.find_first_where(move |user| user.email == email).await
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository<Session> {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<Session>>, PersistenceError> {
        self.find_where(move |session| session.user_id == user_id).await
    }

    async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Entity<Session>>, PersistenceError> {
        let token_hash = Session::hash_token(token);
        self.find_first_where(move |session| session.token_hash == token_hash)
            .await
    }

    async fn delete_by_user_id(&self, user_id: Uuid) -> Result<u64, PersistenceError> {
        let removed = self
            .with_tables(|tables| {
                let rows = tables.collection_mut(Session::COLLECTION);
                let mut doomed = Vec::new();
                for row in rows.values() {
                    let session = row.clone().into_entity::<Session>()?;
                    if session.data().user_id == user_id {
                        doomed.push(session.id());
                    }
                }
                for id in &doomed {
                    rows.remove(id);
                }
                Ok::<_, PersistenceError>(doomed.len() as u64)
            })
            .await?;

        tracing::debug!("Deleted {} sessions of user {}", removed, user_id);
        Ok(removed)
    }
}

#[async_trait]
impl CategoryRepository for MemoryRepository<TransactionCategory> {
    async fn find_visible_to(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<TransactionCategory>>, PersistenceError> {
        self.find_where(move |category| category.is_visible_to(user_id))
            .await
    }
}

#[async_trait]
impl DebitExpenseRepository for MemoryRepository<DebitExpenseTransaction> {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<DebitExpenseTransaction>>, PersistenceError> {
        self.find_where(move |expense| expense.user_id == user_id).await
    }

    async fn find_by_category_id(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<Entity<DebitExpenseTransaction>>, PersistenceError> {
        self.find_where(move |expense| expense.category_id == category_id)
            .await
    }
}

#[async_trait]
impl TransferenceRepository for MemoryRepository<TransferenceTransaction> {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<TransferenceTransaction>>, PersistenceError> {
        self.find_where(move |transference| transference.involves(user_id))
            .await
    }
}

// =========================================================================
// Unit of Work
// =========================================================================

/// Unit of work over an `InMemoryStore`
pub struct InMemoryUnitOfWork {
    store: InMemoryStore,
    scope: TransactionScope<MemoryTx>,
    users: MemoryRepository<User>,
    sessions: MemoryRepository<Session>,
    categories: MemoryRepository<TransactionCategory>,
    debit_expenses: MemoryRepository<DebitExpenseTransaction>,
    transferences: MemoryRepository<TransferenceTransaction>,
}

impl InMemoryUnitOfWork {
    pub fn new(store: InMemoryStore) -> Self {
        let scope = TransactionScope::new();
        Self {
            users: MemoryRepository::new(store.clone(), scope.clone()),
            sessions: MemoryRepository::new(store.clone(), scope.clone()),
            categories: MemoryRepository::new(store.clone(), scope.clone()),
            debit_expenses: MemoryRepository::new(store.clone(), scope.clone()),
            transferences: MemoryRepository::new(store.clone(), scope.clone()),
            store,
            scope,
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn users(&self) -> &dyn UserRepository {
        &self.users
    }

    fn sessions(&self) -> &dyn SessionRepository {
        &self.sessions
    }

    fn categories(&self) -> &dyn CategoryRepository {
        &self.categories
    }

    fn debit_expenses(&self) -> &dyn DebitExpenseRepository {
        &self.debit_expenses
    }

    fn transferences(&self) -> &dyn TransferenceRepository {
        &self.transferences
    }

    async fn begin(&mut self) -> Result<(), PersistenceError> {
        let mut open = self.scope.lock().await;
        if open.is_some() {
            return Err(PersistenceError::TransactionAlreadyActive);
        }

        let tables = Arc::clone(&self.store.tables).lock_owned().await;
        let snapshot = tables.clone();
        *open = Some(MemoryTx {
            tables,
            snapshot: Some(snapshot),
        });

        tracing::debug!("In-memory transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PersistenceError> {
        let tx = self
            .scope
            .lock()
            .await
            .take()
            .ok_or(PersistenceError::NoActiveTransaction)?;
        tx.commit();

        tracing::info!("In-memory transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PersistenceError> {
        let tx = self
            .scope
            .lock()
            .await
            .take()
            .ok_or(PersistenceError::NoActiveTransaction)?;
        drop(tx);

        tracing::warn!("In-memory transaction rolled back");
        Ok(())
    }

    async fn is_active(&self) -> bool {
        self.scope.is_active().await
    }

    fn release_guard(&self) -> ScopeGuard {
        self.scope.release_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategoryPatch, NewCategory, NewSession};

    #[tokio::test]
    async fn test_standalone_repository_autocommits() {
        let store = InMemoryStore::new();
        let repo = store.repository::<TransactionCategory>();
        let category = Entity::create(NewCategory::global("Food")).unwrap();

        repo.create(&category).await.unwrap();
        assert_eq!(store.count(TransactionCategory::COLLECTION).await, 1);
    }

    #[tokio::test]
    async fn test_stored_snapshot_is_detached_from_caller() {
        let store = InMemoryStore::new();
        let repo = store.repository::<TransactionCategory>();
        let mut category = Entity::create(NewCategory::global("Food")).unwrap();
        repo.create(&category).await.unwrap();

        category
            .apply(&CategoryPatch {
                name: Some("Changed locally".to_string()),
            })
            .unwrap();

        let stored = repo.find_by_id(category.id()).await.unwrap().unwrap();
        assert_eq!(stored.data().name, "Food");
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded_on_drop() {
        let store = InMemoryStore::new();
        let session = Entity::create(NewSession::new(Uuid::new_v4(), "tok")).unwrap();

        {
            let mut uow = store.unit_of_work();
            uow.begin().await.unwrap();
            uow.sessions().create(&session).await.unwrap();
            assert!(uow.is_active().await);
        }

        assert_eq!(store.count(Session::COLLECTION).await, 0);
    }

    #[tokio::test]
    async fn test_delete_sessions_by_user() {
        let store = InMemoryStore::new();
        let repo = store.repository::<Session>();
        let user_id = Uuid::new_v4();

        for token in ["a", "b"] {
            let session = Entity::create(NewSession::new(user_id, token)).unwrap();
            repo.create(&session).await.unwrap();
        }
        let other = Entity::create(NewSession::new(Uuid::new_v4(), "c")).unwrap();
        repo.create(&other).await.unwrap();

        assert_eq!(repo.delete_by_user_id(user_id).await.unwrap(), 2);
        assert!(repo.find_by_user_id(user_id).await.unwrap().is_empty());
        assert!(repo.find_by_token("c").await.unwrap().is_some());
    }
}
