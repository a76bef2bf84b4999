//! PostgreSQL backend
//!
//! Every collection is a table of `(id UUID PRIMARY KEY, data JSONB,
//! created_at TIMESTAMPTZ, updated_at TIMESTAMPTZ)`; see
//! `migrations/0001_init.sql`.
//!
//! Isolation is PostgreSQL's default (READ COMMITTED). `update` reads the
//! row with `SELECT ... FOR UPDATE`, so concurrent patches to one entity
//! are applied one after the other, never merged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

use crate::domain::{
    normalize_email, DebitExpenseTransaction, Entity, Patch, Record, Session,
    TransactionCategory, TransferenceTransaction, User,
};

use super::repository::{
    CategoryRepository, DebitExpenseRepository, Repository, SessionRepository,
    TransferenceRepository, UserRepository,
};
use super::row::EntityRow;
use super::scope::TransactionScope;
use super::{PersistenceError, ScopeGuard, UnitOfWork};

type PgTransaction = Transaction<'static, Postgres>;

type RowTuple = (Uuid, serde_json::Value, DateTime<Utc>, DateTime<Utc>);

const COLUMNS: &str = "id, data, created_at, updated_at";

/// Translate a unique-index violation on one of the entity's unique fields.
///
/// Indexes are named `{collection}_{field}_idx`; anything else stays a
/// database error.
fn unique_violation<T: Record>(err: sqlx::Error, data: &T) -> PersistenceError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            let constraint = db.constraint().unwrap_or_default();
            for (field, _) in data.unique_keys() {
                if constraint == format!("{}_{field}_idx", T::COLLECTION) {
                    return PersistenceError::unique_violation(T::COLLECTION, field);
                }
            }
        }
    }
    PersistenceError::Database(err)
}

/// Connection a repository call runs on: the open transaction or a pooled
/// autocommit connection.
enum Conn<'a> {
    Tx(&'a mut PgTransaction),
    Pool(PoolConnection<Postgres>),
}

impl Deref for Conn<'_> {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            Conn::Tx(tx) => &***tx,
            Conn::Pool(conn) => &**conn,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            Conn::Tx(tx) => &mut ***tx,
            Conn::Pool(conn) => &mut **conn,
        }
    }
}

// =========================================================================
// Repository
// =========================================================================

/// Repository over one PostgreSQL table
pub struct PgRepository<T> {
    pool: PgPool,
    scope: TransactionScope<PgTransaction>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> PgRepository<T> {
    /// A standalone repository that always autocommits
    pub fn new(pool: PgPool) -> Self {
        Self::scoped(pool, TransactionScope::new())
    }

    fn scoped(pool: PgPool, scope: TransactionScope<PgTransaction>) -> Self {
        Self {
            pool,
            scope,
            _record: PhantomData,
        }
    }

    async fn connection<'g>(
        &self,
        open: &'g mut Option<PgTransaction>,
    ) -> Result<Conn<'g>, PersistenceError> {
        match open.as_mut() {
            Some(tx) => Ok(Conn::Tx(tx)),
            None => Ok(Conn::Pool(self.pool.acquire().await?)),
        }
    }

    async fn fetch_row(
        conn: &mut PgConnection,
        id: Uuid,
        for_update: bool,
    ) -> Result<Option<EntityRow>, PersistenceError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = $1{lock}", T::COLLECTION);

        let row: Option<RowTuple> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(EntityRow::from))
    }

    /// Load, patch and write back one row under a row lock
    async fn update_locked(
        conn: &mut PgConnection,
        id: Uuid,
        patch: &T::Update,
    ) -> Result<(), PersistenceError> {
        let row = Self::fetch_row(&mut *conn, id, true)
            .await?
            .ok_or_else(|| PersistenceError::not_found(T::COLLECTION, id))?;

        if patch.is_empty() {
            return Ok(());
        }

        let mut entity = row.into_entity::<T>()?;
        entity.apply(patch)?;
        let row = EntityRow::from_entity(&entity)?;

        let sql = format!(
            "UPDATE {} SET data = $2, updated_at = $3 WHERE id = $1",
            T::COLLECTION
        );
        sqlx::query(&sql)
            .bind(row.id)
            .bind(&row.data)
            .bind(row.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|err| unique_violation(err, entity.data()))?;

        Ok(())
    }

    /// Entities matching a SQL predicate on `$1`, in list order
    async fn find_where(
        &self,
        predicate: &str,
        value: String,
    ) -> Result<Vec<Entity<T>>, PersistenceError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE {predicate} ORDER BY created_at, id",
            T::COLLECTION
        );

        let mut open = self.scope.lock().await;
        let mut conn = self.connection(&mut open).await?;
        let rows: Vec<RowTuple> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(&mut *conn)
            .await?;

        rows.into_iter()
            .map(|row| EntityRow::from(row).into_entity::<T>())
            .collect()
    }

    async fn find_first_where(
        &self,
        predicate: &str,
        value: String,
    ) -> Result<Option<Entity<T>>, PersistenceError> {
        Ok(self.find_where(predicate, value).await?.into_iter().next())
    }
}

#[async_trait]
impl<T: Record> Repository<T> for PgRepository<T> {
    async fn create(&self, entity: &Entity<T>) -> Result<(), PersistenceError> {
        let row = EntityRow::from_entity(entity)?;
        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING",
            T::COLLECTION
        );

        let mut open = self.scope.lock().await;
        let mut conn = self.connection(&mut open).await?;
        let inserted = sqlx::query(&sql)
            .bind(row.id)
            .bind(&row.data)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|err| unique_violation(err, entity.data()))?
            .rows_affected();

        if inserted == 0 {
            return Err(PersistenceError::conflict(T::COLLECTION, row.id));
        }

        tracing::debug!("Created {} {}", T::COLLECTION, row.id);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Entity<T>>, PersistenceError> {
        let mut open = self.scope.lock().await;
        let mut conn = self.connection(&mut open).await?;

        Self::fetch_row(&mut conn, id, false)
            .await?
            .map(EntityRow::into_entity::<T>)
            .transpose()
    }

    async fn update(&self, id: Uuid, patch: &T::Update) -> Result<(), PersistenceError> {
        let mut open = self.scope.lock().await;
        match open.as_mut() {
            Some(tx) => Self::update_locked(&mut **tx, id, patch).await?,
            None => {
                let mut tx = self.pool.begin().await?;
                Self::update_locked(&mut *tx, id, patch).await?;
                tx.commit().await.map_err(PersistenceError::CommitFailed)?;
            }
        }

        tracing::debug!("Updated {} {}", T::COLLECTION, id);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), PersistenceError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", T::COLLECTION);

        let mut open = self.scope.lock().await;
        let mut conn = self.connection(&mut open).await?;
        let deleted = sqlx::query(&sql)
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(PersistenceError::not_found(T::COLLECTION, id));
        }

        tracing::debug!("Deleted {} {}", T::COLLECTION, id);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgRepository<User> {
    async fn find_by_email(&self, email: &str) -> Result<Option<Entity<User>>, PersistenceError> {
        let Ok(email) = normalize_email(email) else {
            return Ok(None);
        };
        self.find_first_where("data->>'email' = $1", email).await
    }
}

#[async_trait]
impl SessionRepository for PgRepository<Session> {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<Session>>, PersistenceError> {
        self.find_where("data->>'user_id' = $1", user_id.to_string())
            .await
    }

    async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Entity<Session>>, PersistenceError> {
        self.find_first_where("data->>'token_hash' = $1", Session::hash_token(token))
            .await
    }

    async fn delete_by_user_id(&self, user_id: Uuid) -> Result<u64, PersistenceError> {
        let sql = format!("DELETE FROM {} WHERE data->>'user_id' = $1", Session::COLLECTION);

        let mut open = self.scope.lock().await;
        let mut conn = self.connection(&mut open).await?;
        let removed = sqlx::query(&sql)
            .bind(user_id.to_string())
            .execute(&mut *conn)
            .await?
            .rows_affected();

        tracing::debug!("Deleted {} sessions of user {}", removed, user_id);
        Ok(removed)
    }
}

#[async_trait]
impl CategoryRepository for PgRepository<TransactionCategory> {
    async fn find_visible_to(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<TransactionCategory>>, PersistenceError> {
        self.find_where(
            "(data->>'user_id' = $1 OR data->>'user_id' IS NULL)",
            user_id.to_string(),
        )
        .await
    }
}

#[async_trait]
impl DebitExpenseRepository for PgRepository<DebitExpenseTransaction> {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<DebitExpenseTransaction>>, PersistenceError> {
        self.find_where("data->>'user_id' = $1", user_id.to_string())
            .await
    }

    async fn find_by_category_id(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<Entity<DebitExpenseTransaction>>, PersistenceError> {
        self.find_where("data->>'category_id' = $1", category_id.to_string())
            .await
    }
}

#[async_trait]
impl TransferenceRepository for PgRepository<TransferenceTransaction> {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Entity<TransferenceTransaction>>, PersistenceError> {
        self.find_where(
            "(data->>'sender_id' = $1 OR data->>'receiver_id' = $1)",
            user_id.to_string(),
        )
        .await
    }
}

// =========================================================================
// Unit of Work
// =========================================================================

/// Unit of work backed by one `sqlx` transaction at a time
pub struct PgUnitOfWork {
    pool: PgPool,
    scope: TransactionScope<PgTransaction>,
    users: PgRepository<User>,
    sessions: PgRepository<Session>,
    categories: PgRepository<TransactionCategory>,
    debit_expenses: PgRepository<DebitExpenseTransaction>,
    transferences: PgRepository<TransferenceTransaction>,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        let scope = TransactionScope::new();
        Self {
            users: PgRepository::scoped(pool.clone(), scope.clone()),
            sessions: PgRepository::scoped(pool.clone(), scope.clone()),
            categories: PgRepository::scoped(pool.clone(), scope.clone()),
            debit_expenses: PgRepository::scoped(pool.clone(), scope.clone()),
            transferences: PgRepository::scoped(pool.clone(), scope.clone()),
            pool,
            scope,
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
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

        *open = Some(self.pool.begin().await?);
        tracing::debug!("Database transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PersistenceError> {
        let tx = self
            .scope
            .lock()
            .await
            .take()
            .ok_or(PersistenceError::NoActiveTransaction)?;

        tx.commit().await.map_err(PersistenceError::CommitFailed)?;
        tracing::info!("Database transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PersistenceError> {
        let tx = self
            .scope
            .lock()
            .await
            .take()
            .ok_or(PersistenceError::NoActiveTransaction)?;

        tx.rollback().await?;
        tracing::warn!("Database transaction rolled back");
        Ok(())
    }

    async fn is_active(&self) -> bool {
        self.scope.is_active().await
    }

    fn release_guard(&self) -> ScopeGuard {
        self.scope.release_guard()
    }
}
