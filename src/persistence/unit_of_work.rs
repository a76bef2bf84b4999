//! Unit of Work
//!
//! Groups repository operations into one atomic durability decision.
//!
//! ```text
//! idle --begin()--> active --commit()/rollback()--> idle
//! ```
//!
//! Repositories handed out by a unit run inside its transaction while it is
//! active, and in autocommit mode while it is idle.

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use super::repository::{
    CategoryRepository, DebitExpenseRepository, SessionRepository, TransferenceRepository,
    UserRepository,
};
use super::{PersistenceError, ScopeGuard};

/// Transaction boundary over every entity repository
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn users(&self) -> &dyn UserRepository;

    fn sessions(&self) -> &dyn SessionRepository;

    fn categories(&self) -> &dyn CategoryRepository;

    fn debit_expenses(&self) -> &dyn DebitExpenseRepository;

    fn transferences(&self) -> &dyn TransferenceRepository;

    /// Open a transaction.
    ///
    /// Fails with `TransactionAlreadyActive` if one is open; there is no
    /// implicit nesting.
    async fn begin(&mut self) -> Result<(), PersistenceError>;

    /// Durably apply everything done since `begin`.
    ///
    /// The unit is idle afterwards whatever the outcome. A failure of the
    /// commit itself is reported as `CommitFailed`.
    async fn commit(&mut self) -> Result<(), PersistenceError>;

    /// Discard everything done since `begin`.
    async fn rollback(&mut self) -> Result<(), PersistenceError>;

    async fn is_active(&self) -> bool;

    /// Guard that rolls back and idles the unit if dropped while armed.
    fn release_guard(&self) -> ScopeGuard;
}

/// Run `work` inside a transaction on `uow`.
///
/// Commits when `work` succeeds. When it fails, rolls back and returns the
/// original error. If the returned future is dropped before completion the
/// open transaction is rolled back and the unit returns to idle.
///
/// `work` receives the unit and must only capture owned values:
///
/// ```ignore
/// let user = Entity::<User>::create(input)?;
/// transaction(&mut uow, move |uow| {
///     Box::pin(async move {
///         uow.users().create(&user).await?;
///         Ok::<_, PersistenceError>(user.id())
///     })
/// })
/// .await?;
/// ```
pub async fn transaction<U, F, R, E>(uow: &mut U, work: F) -> Result<R, E>
where
    U: UnitOfWork + ?Sized,
    F: for<'a> FnOnce(&'a mut U) -> BoxFuture<'a, Result<R, E>>,
    E: From<PersistenceError>,
{
    uow.begin().await?;

    // Idle again on every exit path, including cancellation.
    let _release = uow.release_guard();

    match work(uow).await {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::error!(
                    error = %rollback_err,
                    "Rollback after failed work did not complete"
                );
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entity, NewCategory, TransactionCategory};
    use crate::domain::entity::Record;
    use crate::persistence::{InMemoryStore, InMemoryUnitOfWork};
    use uuid::Uuid;

    /// Unit of work whose commit or rollback can be made to fail
    struct FlakyUnitOfWork {
        inner: InMemoryUnitOfWork,
        fail_commit: bool,
        fail_rollback: bool,
    }

    impl FlakyUnitOfWork {
        fn new(store: &InMemoryStore) -> Self {
            Self {
                inner: store.unit_of_work(),
                fail_commit: false,
                fail_rollback: false,
            }
        }
    }

    #[async_trait]
    impl UnitOfWork for FlakyUnitOfWork {
        fn users(&self) -> &dyn UserRepository {
            self.inner.users()
        }

        fn sessions(&self) -> &dyn SessionRepository {
            self.inner.sessions()
        }

        fn categories(&self) -> &dyn CategoryRepository {
            self.inner.categories()
        }

        fn debit_expenses(&self) -> &dyn DebitExpenseRepository {
            self.inner.debit_expenses()
        }

        fn transferences(&self) -> &dyn TransferenceRepository {
            self.inner.transferences()
        }

        async fn begin(&mut self) -> Result<(), PersistenceError> {
            self.inner.begin().await
        }

        async fn commit(&mut self) -> Result<(), PersistenceError> {
            if self.fail_commit {
                // A failed commit still ends the transaction
                self.inner.rollback().await?;
                return Err(PersistenceError::CommitFailed(sqlx::Error::PoolClosed));
            }
            self.inner.commit().await
        }

        async fn rollback(&mut self) -> Result<(), PersistenceError> {
            self.inner.rollback().await?;
            if self.fail_rollback {
                return Err(PersistenceError::Database(sqlx::Error::PoolClosed));
            }
            Ok(())
        }

        async fn is_active(&self) -> bool {
            self.inner.is_active().await
        }

        fn release_guard(&self) -> ScopeGuard {
            self.inner.release_guard()
        }
    }

    fn category() -> Entity<TransactionCategory> {
        Entity::create(NewCategory::global("Travel")).unwrap()
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported() {
        let store = InMemoryStore::new();
        let mut uow = FlakyUnitOfWork::new(&store);
        uow.fail_commit = true;

        let category = category();
        let result = transaction(&mut uow, move |uow| {
            Box::pin(async move {
                uow.categories().create(&category).await?;
                Ok::<_, PersistenceError>(category.id())
            })
        })
        .await;

        assert!(matches!(result, Err(PersistenceError::CommitFailed(_))));
        assert!(!uow.is_active().await);
        assert_eq!(store.count(TransactionCategory::COLLECTION).await, 0);
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_work_error() {
        let store = InMemoryStore::new();
        let mut uow = FlakyUnitOfWork::new(&store);
        uow.fail_rollback = true;

        let category = category();
        let missing = Uuid::new_v4();
        let err = transaction(&mut uow, move |uow| {
            Box::pin(async move {
                uow.categories().create(&category).await?;
                uow.users().delete(missing).await?;
                Ok::<_, PersistenceError>(())
            })
        })
        .await
        .unwrap_err();

        assert!(
            matches!(err, PersistenceError::NotFound { collection: "users", id } if id == missing),
            "work error replaced by {err:?}"
        );
        assert!(!uow.is_active().await);
        assert_eq!(store.count(TransactionCategory::COLLECTION).await, 0);
    }

    #[tokio::test]
    async fn test_successful_work_commits() {
        let store = InMemoryStore::new();
        let mut uow = FlakyUnitOfWork::new(&store);

        let category = category();
        let id = transaction(&mut uow, move |uow| {
            Box::pin(async move {
                uow.categories().create(&category).await?;
                Ok::<_, PersistenceError>(category.id())
            })
        })
        .await
        .unwrap();

        assert!(uow.categories().find_by_id(id).await.unwrap().is_some());
        assert_eq!(store.count(TransactionCategory::COLLECTION).await, 1);
    }
}
