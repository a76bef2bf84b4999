//! Common test utilities
//!
//! Scenarios are generic over the unit of work so both backends run the
//! same checks.

#![allow(dead_code)]

use std::time::Duration;

use finance_tracker::db;
use finance_tracker::domain::{
    Amount, CategoryPatch, Entity, NewCategory, NewDebitExpense, NewSession, NewTransference,
    NewUser, Session, TransactionCategory, User, UserPatch,
};
use finance_tracker::persistence::{transaction, PersistenceError, UnitOfWork};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to the test database, or `None` when `DATABASE_URL` is unset
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    // Tests run in parallel; serialize schema creation
    let mut tx = pool.begin().await.expect("Failed to begin transaction");
    sqlx::query("SELECT pg_advisory_xact_lock(20240601)")
        .execute(&mut *tx)
        .await
        .expect("Failed to take schema lock");
    for statement in db::schema_statements() {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .expect("Failed to apply schema");
    }
    tx.commit().await.expect("Failed to commit schema");

    Some(pool)
}

pub fn new_user(name: &str) -> Entity<User> {
    Entity::create(NewUser {
        name: name.to_string(),
        email: format!("{}@example.com", Uuid::new_v4().simple()),
        password_hash: "$argon2id$test".to_string(),
    })
    .unwrap()
}

fn amount(raw: &str) -> Amount {
    raw.parse().unwrap()
}

// =========================================================================
// CRUD
// =========================================================================

pub async fn crud_round_trip<U: UnitOfWork>(uow: &mut U) {
    let user = new_user("Alice");
    let id = user.id();

    uow.users().create(&user).await.unwrap();
    let loaded = uow.users().find_by_id(id).await.unwrap().unwrap();
    assert_eq!(loaded.data(), user.data());
    assert_eq!(loaded.created_at(), user.created_at());

    let by_email = uow
        .users()
        .find_by_email(&user.data().email.to_uppercase())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id(), id);

    uow.users()
        .update(
            id,
            &UserPatch {
                name: Some("Alice Liddell".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let updated = uow.users().find_by_id(id).await.unwrap().unwrap();
    assert_eq!(updated.data().name, "Alice Liddell");
    assert_eq!(updated.data().email, user.data().email);
    assert!(updated.updated_at() >= user.updated_at());

    uow.users().delete(id).await.unwrap();
    assert!(uow.users().find_by_id(id).await.unwrap().is_none());
}

pub async fn conflict_and_not_found<U: UnitOfWork>(uow: &mut U) {
    let user = new_user("Bob");
    uow.users().create(&user).await.unwrap();

    let err = uow.users().create(&user).await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");

    let missing = Uuid::new_v4();
    assert!(uow.users().find_by_id(missing).await.unwrap().is_none());

    let err = uow
        .users()
        .update(
            missing,
            &UserPatch {
                name: Some("Nobody".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "expected not found, got {err:?}");

    let err = uow.users().delete(missing).await.unwrap_err();
    assert!(err.is_not_found(), "expected not found, got {err:?}");
}

pub async fn invalid_patch_is_rejected<U: UnitOfWork>(uow: &mut U) {
    let user = new_user("Carol");
    uow.users().create(&user).await.unwrap();

    let err = uow
        .users()
        .update(
            user.id(),
            &UserPatch {
                email: Some("not-an-email".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Validation(_)));

    let stored = uow.users().find_by_id(user.id()).await.unwrap().unwrap();
    assert_eq!(stored.data().email, user.data().email);
}

pub async fn unique_fields_are_enforced<U: UnitOfWork>(uow: &mut U) {
    let first = new_user("Ivan");
    uow.users().create(&first).await.unwrap();
    let email = first.data().email.clone();

    let twin = Entity::<User>::create(NewUser {
        name: "Twin".to_string(),
        email: email.to_uppercase(),
        password_hash: "$argon2id$test".to_string(),
    })
    .unwrap();
    let err = uow.users().create(&twin).await.unwrap_err();
    assert!(
        matches!(
            err,
            PersistenceError::UniqueViolation {
                collection: "users",
                field: "email"
            }
        ),
        "expected unique violation, got {err:?}"
    );
    assert!(uow.users().find_by_id(twin.id()).await.unwrap().is_none());

    let other = new_user("Judy");
    uow.users().create(&other).await.unwrap();
    let err = uow
        .users()
        .update(
            other.id(),
            &UserPatch {
                email: Some(email.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "expected unique violation, got {err:?}");
    let unchanged = uow.users().find_by_id(other.id()).await.unwrap().unwrap();
    assert_eq!(unchanged.data().email, other.data().email);

    // Writing back a user's own email is not a violation
    uow.users()
        .update(
            first.id(),
            &UserPatch {
                email: Some(email),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let token = Uuid::new_v4().to_string();
    let session = Entity::<Session>::create(NewSession::new(first.id(), token.clone())).unwrap();
    let clash = Entity::<Session>::create(NewSession::new(other.id(), token)).unwrap();
    uow.sessions().create(&session).await.unwrap();
    let err = uow.sessions().create(&clash).await.unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::UniqueViolation {
            collection: "sessions",
            field: "token_hash"
        }
    ));
}

// =========================================================================
// Queries
// =========================================================================

pub async fn category_visibility<U: UnitOfWork>(uow: &mut U) {
    let owner = Uuid::new_v4();
    let global = Entity::<TransactionCategory>::create(NewCategory::global("Groceries")).unwrap();
    let own = Entity::create(NewCategory::owned_by(owner, "Board games")).unwrap();
    let foreign = Entity::create(NewCategory::owned_by(Uuid::new_v4(), "Sailing")).unwrap();
    for category in [&global, &own, &foreign] {
        uow.categories().create(category).await.unwrap();
    }

    let visible: Vec<Uuid> = uow
        .categories()
        .find_visible_to(owner)
        .await
        .unwrap()
        .iter()
        .map(Entity::id)
        .collect();
    assert!(visible.contains(&global.id()));
    assert!(visible.contains(&own.id()));
    assert!(!visible.contains(&foreign.id()));
}

pub async fn transaction_queries<U: UnitOfWork>(uow: &mut U) {
    let alice = new_user("Alice");
    let bob = new_user("Bob");
    uow.users().create(&alice).await.unwrap();
    uow.users().create(&bob).await.unwrap();

    let category = Entity::<TransactionCategory>::create(NewCategory::global("Rent")).unwrap();
    uow.categories().create(&category).await.unwrap();

    let first = Entity::create(
        NewDebitExpense::new(alice.id(), category.id(), amount("800")).with_description("June"),
    )
    .unwrap();
    let second = Entity::create(NewDebitExpense::new(alice.id(), category.id(), amount("800.00")))
        .unwrap();
    uow.debit_expenses().create(&first).await.unwrap();
    uow.debit_expenses().create(&second).await.unwrap();

    let by_user = uow.debit_expenses().find_by_user_id(alice.id()).await.unwrap();
    assert_eq!(by_user.len(), 2);
    let by_category = uow
        .debit_expenses()
        .find_by_category_id(category.id())
        .await
        .unwrap();
    assert_eq!(by_category.len(), 2);
    assert!(uow
        .debit_expenses()
        .find_by_user_id(bob.id())
        .await
        .unwrap()
        .is_empty());

    let sent = Entity::create(NewTransference::new(alice.id(), bob.id(), amount("25.50"))).unwrap();
    let received = Entity::create(NewTransference::new(bob.id(), alice.id(), amount("3"))).unwrap();
    uow.transferences().create(&sent).await.unwrap();
    uow.transferences().create(&received).await.unwrap();

    for user in [&alice, &bob] {
        let involved = uow.transferences().find_by_user_id(user.id()).await.unwrap();
        assert_eq!(involved.len(), 2);
        assert!(involved.iter().all(|t| t.data().involves(user.id())));
    }

    let stored = uow.transferences().find_by_id(sent.id()).await.unwrap().unwrap();
    assert_eq!(stored.data().amount.to_string(), "25.50");
}

// =========================================================================
// Unit of work
// =========================================================================

pub async fn state_errors<U: UnitOfWork>(uow: &mut U) {
    assert!(!uow.is_active().await);
    assert!(matches!(
        uow.commit().await,
        Err(PersistenceError::NoActiveTransaction)
    ));
    assert!(matches!(
        uow.rollback().await,
        Err(PersistenceError::NoActiveTransaction)
    ));

    uow.begin().await.unwrap();
    assert!(uow.is_active().await);
    assert!(matches!(
        uow.begin().await,
        Err(PersistenceError::TransactionAlreadyActive)
    ));
    // A failed begin leaves the open transaction usable
    assert!(uow.is_active().await);

    uow.rollback().await.unwrap();
    assert!(!uow.is_active().await);
}

pub async fn commit_persists<U: UnitOfWork>(uow: &mut U) {
    let user = new_user("Dave");
    let id = user.id();

    let created = transaction(uow, move |uow| {
        Box::pin(async move {
            uow.users().create(&user).await?;
            Ok::<_, PersistenceError>(user.id())
        })
    })
    .await
    .unwrap();

    assert_eq!(created, id);
    assert!(!uow.is_active().await);
    assert!(uow.users().find_by_id(id).await.unwrap().is_some());
}

pub async fn failed_work_rolls_back<U: UnitOfWork>(uow: &mut U) {
    let existing = new_user("Erin");
    uow.users().create(&existing).await.unwrap();

    let fresh = new_user("Frank");
    let fresh_id = fresh.id();
    let existing_id = existing.id();
    let missing = Uuid::new_v4();

    let err = transaction(uow, move |uow| {
        Box::pin(async move {
            uow.users().create(&fresh).await?;
            uow.users()
                .update(
                    existing_id,
                    &UserPatch {
                        name: Some("Renamed".to_string()),
                        ..Default::default()
                    },
                )
                .await?;
            uow.categories()
                .update(
                    missing,
                    &CategoryPatch {
                        name: Some("Ghost".to_string()),
                    },
                )
                .await?;
            Ok::<_, PersistenceError>(())
        })
    })
    .await
    .unwrap_err();

    assert!(err.is_not_found());
    assert!(!uow.is_active().await);
    assert!(uow.users().find_by_id(fresh_id).await.unwrap().is_none());
    let unchanged = uow.users().find_by_id(existing_id).await.unwrap().unwrap();
    assert_eq!(unchanged.data().name, "Erin");
}

pub async fn cancelled_work_rolls_back<U: UnitOfWork>(uow: &mut U) {
    let user = new_user("Grace");
    let id = user.id();

    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        transaction(uow, move |uow| {
            Box::pin(async move {
                uow.users().create(&user).await?;
                std::future::pending::<()>().await;
                Ok::<_, PersistenceError>(())
            })
        }),
    )
    .await;

    assert!(outcome.is_err(), "work should have been cancelled");
    assert!(!uow.is_active().await);
    assert!(uow.users().find_by_id(id).await.unwrap().is_none());

    // The unit is reusable afterwards
    commit_persists(uow).await;
}

// =========================================================================
// Concurrency
// =========================================================================

pub async fn concurrent_disjoint_transactions<U, F>(make_uow: F)
where
    U: UnitOfWork + 'static,
    F: Fn() -> U,
{
    let mut handles = Vec::new();
    for i in 0..8 {
        let mut uow = make_uow();
        handles.push(tokio::spawn(async move {
            let user = new_user(&format!("Worker {i}"));
            transaction(&mut uow, move |uow| {
                Box::pin(async move {
                    uow.users().create(&user).await?;
                    Ok::<_, PersistenceError>(user.id())
                })
            })
            .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }

    let uow = make_uow();
    for id in ids {
        assert!(uow.users().find_by_id(id).await.unwrap().is_some());
    }
}

pub async fn concurrent_updates_same_entity<U, F>(make_uow: F)
where
    U: UnitOfWork + 'static,
    F: Fn() -> U,
{
    let category = Entity::<TransactionCategory>::create(NewCategory::global("Shared")).unwrap();
    let id = category.id();
    make_uow().categories().create(&category).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let mut uow = make_uow();
        handles.push(tokio::spawn(async move {
            let name = format!("Writer {i}");
            transaction(&mut uow, move |uow| {
                Box::pin(async move {
                    uow.categories()
                        .update(
                            id,
                            &CategoryPatch {
                                name: Some(name.clone()),
                            },
                        )
                        .await?;
                    tokio::task::yield_now().await;
                    // No other writer interleaves before commit
                    let seen = uow.categories().find_by_id(id).await?;
                    assert_eq!(seen.map(|c| c.data().name.clone()), Some(name));
                    Ok::<_, PersistenceError>(())
                })
            })
            .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = make_uow().categories().find_by_id(id).await.unwrap().unwrap();
    assert!(stored.data().name.starts_with("Writer "));
}
