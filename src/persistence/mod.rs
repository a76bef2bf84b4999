//! Persistence module
//!
//! Repository contracts, the unit of work and the two storage backends:
//! PostgreSQL for production and an in-memory store for tests.

mod error;
pub mod memory;
pub mod postgres;
mod repository;
mod row;
mod scope;
mod unit_of_work;

pub use error::PersistenceError;
pub use memory::{InMemoryStore, InMemoryUnitOfWork, MemoryRepository};
pub use postgres::{PgRepository, PgUnitOfWork};
pub use repository::{
    CategoryRepository, DebitExpenseRepository, Repository, SessionRepository,
    TransferenceRepository, UserRepository,
};
pub use scope::ScopeGuard;
pub use unit_of_work::{transaction, UnitOfWork};
