//! finance_tracker Library
//!
//! Personal finance persistence core: typed entities, repositories and a
//! unit of work over PostgreSQL or an in-memory store.

pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod gateway;
pub mod handlers;
pub mod persistence;
pub mod telemetry;

pub use config::Config;
pub use domain::{Amount, AmountError, Entity, Record, ValidationError};
pub use error::{AppError, AppResult};
pub use persistence::{transaction, PersistenceError, UnitOfWork};
