//! Domain module
//!
//! Entities, their create/update shapes and validation rules.

pub mod amount;
pub mod category;
pub mod entity;
pub mod error;
pub mod session;
pub mod transaction;
pub mod user;

pub use amount::{Amount, AmountError};
pub use category::{CategoryPatch, NewCategory, TransactionCategory};
pub use entity::{Entity, Patch, Record};
pub use error::ValidationError;
pub use session::{NewSession, Session, SessionPatch, DEFAULT_SESSION_TTL_DAYS};
pub use transaction::{
    DebitExpensePatch, DebitExpenseTransaction, NewDebitExpense, NewTransference,
    TransferencePatch, TransferenceTransaction,
};
pub use user::{normalize_email, NewUser, User, UserPatch};
