//! Command Handlers module
//!
//! Use cases built on the unit of work. Each handler validates its command,
//! checks referenced entities and writes inside one transaction.

mod auth_handler;
mod commands;
mod transaction_handler;


pub use auth_handler::{RegisterUserHandler, SessionHandler};
pub use commands::*;
pub use transaction_handler::{RecordExpenseHandler, RecordTransferenceHandler};
