//! Transaction Handlers
//!
//! Records expenses and transferences after checking that every referenced
//! entity exists. Checks and insert share one database transaction.

use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{
    Amount, DebitExpenseTransaction, Entity, NewDebitExpense, NewTransference, Record,
    TransactionCategory, TransferenceTransaction, User, ValidationError,
};
use crate::error::{AppError, AppResult};
use crate::persistence::{transaction, PersistenceError, UnitOfWork};

use super::{RecordExpenseCommand, RecordTransferenceCommand};

fn parse_amount(raw: &str) -> AppResult<Amount> {
    Amount::from_str(raw).map_err(|e| AppError::Validation(ValidationError::from(e)))
}

fn missing<T: Record>(id: Uuid) -> AppError {
    PersistenceError::not_found(T::COLLECTION, id).into()
}

// =========================================================================
// RecordExpenseHandler
// =========================================================================

/// Handler for debit expenses
pub struct RecordExpenseHandler;

impl RecordExpenseHandler {
    pub fn new() -> Self {
        Self
    }

    /// Execute the record expense command
    pub async fn execute<U>(
        &self,
        uow: &mut U,
        command: RecordExpenseCommand,
    ) -> AppResult<Entity<DebitExpenseTransaction>>
    where
        U: UnitOfWork + ?Sized,
    {
        let amount = parse_amount(&command.amount)?;

        let mut input = NewDebitExpense::new(command.user_id, command.category_id, amount);
        if let Some(description) = command.description {
            input = input.with_description(description);
        }
        if let Some(at) = command.occurred_at {
            input = input.occurred_at(at);
        }
        let expense = Entity::<DebitExpenseTransaction>::create(input)?;

        let user_id = command.user_id;
        let category_id = command.category_id;
        let expense = transaction(uow, move |uow| {
            Box::pin(async move {
                if uow.users().find_by_id(user_id).await?.is_none() {
                    return Err(missing::<User>(user_id));
                }

                let category = uow
                    .categories()
                    .find_by_id(category_id)
                    .await?
                    .ok_or_else(|| missing::<TransactionCategory>(category_id))?;
                if !category.data().is_visible_to(user_id) {
                    return Err(AppError::CategoryNotVisible {
                        category_id,
                        user_id,
                    });
                }

                uow.debit_expenses().create(&expense).await?;
                Ok(expense)
            })
        })
        .await?;

        tracing::info!(
            "Recorded expense {} of {} for user {}",
            expense.id(),
            expense.data().amount,
            user_id
        );

        Ok(expense)
    }
}

impl Default for RecordExpenseHandler {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// RecordTransferenceHandler
// =========================================================================

/// Handler for transferences between users
pub struct RecordTransferenceHandler;

impl RecordTransferenceHandler {
    pub fn new() -> Self {
        Self
    }

    /// Execute the record transference command
    pub async fn execute<U>(
        &self,
        uow: &mut U,
        command: RecordTransferenceCommand,
    ) -> AppResult<Entity<TransferenceTransaction>>
    where
        U: UnitOfWork + ?Sized,
    {
        let amount = parse_amount(&command.amount)?;

        let mut input = NewTransference::new(command.sender_id, command.receiver_id, amount);
        if let Some(description) = command.description {
            input = input.with_description(description);
        }
        let transference = Entity::<TransferenceTransaction>::create(input)?;

        let sender_id = command.sender_id;
        let receiver_id = command.receiver_id;
        let transference = transaction(uow, move |uow| {
            Box::pin(async move {
                for user_id in [sender_id, receiver_id] {
                    if uow.users().find_by_id(user_id).await?.is_none() {
                        return Err(missing::<User>(user_id));
                    }
                }

                uow.transferences().create(&transference).await?;
                Ok(transference)
            })
        })
        .await?;

        tracing::info!(
            "Recorded transference {}: {} -> {} amount={}",
            transference.id(),
            sender_id,
            receiver_id,
            transference.data().amount
        );

        Ok(transference)
    }
}

impl Default for RecordTransferenceHandler {
    fn default() -> Self {
        Self::new()
    }
}
