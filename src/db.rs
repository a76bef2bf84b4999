//! Database module
//!
//! Connection pool setup and schema verification.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;
use crate::domain::{
    DebitExpenseTransaction, Record, Session, TransactionCategory, TransferenceTransaction, User,
};

/// Schema for every collection; see also `migrations/`
pub const SCHEMA_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Tables the repositories expect
pub const REQUIRED_TABLES: [&str; 5] = [
    User::COLLECTION,
    Session::COLLECTION,
    TransactionCategory::COLLECTION,
    DebitExpenseTransaction::COLLECTION,
    TransferenceTransaction::COLLECTION,
];

/// Create the connection pool
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    tracing::info!("Schema verified: {} tables present", REQUIRED_TABLES.len());
    Ok(true)
}

/// Individual statements of `SCHEMA_SQL`
pub fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA_SQL
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
}
