//! finance_tracker - schema check entry point
//!
//! Connects with the configured database and verifies that every table the
//! repositories need is present.

use finance_tracker::{db, telemetry, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    telemetry::init_tracing();

    tracing::info!("Starting finance_tracker...");

    let config = Config::from_env()?;
    tracing::info!("Environment: {}", config.environment);

    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;
    tracing::info!("Database connected");

    if !db::check_schema(&pool).await? {
        anyhow::bail!(
            "database schema is incomplete; apply migrations/0001_init.sql (tables: {})",
            db::REQUIRED_TABLES.join(", ")
        );
    }

    tracing::info!("Schema ready");
    Ok(())
}
