//! Configuration module
//!
//! Loads configuration from environment variables.

use chrono::Duration;
use std::env;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// Random bytes per session token
    pub session_token_bytes: usize,

    /// Session lifetime in days
    pub session_ttl_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10)?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let session_token_bytes = parse_or("SESSION_TOKEN_BYTES", 32)?;
        if session_token_bytes < 16 {
            return Err(ConfigError::InvalidValue("SESSION_TOKEN_BYTES"));
        }

        let session_ttl_days = parse_or("SESSION_TTL_DAYS", 30)?;
        if session_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue("SESSION_TTL_DAYS"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            session_token_bytes,
            session_ttl_days,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::days(self.session_ttl_days)
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
