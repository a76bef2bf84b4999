//! Authentication Handlers
//!
//! Registration, login and session management. Password hashing and token
//! generation go through the injected gateways.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::domain::{Entity, NewSession, NewUser, Session, User, ValidationError};
use crate::error::{AppError, AppResult};
use crate::gateway::{GatewayError, PasswordHasher, TokenGenerator};
use crate::persistence::{transaction, UnitOfWork};

use super::{LoginCommand, LoginResult, RegisterUserCommand, RegisterUserResult};

const MIN_PASSWORD_LEN: usize = 8;

/// Verified in place of a real digest when the email is unknown
const DUMMY_PASSWORD: &str = "not a real password";

// Argon2 is CPU bound; keep it off the async workers.

async fn hash_password(hasher: Arc<dyn PasswordHasher>, password: String) -> AppResult<String> {
    let digest = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| GatewayError::Hashing(e.to_string()))??;
    Ok(digest)
}

async fn verify_password(
    hasher: Arc<dyn PasswordHasher>,
    password: String,
    digest: String,
) -> AppResult<bool> {
    let matched = tokio::task::spawn_blocking(move || hasher.matches(&password, &digest))
        .await
        .map_err(|e| GatewayError::Hashing(e.to_string()))??;
    Ok(matched)
}

// =========================================================================
// RegisterUserHandler
// =========================================================================

/// Handler for user registration
pub struct RegisterUserHandler {
    hasher: Arc<dyn PasswordHasher>,
}

impl RegisterUserHandler {
    pub fn new(hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { hasher }
    }

    /// Execute the register command
    pub async fn execute<U>(
        &self,
        uow: &mut U,
        command: RegisterUserCommand,
    ) -> AppResult<RegisterUserResult>
    where
        U: UnitOfWork + ?Sized,
    {
        if command.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::TooShort {
                field: "password",
                min: MIN_PASSWORD_LEN,
            }
            .into());
        }

        let password_hash = hash_password(self.hasher.clone(), command.password).await?;
        let user = Entity::<User>::create(NewUser {
            name: command.name,
            email: command.email,
            password_hash,
        })?;

        // A concurrent registration can still win between the check and the
        // insert; the unique index reports it as a violation.
        let user = transaction(uow, move |uow| {
            Box::pin(async move {
                let email = user.data().email.clone();
                if uow.users().find_by_email(&email).await?.is_some() {
                    return Err(AppError::EmailTaken(email));
                }
                match uow.users().create(&user).await {
                    Ok(()) => Ok(user),
                    Err(err) if err.is_unique_violation() => Err(AppError::EmailTaken(email)),
                    Err(err) => Err(err.into()),
                }
            })
        })
        .await?;

        tracing::info!("Registered user {}", user.id());

        Ok(RegisterUserResult {
            user_id: user.id(),
            email: user.data().email.clone(),
        })
    }
}

// =========================================================================
// SessionHandler
// =========================================================================

/// Handler for login, authentication and logout
pub struct SessionHandler {
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenGenerator>,
    token_bytes: usize,
    ttl: Duration,
    dummy_digest: OnceCell<String>,
}

impl SessionHandler {
    pub fn new(
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenGenerator>,
        token_bytes: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            hasher,
            tokens,
            token_bytes,
            ttl,
            dummy_digest: OnceCell::new(),
        }
    }

    /// Build from configuration
    pub fn from_config(
        config: &Config,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenGenerator>,
    ) -> Self {
        Self::new(hasher, tokens, config.session_token_bytes, config.session_ttl())
    }

    /// Digest compared against when the email is unknown, so that both
    /// failure paths cost one verification.
    async fn dummy_digest(&self) -> AppResult<String> {
        let digest = self
            .dummy_digest
            .get_or_try_init(|| hash_password(self.hasher.clone(), DUMMY_PASSWORD.to_string()))
            .await?;
        Ok(digest.clone())
    }

    /// Check credentials and open a new session
    pub async fn login<U>(&self, uow: &mut U, command: LoginCommand) -> AppResult<LoginResult>
    where
        U: UnitOfWork + ?Sized,
    {
        let Some(user) = uow.users().find_by_email(&command.email).await? else {
            let digest = self.dummy_digest().await?;
            verify_password(self.hasher.clone(), command.password, digest).await?;
            return Err(AppError::InvalidCredentials);
        };

        let digest = user.data().password_hash.clone();
        if !verify_password(self.hasher.clone(), command.password, digest).await? {
            tracing::warn!("Failed login for user {}", user.id());
            return Err(AppError::InvalidCredentials);
        }

        let token = self.tokens.generate(self.token_bytes);
        let session = Entity::<Session>::create(
            NewSession::new(user.id(), token.clone()).with_ttl(self.ttl),
        )?;
        uow.sessions().create(&session).await?;

        tracing::info!("Opened session {} for user {}", session.id(), user.id());

        Ok(LoginResult {
            session_id: session.id(),
            user_id: user.id(),
            token,
            expires_at: session.data().expires_at,
        })
    }

    /// Resolve a bearer token to its user.
    ///
    /// Expired sessions are removed and reported as `SessionExpired`.
    pub async fn authenticate<U>(&self, uow: &mut U, token: &str) -> AppResult<Entity<User>>
    where
        U: UnitOfWork + ?Sized,
    {
        let session = uow
            .sessions()
            .find_by_token(token)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if session.data().is_expired(Utc::now()) {
            uow.sessions().delete(session.id()).await?;
            return Err(AppError::SessionExpired);
        }

        uow.users()
            .find_by_id(session.data().user_id)
            .await?
            .ok_or(AppError::InvalidCredentials)
    }

    /// Close the session behind a token. Returns `false` if there was none.
    pub async fn logout<U>(&self, uow: &mut U, token: &str) -> AppResult<bool>
    where
        U: UnitOfWork + ?Sized,
    {
        match uow.sessions().find_by_token(token).await? {
            Some(session) => {
                uow.sessions().delete(session.id()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close every session of the token's owner
    pub async fn logout_everywhere<U>(&self, uow: &mut U, token: &str) -> AppResult<u64>
    where
        U: UnitOfWork + ?Sized,
    {
        let user = self.authenticate(uow, token).await?;
        let removed = uow.sessions().delete_by_user_id(user.id()).await?;

        tracing::info!("Closed {} sessions for user {}", removed, user.id());
        Ok(removed)
    }
}
