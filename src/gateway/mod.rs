//! Gateway module
//!
//! Capability interfaces for cryptographic collaborators. Handlers receive
//! implementations at construction time; tests inject their own doubles.

mod password;
mod token;

pub use password::Argon2PasswordHasher;
pub use token::RandomTokenGenerator;

/// Errors raised by gateway adapters
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Stored password digest is malformed: {0}")]
    MalformedDigest(String),
}

/// One-way password hashing.
///
/// Implementations hold no shared mutable state and must compare digests in
/// constant time.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into a self-describing digest
    fn hash(&self, plaintext: &str) -> Result<String, GatewayError>;

    /// Check a plaintext password against a digest produced by `hash`.
    ///
    /// A wrong password is `Ok(false)`; only unusable digests are errors.
    fn matches(&self, plaintext: &str, digest: &str) -> Result<bool, GatewayError>;
}

/// Source of unpredictable bearer tokens
pub trait TokenGenerator: Send + Sync {
    /// Generate `byte_length` random bytes, encoded as a string
    fn generate(&self, byte_length: usize) -> String;
}
