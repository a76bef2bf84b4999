//! Argon2id password hasher adapter

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier as _, Version};
use rand::rngs::OsRng;
use rand::RngCore;

use super::{GatewayError, PasswordHasher};

const SALT_LEN: usize = 16;

/// Argon2id hasher producing PHC-format digests.
///
/// Digests embed their own parameters, so digests made with other cost
/// settings still verify.
#[derive(Clone)]
pub struct Argon2PasswordHasher {
    argon2: Argon2<'static>,
}

impl Argon2PasswordHasher {
    /// Hasher with the argon2 crate's recommended parameters
    pub fn new() -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default()),
        }
    }

    /// Hasher with explicit cost parameters (memory in KiB)
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, GatewayError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| GatewayError::Hashing(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plaintext: &str) -> Result<String, GatewayError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| GatewayError::Hashing(e.to_string()))?;

        let digest = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| GatewayError::Hashing(e.to_string()))?;

        Ok(digest.to_string())
    }

    fn matches(&self, plaintext: &str, digest: &str) -> Result<bool, GatewayError> {
        let parsed = PasswordHash::new(digest)
            .map_err(|e| GatewayError::MalformedDigest(e.to_string()))?;

        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(GatewayError::Hashing(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Argon2PasswordHasher {
        // Cheap parameters keep the tests fast
        Argon2PasswordHasher::with_params(1024, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_and_match() {
        let hasher = hasher();
        let digest = hasher.hash("correct horse").unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.matches("correct horse", &digest).unwrap());
        assert!(!hasher.matches("battery staple", &digest).unwrap());
    }

    #[test]
    fn test_same_password_gets_fresh_salt() {
        let hasher = hasher();
        let first = hasher.hash("secret").unwrap();
        let second = hasher.hash("secret").unwrap();

        assert_ne!(first, second);
        assert!(hasher.matches("secret", &second).unwrap());
    }

    #[test]
    fn test_digest_from_other_params_still_verifies() {
        let digest = hasher().hash("secret").unwrap();
        let stronger = Argon2PasswordHasher::with_params(2048, 2, 1).unwrap();
        assert!(stronger.matches("secret", &digest).unwrap());
    }

    #[test]
    fn test_malformed_digest_is_error() {
        let result = hasher().matches("secret", "not-a-phc-string");
        assert!(matches!(result, Err(GatewayError::MalformedDigest(_))));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(Argon2PasswordHasher::with_params(1024, 0, 1).is_err());
    }
}
