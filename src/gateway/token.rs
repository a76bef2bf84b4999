//! Random token generator adapter

use rand::rngs::OsRng;
use rand::RngCore;

use super::TokenGenerator;

/// Bearer tokens from the operating system CSPRNG, hex encoded.
///
/// `generate(n)` returns `2 * n` lowercase hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenGenerator;

impl RandomTokenGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self, byte_length: usize) -> String {
        let mut bytes = vec![0u8; byte_length];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
