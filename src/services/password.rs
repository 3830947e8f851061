//! Password hashing with bcrypt
//!
//! The plaintext is first reduced to base64(SHA-256(secret || 0 || plain)),
//! which keys the hash with the application secret and keeps arbitrarily
//! long passwords under bcrypt's 72-byte input limit. bcrypt then adds its
//! own salt and work factor.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bcrypt::{BcryptResult, hash, verify};
use sha2::{Digest, Sha256};

#[derive(Clone)]
pub struct PasswordHasher {
    secret: String,
    cost: u32,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

impl PasswordHasher {
    pub fn new(secret: impl Into<String>, cost: u32) -> Self {
        Self {
            secret: secret.into(),
            cost,
        }
    }

    fn prehash(&self, plain: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update([0u8]);
        hasher.update(plain.as_bytes());
        BASE64.encode(hasher.finalize())
    }

    /// Hash a password for storage
    pub fn hash(&self, plain: &str) -> BcryptResult<String> {
        hash(self.prehash(plain), self.cost)
    }

    /// Verify a password against a stored hash
    pub fn verify(&self, plain: &str, stored: &str) -> BcryptResult<bool> {
        verify(self.prehash(plain), stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new("test-secret", 4)
    }

    #[test]
    fn test_verify_accepts_only_the_original() {
        let hasher = hasher();
        let stored = hasher.hash("hunter2").unwrap();
        assert!(hasher.verify("hunter2", &stored).unwrap());
        assert!(!hasher.verify("hunter3", &stored).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = hasher();
        let first = hasher.hash("hunter2").unwrap();
        let second = hasher.hash("hunter2").unwrap();
        assert_ne!(first, second);
        assert!(hasher.verify("hunter2", &first).unwrap());
        assert!(hasher.verify("hunter2", &second).unwrap());
    }

    #[test]
    fn test_secret_is_part_of_the_hash() {
        let stored = hasher().hash("hunter2").unwrap();
        let other = PasswordHasher::new("another-secret", 4);
        assert!(!other.verify("hunter2", &stored).unwrap());
    }

    #[test]
    fn test_long_passwords_are_not_truncated() {
        let hasher = hasher();
        let long = "x".repeat(100);
        let stored = hasher.hash(&long).unwrap();
        assert!(!hasher.verify(&"x".repeat(99), &stored).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(hasher().verify("hunter2", "not-a-bcrypt-hash").is_err());
    }
}
