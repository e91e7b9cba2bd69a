//! Secret generation and salted hashing.
//!
//! Passwords and mlchkids are stored as `hex(sha512(salt || secret))`. They
//! are compared by recomputing the digest and matching it in SQL, so the
//! digest must be deterministic for a given salt.

use rand::Rng;
use sha2::{Digest, Sha512};

/// Length of the generated login password.
pub const PASSWORD_LENGTH: usize = 16;

/// Length of the generated challenge secret.
pub const MLCHKID_LENGTH: usize = 32;

/// Length of a stored mail flag token.
pub const MAIL_FLAG_LENGTH: usize = 22;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Salted SHA-512 hasher for console secrets.
#[derive(Debug, Clone)]
pub struct SecretHasher {
    salt: Vec<u8>,
}

impl SecretHasher {
    /// Create a hasher with the given salt.
    pub fn new(salt: impl AsRef<[u8]>) -> Self {
        Self {
            salt: salt.as_ref().to_vec(),
        }
    }

    /// Hex digest of `salt || secret`.
    pub fn digest(&self, secret: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(&self.salt);
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Generate a random string of ASCII letters.
pub fn generate_secret(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect()
}

/// Generate a fresh mail flag token.
///
/// Letters only, so it can never collide with the all-zero sentinel.
pub fn generate_mail_flag() -> String {
    generate_secret(MAIL_FLAG_LENGTH)
}
