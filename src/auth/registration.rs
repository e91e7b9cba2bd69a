//! Console account registration.

use thiserror::Error;
use tracing::info;

use super::friend_code::validate_friend_code;
use super::secret::{generate_secret, SecretHasher, MLCHKID_LENGTH, PASSWORD_LENGTH};
use crate::db::{AccountRepository, DbPool, NewAccount, MLID_PREFIX};
use crate::MailError;

/// Registration-specific errors.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The mlid is malformed or fails the console number checksum.
    #[error("invalid friend code")]
    InvalidFriendCode,

    /// An account with this mlid already exists.
    #[error("duplicate registration")]
    DuplicateAccount,

    /// Any other storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Plaintext credentials handed to the console exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The mlid as received (`w` + 16 digits).
    pub mlid: String,
    /// Login password.
    pub password: String,
    /// Challenge secret.
    pub mlchkid: String,
}

/// Register a console.
///
/// This function:
/// 1. Strips the `w` prefix and validates the console number
/// 2. Generates a password and a challenge secret
/// 3. Stores only their salted digests
///
/// The plaintext secrets are returned once and cannot be recovered later.
pub async fn register_account(
    pool: &DbPool,
    hasher: &SecretHasher,
    mlid: &str,
) -> std::result::Result<Credentials, RegistrationError> {
    let digits = mlid
        .strip_prefix(MLID_PREFIX)
        .ok_or(RegistrationError::InvalidFriendCode)?;
    if !validate_friend_code(digits) {
        return Err(RegistrationError::InvalidFriendCode);
    }
    let id: i64 = digits
        .parse()
        .map_err(|_| RegistrationError::InvalidFriendCode)?;

    let password = generate_secret(PASSWORD_LENGTH);
    let mlchkid = generate_secret(MLCHKID_LENGTH);

    let repo = AccountRepository::new(pool);
    let account = NewAccount::new(id, hasher.digest(&password), hasher.digest(&mlchkid));
    repo.create(&account).await.map_err(|e| match e {
        MailError::Conflict(_) => RegistrationError::DuplicateAccount,
        other => RegistrationError::Storage(other.to_string()),
    })?;

    info!(mlid = %mlid, "registered console");

    Ok(Credentials {
        mlid: mlid.to_string(),
        password,
        mlchkid,
    })
}
