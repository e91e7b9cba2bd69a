//! Authentication module for the mail gateway.
//!
//! This module provides console number validation, secret hashing,
//! account registration, password checks and the check-request
//! challenge digest.

mod authenticator;
mod challenge;
mod friend_code;
mod registration;
mod secret;

pub use authenticator::{parse_send_auth, AuthError, Authenticator, ChallengeResponse};
pub use challenge::{compute_digest, EMPTY_MAIL_FLAG, MAIL_HMAC_KEY, POLL_INTERVAL};
pub use friend_code::{validate_friend_code, WiiNumber, DEFAULT_HOLLYWOOD_ID};
pub use registration::{register_account, Credentials, RegistrationError};
pub use secret::{
    generate_mail_flag, generate_secret, SecretHasher, MAIL_FLAG_LENGTH, MLCHKID_LENGTH,
    PASSWORD_LENGTH,
};
