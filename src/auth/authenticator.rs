//! Credential checks shared by the CGI endpoints.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::challenge::{compute_digest, EMPTY_MAIL_FLAG, POLL_INTERVAL};
use super::secret::{generate_mail_flag, SecretHasher};
use crate::db::{parse_wire_id, Account, AccountRepository, Database};
use crate::mail::MailRepository;
use crate::MailError;

/// Authentication errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing, malformed or wrong mlid/password pair.
    #[error("an authentication error occurred")]
    InvalidCredentials,

    /// No account owns the presented mlchkid.
    #[error("user does not exist")]
    UnknownUser,

    /// Storage failure while checking credentials.
    #[error("storage error: {0}")]
    Storage(#[from] MailError),
}

/// Answer to a check request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponse {
    /// Numeric id of the account owning the mlchkid.
    pub mlid: i64,
    /// Hex HMAC-SHA1 digest.
    pub digest: String,
    /// Mail flag that was mixed into the digest.
    pub mail_flag: String,
    /// Poll interval reported to the console.
    pub interval: &'static str,
}

/// Validates console credentials against the account table.
#[derive(Debug, Clone)]
pub struct Authenticator {
    db: Arc<Database>,
    hasher: SecretHasher,
}

impl Authenticator {
    /// Create an authenticator over the given database.
    pub fn new(db: Arc<Database>, hasher: SecretHasher) -> Self {
        Self { db, hasher }
    }

    /// The hasher used for stored secrets.
    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    /// Check an mlid/password pair.
    ///
    /// `mlid` is the wire form (`w` + digits).
    pub async fn validate_password(&self, mlid: &str, password: &str) -> Result<Account, AuthError> {
        if mlid.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let id = parse_wire_id(mlid).ok_or(AuthError::InvalidCredentials)?;

        let repo = AccountRepository::new(self.db.pool());
        let account = repo
            .find_by_credentials(id, &self.hasher.digest(password))
            .await?;

        match account {
            Some(account) => Ok(account),
            None => {
                debug!(mlid = %mlid, "password mismatch");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Resolve a check request.
    ///
    /// The mail flag is the account's stored token while unsent mail
    /// exists, and the all-zero sentinel otherwise. An account with pending
    /// mail but no stored token gets one written here.
    pub async fn resolve_challenge(
        &self,
        mlchkid: &str,
        challenge: &str,
    ) -> Result<ChallengeResponse, AuthError> {
        let accounts = AccountRepository::new(self.db.pool());
        let account = accounts
            .find_by_mlchkid_hash(&self.hasher.digest(mlchkid))
            .await?
            .ok_or(AuthError::UnknownUser)?;

        let has_mail = MailRepository::new(self.db.pool())
            .has_pending(account.mlid)
            .await?;

        let mail_flag = if !has_mail {
            EMPTY_MAIL_FLAG.to_string()
        } else {
            match account.mail_flag.as_deref() {
                Some(flag) if !flag.is_empty() && flag != EMPTY_MAIL_FLAG => flag.to_string(),
                _ => {
                    let flag = generate_mail_flag();
                    if !accounts.set_mail_flag(account.mlid, &flag).await? {
                        warn!(mlid = account.mlid, "account vanished while storing mail flag");
                    }
                    flag
                }
            }
        };

        let digest = compute_digest(challenge, account.mlid, &mail_flag)?;

        Ok(ChallengeResponse {
            mlid: account.mlid,
            digest,
            mail_flag,
            interval: POLL_INTERVAL,
        })
    }
}

/// Split the `mlid` field of a send request into mlid and password.
///
/// The field has the form `mlid=w<16 digits>\npasswd=<16-32 chars>`, with an
/// optional `\r` before the newline. Anything else yields `None`.
pub fn parse_send_auth(field: &str) -> Option<(String, String)> {
    let rest = field.strip_prefix("mlid=")?;
    let (mlid, rest) = rest.split_once('\n')?;
    let mlid = mlid.strip_suffix('\r').unwrap_or(mlid);
    let password = rest.strip_prefix("passwd=")?;

    let digits = mlid.strip_prefix('w')?;
    if digits.len() != 16 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let length = password.chars().count();
    if !(16..=32).contains(&length) || password.contains('\n') {
        return None;
    }

    Some((mlid.to_string(), password.to_string()))
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::NewAccount;
    use crate::mail::NewMailMessage;

    const MLID: i64 = 6382198605942757;

    async fn setup() -> (Arc<Database>, Authenticator) {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let hasher = SecretHasher::new("salt");
        let repo = AccountRepository::new(db.pool());
        repo.create(&NewAccount::new(
            MLID,
            hasher.digest("passwordpassword"),
            hasher.digest("checkcheckcheckcheckcheckcheckch"),
        ))
        .await
        .unwrap();
        (db.clone(), Authenticator::new(db, hasher))
    }

    #[tokio::test]
    async fn test_validate_password_success() {
        let (_db, auth) = setup().await;
        let account = auth
            .validate_password("w6382198605942757", "passwordpassword")
            .await
            .unwrap();
        assert_eq!(account.mlid, MLID);
    }

    #[tokio::test]
    async fn test_validate_password_failures() {
        let (_db, auth) = setup().await;

        for (mlid, password) in [
            ("w6382198605942757", "wrongpassword123"),
            ("w6382198605942757", ""),
            ("", "passwordpassword"),
            ("6382198605942757", "passwordpassword"),
            ("w1111111111111111", "passwordpassword"),
        ] {
            let result = auth.validate_password(mlid, password).await;
            assert!(
                matches!(result, Err(AuthError::InvalidCredentials)),
                "{mlid}/{password}"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_challenge_without_mail() {
        let (_db, auth) = setup().await;
        let response = auth
            .resolve_challenge("checkcheckcheckcheckcheckcheckch", "abc")
            .await
            .unwrap();

        assert_eq!(response.mlid, MLID);
        assert_eq!(response.mail_flag, EMPTY_MAIL_FLAG);
        assert_eq!(response.interval, "10");
        assert_eq!(response.digest, "3f3e36358737ab30a1d8aa1f1f95c37a66409d43");
    }

    #[tokio::test]
    async fn test_resolve_challenge_unknown_user() {
        let (_db, auth) = setup().await;
        let result = auth.resolve_challenge("nobody", "abc").await;
        assert!(matches!(result, Err(AuthError::UnknownUser)));
    }

    #[tokio::test]
    async fn test_mail_flag_is_stable_while_mail_pending() {
        let (db, auth) = setup().await;
        MailRepository::new(db.pool())
            .insert(&NewMailMessage::new(1, "data", "sender@example.com", MLID))
            .await
            .unwrap();

        let first = auth
            .resolve_challenge("checkcheckcheckcheckcheckcheckch", "abc")
            .await
            .unwrap();
        let second = auth
            .resolve_challenge("checkcheckcheckcheckcheckcheckch", "abc")
            .await
            .unwrap();

        assert_ne!(first.mail_flag, EMPTY_MAIL_FLAG);
        assert_eq!(first.mail_flag.len(), 22);
        assert_eq!(first.mail_flag, second.mail_flag);
        assert_eq!(first.digest, second.digest);

        let stored = AccountRepository::new(db.pool())
            .get_by_id(MLID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.mail_flag.as_deref(), Some(first.mail_flag.as_str()));
    }

    #[test]
    fn test_parse_send_auth() {
        let parsed = parse_send_auth("mlid=w6382198605942757\r\npasswd=passwordpassword");
        assert_eq!(
            parsed,
            Some(("w6382198605942757".to_string(), "passwordpassword".to_string()))
        );

        let parsed = parse_send_auth("mlid=w6382198605942757\npasswd=passwordpassword");
        assert!(parsed.is_some());
    }

    #[test]
    fn test_parse_send_auth_rejects_malformed() {
        assert!(parse_send_auth("").is_none());
        assert!(parse_send_auth("mlid=w6382198605942757").is_none());
        assert!(parse_send_auth("mlid=6382198605942757\npasswd=passwordpassword").is_none());
        assert!(parse_send_auth("mlid=w638219860594275\npasswd=passwordpassword").is_none());
        assert!(parse_send_auth("mlid=w6382198605942757\npasswd=short").is_none());
        assert!(parse_send_auth(&format!(
            "mlid=w6382198605942757\npasswd={}",
            "x".repeat(33)
        ))
        .is_none());
        assert!(parse_send_auth("mlid=w6382198605942757\npasswd=passwordpassword\nextra").is_none());
    }
}
