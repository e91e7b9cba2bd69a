//! Account model for the mail gateway.

/// Prefix the console puts in front of its numeric id on the wire.
pub const MLID_PREFIX: char = 'w';

/// A registered console.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    /// Numeric console id (primary key).
    pub mlid: i64,
    /// Salted digest of the login password.
    pub password_hash: String,
    /// Salted digest of the challenge secret.
    pub mlchkid_hash: String,
    /// Token last echoed as the mail flag, if any mail ever arrived.
    pub mail_flag: Option<String>,
}

impl Account {
    /// The id as the console spells it (`w` + decimal id).
    pub fn wire_id(&self) -> String {
        wire_id(self.mlid)
    }
}

/// Spell a numeric console id the way the console does.
pub fn wire_id(mlid: i64) -> String {
    format!("{MLID_PREFIX}{mlid}")
}

/// Strip the `w` prefix from a wire id and parse the numeric part.
///
/// Returns `None` for anything that is not `w` followed by digits.
pub fn parse_wire_id(raw: &str) -> Option<i64> {
    let digits = raw.strip_prefix(MLID_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// New account for creation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Numeric console id.
    pub mlid: i64,
    /// Salted digest of the login password.
    pub password_hash: String,
    /// Salted digest of the challenge secret.
    pub mlchkid_hash: String,
}

impl NewAccount {
    /// Create a new account record.
    pub fn new(
        mlid: i64,
        password_hash: impl Into<String>,
        mlchkid_hash: impl Into<String>,
    ) -> Self {
        Self {
            mlid,
            password_hash: password_hash.into(),
            mlchkid_hash: mlchkid_hash.into(),
        }
    }
}
