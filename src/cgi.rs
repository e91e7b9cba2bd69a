//! Line-oriented `key=value` response records understood by the console.
//!
//! Every CGI endpoint answers with the same record shape:
//!
//! ```text
//! cd=<code>
//! msg=<message>
//! <key>=<value>
//! ...
//! ```
//!
//! `cd` and `msg` are only written when set, extra fields follow in insertion
//! order, and every line ends with a bare `\n`.

use std::fmt::Write as _;

/// Success.
pub const CD_SUCCESS: u32 = 100;
/// Bad credentials on send/receive/delete.
pub const CD_AUTH_FAILED: u32 = 250;
/// Duplicate registration.
pub const CD_DUPLICATE: u32 = 211;
/// Check request is missing a field or failed to query.
pub const CD_CHECK_ERROR: u32 = 320;
/// Check request for an unknown mlchkid.
pub const CD_CHECK_UNKNOWN_USER: u32 = 321;
/// Receive request with a non-numeric maxsize.
pub const CD_RECEIVE_MAXSIZE: u32 = 330;
/// Delete request with a non-numeric delnum.
pub const CD_DELETE_DELNUM: u32 = 340;
/// A send slot tried to impersonate another console.
pub const CD_IMPERSONATION: u32 = 350;
/// Send request carrying more than sixteen slots.
pub const CD_TOO_MANY_MESSAGES: u32 = 351;
/// Account creation failed in storage.
pub const CD_ACCOUNT_STORAGE: u32 = 410;
/// A send slot could not be queued.
pub const CD_SLOT_STORAGE: u32 = 450;
/// Delete failed in storage.
pub const CD_DELETE_STORAGE: u32 = 541;
/// Generic storage, relay or timeout failure.
pub const CD_SERVER_ERROR: u32 = 551;
/// Account creation with a missing or invalid mlid.
pub const CD_INVALID_MLID: u32 = 610;

/// Message accompanying every success record.
pub const MSG_SUCCESS: &str = "Success.";

/// A response record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgiResponse {
    code: Option<u32>,
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl CgiResponse {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `cd=100` / `msg=Success.` record.
    pub fn success() -> Self {
        Self::error(CD_SUCCESS, MSG_SUCCESS)
    }

    /// Create a record carrying only a code and a message.
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: Some(message.into()),
            fields: Vec::new(),
        }
    }

    /// Append an extra field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push_field(key, value);
        self
    }

    /// Append an extra field in place.
    pub fn push_field(&mut self, key: impl Into<String>, value: impl ToString) {
        self.fields.push((key.into(), value.to_string()));
    }

    /// Append the per-slot status of a `send` request.
    ///
    /// The slot name is the form key the console used (`m1`, `m2`, ...); its
    /// leading letter is dropped so slot `m3` reports as `cd3` / `msg3`.
    pub fn add_mail_response(&mut self, slot: &str, code: u32, message: &str) {
        let index = slot.get(1..).unwrap_or_default();
        self.push_field(format!("cd{index}"), code);
        self.push_field(format!("msg{index}"), message);
    }

    /// The status code, if set.
    pub fn code(&self) -> Option<u32> {
        self.code
    }

    /// The status message, if set.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Look up the first extra field with the given key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize the record to its wire form.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(code) = self.code.filter(|code| *code != 0) {
            let _ = writeln!(out, "cd={code}");
        }
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            let _ = writeln!(out, "msg={message}");
        }
        for (key, value) in &self.fields {
            let _ = writeln!(out, "{key}={value}");
        }
        out
    }
}

impl std::fmt::Display for CgiResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}
