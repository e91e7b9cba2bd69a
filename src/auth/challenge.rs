//! Check-request challenge digest.
//!
//! The console sends a nonce with every check request and compares the
//! gateway's answer against its own HMAC-SHA1 over:
//!
//! ```text
//! <challenge> "\n" w<mlid> "\n" <mail flag> "\n" 10
//! ```
//!
//! The separators and field order are fixed by the console firmware.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::{MailError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Static key shared with the console firmware.
pub const MAIL_HMAC_KEY: [u8; 20] = [
    0xce, 0x4c, 0xf2, 0x9a, 0x3d, 0x6b, 0xe1, 0xc2, 0x61, 0x91, 0x72, 0xb5, 0xcb, 0x29, 0x8c, 0x89,
    0x72, 0xd4, 0x50, 0xad,
];

/// Mail flag meaning "nothing to download".
pub const EMPTY_MAIL_FLAG: &str = "0000000000000000000000";

/// Poll interval reported to the console, in minutes.
pub const POLL_INTERVAL: &str = "10";

/// Compute the hex digest the console expects for a check request.
pub fn compute_digest(challenge: &str, mlid: i64, mail_flag: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(&MAIL_HMAC_KEY)
        .map_err(|e| MailError::Auth(format!("invalid HMAC key: {e}")))?;

    mac.update(challenge.as_bytes());
    mac.update(b"\n");
    mac.update(crate::db::wire_id(mlid).as_bytes());
    mac.update(b"\n");
    mac.update(mail_flag.as_bytes());
    mac.update(b"\n");
    mac.update(POLL_INTERVAL.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}
