//! HTTP handlers.

pub mod account;
pub mod inbound;
pub mod mail;

pub use account::account;
pub use inbound::{inbound, mail_from_form, parse_attachment_info, AttachmentInfo};
pub use mail::{check, delete, receive, send};
