//! Mail module for the gateway.
//!
//! This module provides the mail queue and everything that reads or writes it:
//! - Envelope parsing and outbound routing for send requests
//! - MIME formulation with image transcoding
//! - Mailbox retrieval and cleanup
//! - The SMTP relay for Internet recipients

mod envelope;
mod formulate;
mod mailbox;
mod queue;
mod relay;
mod repository;
mod router;
mod snowflake;
mod types;

pub use envelope::Envelope;
pub use formulate::{
    formulate_message, formulate_with_limit, generate_boundary, resize, MAX_IMAGE_DIMENSION,
    MAX_MAIL_SIZE, PLACEHOLDER_MESSAGE,
};
pub use mailbox::{
    normalize_crlf, parse_max_size, Delivery, Mailbox, MailboxLocks, ReceiveError,
};
pub use queue::MailQueue;
pub use relay::{build_envelope, DisabledRelay, Relay, SmtpRelay};
pub use repository::MailRepository;
pub use router::{is_slot_key, OutboundRouter, SlotError, MAX_SLOTS};
pub use snowflake::{timestamp_ms, SnowflakeGenerator, EPOCH_MS};
pub use types::{MailMessage, NewMailMessage};
