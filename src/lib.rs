//! wc24mail - WiiConnect24 mail gateway
//!
//! Lets the console's built-in mail client exchange messages with Internet
//! mail: the CGI endpoints the console polls, an outbound SMTP relay, and
//! inbound ingestion from an object store or a mail service webhook.

pub mod auth;
pub mod cgi;
pub mod config;
pub mod db;
pub mod error;
pub mod inbound;
pub mod logging;
pub mod mail;
pub mod web;

pub use auth::{
    register_account, validate_friend_code, AuthError, Authenticator, ChallengeResponse,
    Credentials, RegistrationError, SecretHasher,
};
pub use cgi::CgiResponse;
pub use config::Config;
pub use db::{Account, AccountRepository, Database, NewAccount};
pub use error::{MailError, Result};
pub use inbound::{DirectoryStore, InboundPipeline, Ingestor, ObjectStore};
pub use mail::{
    formulate_message, DisabledRelay, MailQueue, MailRepository, Mailbox, OutboundRouter, Relay,
    SmtpRelay, SnowflakeGenerator,
};
pub use web::{create_router, AppState, WebServer};
