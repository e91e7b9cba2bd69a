//! Shared state for the HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authenticator, SecretHasher};
use crate::config::Config;
use crate::db::Database;
use crate::inbound::Ingestor;
use crate::mail::{Mailbox, MailboxLocks, MailQueue, OutboundRouter, Relay, SnowflakeGenerator};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database handle.
    pub db: Arc<Database>,
    /// Credential checks and the check digest.
    pub authenticator: Authenticator,
    /// Write path into the mail queue.
    pub queue: MailQueue,
    /// Send slot routing.
    pub router: OutboundRouter,
    /// Retrieval and cleanup.
    pub mailbox: Mailbox,
    /// Foreign mail ingestion, shared with the inbound pipeline.
    pub ingestor: Ingestor,
}

impl AppState {
    /// Wire every service from the configuration.
    pub fn new(db: Arc<Database>, config: &Config, relay: Arc<dyn Relay>) -> Self {
        let ids = Arc::new(SnowflakeGenerator::new(config.server.node_id));
        let queue = MailQueue::new(db.clone(), ids);
        let authenticator = Authenticator::new(db.clone(), SecretHasher::new(&config.auth.salt));
        let router = OutboundRouter::new(queue.clone(), relay, Arc::new(config.mail.clone()));
        let mailbox = Mailbox::new(
            db.clone(),
            Arc::new(MailboxLocks::new()),
            config.receive.page_size,
            Duration::from_secs(config.receive.timeout_secs),
        );
        let ingestor = Ingestor::new(queue.clone());

        Self {
            db,
            authenticator,
            queue,
            router,
            mailbox,
            ingestor,
        }
    }

    /// Hasher for stored secrets.
    pub fn hasher(&self) -> &SecretHasher {
        self.authenticator.hasher()
    }
}
