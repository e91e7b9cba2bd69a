//! Outbound routing for send requests.
//!
//! Each slot of a send request is parsed and delivered on its own task:
//! console recipients go into the mail queue, Internet recipients go out
//! through the relay. A failing slot never affects its siblings, and the
//! response is only encoded once every slot has finished.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::envelope::Envelope;
use super::queue::MailQueue;
use super::relay::Relay;
use crate::cgi::{
    CgiResponse, CD_IMPERSONATION, CD_SERVER_ERROR, CD_SLOT_STORAGE, CD_SUCCESS,
    CD_TOO_MANY_MESSAGES, MSG_SUCCESS,
};
use crate::config::MailConfig;
use crate::db::parse_wire_id;
use crate::MailError;

/// Most slots a single send request may carry.
pub const MAX_SLOTS: usize = 16;

/// Why a slot was not delivered.
#[derive(Error, Debug)]
pub enum SlotError {
    /// The envelope or payload sender is not the authenticated console.
    #[error("attempted to impersonate another user")]
    ImpersonationAttempt,

    /// Checking a console recipient failed.
    #[error("recipient lookup failed: {0}")]
    RecipientLookup(MailError),

    /// Queueing mail failed.
    #[error("queue error: {0}")]
    Storage(MailError),

    /// Relaying to an Internet recipient failed.
    #[error("relay error: {0}")]
    Relay(MailError),
}

impl SlotError {
    /// Wire code and message for this failure.
    pub fn wire(&self) -> (u32, &'static str) {
        match self {
            SlotError::ImpersonationAttempt => {
                (CD_IMPERSONATION, "Attempted to impersonate another user.")
            }
            SlotError::RecipientLookup(_) => (CD_SERVER_ERROR, "Issue verifying recipient."),
            SlotError::Storage(_) => (CD_SLOT_STORAGE, "Database error."),
            SlotError::Relay(_) => (CD_SERVER_ERROR, "Relay error."),
        }
    }
}

/// Routes send slots to the mail queue or the relay.
#[derive(Clone)]
pub struct OutboundRouter {
    queue: MailQueue,
    relay: Arc<dyn Relay>,
    config: Arc<MailConfig>,
}

impl OutboundRouter {
    /// Create a router.
    pub fn new(queue: MailQueue, relay: Arc<dyn Relay>, config: Arc<MailConfig>) -> Self {
        Self {
            queue,
            relay,
            config,
        }
    }

    /// Deliver every slot for the authenticated console `sender` (wire id).
    ///
    /// `slots` pairs each form key (`m1`, `m2`, ...) with its raw content.
    pub async fn route(&self, sender: &str, slots: Vec<(String, String)>) -> CgiResponse {
        if slots.len() > MAX_SLOTS {
            warn!(sender = %sender, slots = slots.len(), "too many messages in one request");
            return CgiResponse::error(CD_TOO_MANY_MESSAGES, "Too many messages were sent.");
        }

        let expected: Vec<String> = slots.iter().map(|(slot, _)| slot.clone()).collect();
        let collected: Arc<Mutex<Vec<SlotStatus>>> = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = JoinSet::new();
        for (slot, content) in slots {
            let router = self.clone();
            let sender = sender.to_string();
            let collected = Arc::clone(&collected);
            tasks.spawn(async move {
                let status = match router.deliver_slot(&sender, &content).await {
                    Ok(()) => (slot, CD_SUCCESS, MSG_SUCCESS),
                    Err(e) => {
                        match &e {
                            SlotError::ImpersonationAttempt => {
                                warn!(sender = %sender, slot = %slot, "impersonation attempt")
                            }
                            other => {
                                error!(sender = %sender, slot = %slot, error = %other, "slot failed")
                            }
                        }
                        let (code, message) = e.wire();
                        (slot, code, message)
                    }
                };
                lock_results(&collected).push(status);
            });
        }

        // Every slot must finish before the response is encoded
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(sender = %sender, error = %e, "slot task failed");
            }
        }

        let mut results = std::mem::take(&mut *lock_results(&collected));
        for slot in expected {
            if !results.iter().any(|(name, _, _)| *name == slot) {
                results.push((slot, CD_SLOT_STORAGE, "Database error."));
            }
        }

        results.sort_by(|a, b| slot_order(&a.0).cmp(&slot_order(&b.0)));

        let mut response = CgiResponse::success();
        for (slot, code, message) in results {
            response.add_mail_response(&slot, code, message);
        }
        response
    }

    /// Parse and deliver one slot.
    pub async fn deliver_slot(&self, sender: &str, content: &str) -> Result<(), SlotError> {
        let envelope = Envelope::parse(content, sender, &self.config);
        if envelope.spoofed {
            return Err(SlotError::ImpersonationAttempt);
        }
        if envelope.missing_data {
            debug!(sender = %sender, "slot has no DATA section, nothing to deliver");
            return Ok(());
        }

        let payload = envelope.payload(content, &self.config);
        let from = self.config.address_for(sender);

        for recipient in &envelope.internal {
            let Some(mlid) = parse_wire_id(recipient) else {
                debug!(recipient = %recipient, "skipping malformed console recipient");
                continue;
            };

            let exists = self
                .queue
                .recipient_exists(mlid)
                .await
                .map_err(SlotError::RecipientLookup)?;
            if !exists {
                debug!(recipient = %recipient, "skipping unknown console recipient");
                continue;
            }

            self.queue
                .enqueue(&from, mlid, &payload)
                .await
                .map_err(SlotError::Storage)?;
        }

        let mut relay_error = None;
        for recipient in &envelope.external {
            if let Err(e) = self.relay.relay(&from, recipient, payload.as_bytes()).await {
                error!(from = %from, to = %recipient, error = %e, "relay failed");
                relay_error = Some(e);
            }
        }

        match relay_error {
            Some(e) => Err(SlotError::Relay(e)),
            None => Ok(()),
        }
    }
}

type SlotStatus = (String, u32, &'static str);

fn lock_results(results: &Mutex<Vec<SlotStatus>>) -> MutexGuard<'_, Vec<SlotStatus>> {
    match results.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Sort key for slot names: numeric suffix first, then the raw name.
fn slot_order(slot: &str) -> (u64, &str) {
    let number = slot.get(1..).and_then(|n| n.parse().ok()).unwrap_or(u64::MAX);
    (number, slot)
}

/// Whether a send form field carries a message slot (`m` followed by digits).
pub fn is_slot_key(key: &str) -> bool {
    key.strip_prefix('m')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}
