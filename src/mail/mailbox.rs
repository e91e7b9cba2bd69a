//! Mailbox retrieval and cleanup for consoles.
//!
//! Retrieval reads pending rows and then flags them sent; cleanup deletes
//! flagged rows. Both run under a per-account lock so that two requests from
//! the same console cannot interleave inside this process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, warn};

use super::formulate::generate_boundary;
use super::repository::MailRepository;
use crate::cgi::CgiResponse;
use crate::db::Database;
use crate::MailError;

/// Retrieval errors.
#[derive(Error, Debug)]
pub enum ReceiveError {
    /// The declared maximum size is not a non-negative integer.
    #[error("maxsize needs to be an int")]
    InvalidMaxSize,

    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] MailError),

    /// The retrieval deadline passed.
    #[error("mailbox query timed out")]
    Timeout,
}

/// Per-account async locks.
#[derive(Debug, Default)]
pub struct MailboxLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl MailboxLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one account's mailbox.
    pub async fn lock(&self, mlid: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Drop entries nobody holds or waits on
            locks.retain(|id, lock| *id == mlid || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(mlid).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of accounts currently tracked.
    pub fn tracked(&self) -> usize {
        match self.locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Mail handed to a console by one receive request.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Multipart boundary shared by the envelope and every part.
    pub boundary: String,
    /// Concatenated mail parts.
    pub parts: String,
    /// Number of messages included.
    pub count: usize,
    /// Total size of the included parts in bytes.
    pub size: usize,
}

impl Delivery {
    /// Status record for this delivery.
    pub fn record(&self) -> CgiResponse {
        CgiResponse::success()
            .with_field("mailnum", self.count)
            .with_field("mailsize", self.size)
            .with_field("allnum", self.count)
    }

    /// `Content-Type` header value for the response.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    /// Full response body: an ignored filler part carrying the status
    /// record, then the mail parts, then the closing delimiter.
    pub fn render(&self) -> String {
        format!(
            "--{boundary}\r\nContent-Type: text/plain\r\n\r\nThis part is ignored.\r\n\r\n\r\n\n{record}{parts}\r\n--{boundary}--\r\n",
            boundary = self.boundary,
            record = self.record().encode(),
            parts = self.parts,
        )
    }
}

/// Parse the `maxsize` field of a receive request.
pub fn parse_max_size(raw: &str) -> Result<usize, ReceiveError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ReceiveError::InvalidMaxSize)
}

/// Rewrite every line break as CRLF.
pub fn normalize_crlf(data: &str) -> String {
    data.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Retrieval and cleanup over the mail queue.
#[derive(Debug, Clone)]
pub struct Mailbox {
    db: Arc<Database>,
    locks: Arc<MailboxLocks>,
    page_size: i64,
    timeout: Duration,
}

impl Mailbox {
    /// Create a mailbox service.
    pub fn new(db: Arc<Database>, locks: Arc<MailboxLocks>, page_size: i64, timeout: Duration) -> Self {
        Self {
            db,
            locks,
            page_size: page_size.max(1),
            timeout,
        }
    }

    /// Collect pending mail for `mlid` up to `max_size` bytes and flag it sent.
    ///
    /// Rows are read in snowflake order, at most one page per request. A
    /// message that would exceed the budget stops the scan. Failures to flag
    /// a message are logged and the message is still delivered.
    pub async fn receive(&self, mlid: i64, max_size: usize) -> Result<Delivery, ReceiveError> {
        let deadline = Instant::now() + self.timeout;

        let _guard = timeout_at(deadline, self.locks.lock(mlid))
            .await
            .map_err(|_| {
                warn!(mlid, "mailbox lock wait timed out");
                ReceiveError::Timeout
            })?;

        let repo = MailRepository::new(self.db.pool());
        let pending = match timeout_at(deadline, repo.list_pending(mlid, self.page_size)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(mlid, "database query timed out");
                return Err(ReceiveError::Timeout);
            }
        };

        let boundary = generate_boundary();
        let mut parts = String::new();
        let mut included = Vec::new();

        for mail in pending {
            let part = format!(
                "\r\n--{boundary}\r\nContent-Type: text/plain\r\n\r\n{}",
                normalize_crlf(&mail.data)
            );
            if parts.len() + part.len() > max_size {
                break;
            }
            parts.push_str(&part);
            included.push(mail.snowflake);
        }

        for snowflake in &included {
            match timeout_at(deadline, repo.mark_sent(*snowflake)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(mlid, snowflake, error = %e, "failed to flag mail as sent"),
                Err(_) => warn!(mlid, snowflake, "database query timed out while flagging mail"),
            }
        }

        debug!(mlid, count = included.len(), size = parts.len(), "mail delivered");

        Ok(Delivery {
            boundary,
            size: parts.len(),
            count: included.len(),
            parts,
        })
    }

    /// Delete every delivered message for `mlid`.
    pub async fn delete_sent(&self, mlid: i64) -> Result<u64, MailError> {
        let _guard = self.locks.lock(mlid).await;
        let deleted = MailRepository::new(self.db.pool()).delete_sent(mlid).await?;
        debug!(mlid, deleted, "delivered mail deleted");
        Ok(deleted)
    }
}
