//! Write path into the mail queue.

use std::sync::Arc;

use tracing::{debug, warn};

use super::snowflake::SnowflakeGenerator;
use crate::auth::generate_mail_flag;
use crate::db::{AccountRepository, Database};
use crate::{MailError, Result};

/// Queues mail for consoles.
///
/// Every enqueue takes a fresh snowflake id and rotates the recipient's
/// stored mail flag, so the next check request reports a state change.
#[derive(Debug, Clone)]
pub struct MailQueue {
    db: Arc<Database>,
    ids: Arc<SnowflakeGenerator>,
}

impl MailQueue {
    /// Create a queue writing through the given database.
    pub fn new(db: Arc<Database>, ids: Arc<SnowflakeGenerator>) -> Self {
        Self { db, ids }
    }

    /// The underlying database.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Whether a console account exists.
    pub async fn recipient_exists(&self, mlid: i64) -> Result<bool> {
        AccountRepository::new(self.db.pool()).exists(mlid).await
    }

    /// Queue `data` for the console `recipient`. Returns the new snowflake id.
    ///
    /// The row insert and the flag rotation commit together; on error
    /// nothing is queued.
    pub async fn enqueue(&self, sender: &str, recipient: i64, data: &str) -> Result<i64> {
        let snowflake = self.ids.generate();
        let flag = generate_mail_flag();

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| MailError::Database(e.to_string()))?;

        sqlx::query(
            "INSERT INTO mail (snowflake, data, sender, recipient, is_sent)
             VALUES ($1, $2, $3, $4, FALSE)",
        )
        .bind(snowflake)
        .bind(data)
        .bind(sender)
        .bind(recipient)
        .execute(&mut *tx)
        .await
        .map_err(|e| MailError::Database(e.to_string()))?;

        let updated = sqlx::query("UPDATE accounts SET mail_flag = $1 WHERE mlid = $2")
            .bind(&flag)
            .bind(recipient)
            .execute(&mut *tx)
            .await
            .map_err(|e| MailError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| MailError::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            warn!(recipient, snowflake, "queued mail for a console without an account");
        }

        debug!(recipient, snowflake, sender = %sender, "mail queued");
        Ok(snowflake)
    }
}
