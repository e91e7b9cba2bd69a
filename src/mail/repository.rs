//! Mail queue repository.

use super::types::{MailMessage, NewMailMessage};
use crate::db::DbPool;
use crate::{MailError, Result};

/// Repository for queued mail.
pub struct MailRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> MailRepository<'a> {
    /// Create a new MailRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Queue a message as pending.
    pub async fn insert(&self, mail: &NewMailMessage) -> Result<()> {
        sqlx::query(
            "INSERT INTO mail (snowflake, data, sender, recipient, is_sent)
             VALUES ($1, $2, $3, $4, FALSE)",
        )
        .bind(mail.snowflake)
        .bind(&mail.data)
        .bind(&mail.sender)
        .bind(mail.recipient)
        .execute(self.pool)
        .await
        .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(())
    }

    /// Get a message by snowflake id.
    pub async fn get(&self, snowflake: i64) -> Result<Option<MailMessage>> {
        let result = sqlx::query_as::<_, MailMessage>(
            "SELECT snowflake, data, sender, recipient, is_sent
             FROM mail WHERE snowflake = $1",
        )
        .bind(snowflake)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Whether the recipient has anything left to download.
    pub async fn has_pending(&self, recipient: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM mail WHERE recipient = $1 AND is_sent = FALSE)",
        )
        .bind(recipient)
        .fetch_one(self.pool)
        .await
        .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(exists)
    }

    /// Pending messages for a recipient, oldest first.
    pub async fn list_pending(&self, recipient: i64, limit: i64) -> Result<Vec<MailMessage>> {
        let mails = sqlx::query_as::<_, MailMessage>(
            "SELECT snowflake, data, sender, recipient, is_sent
             FROM mail
             WHERE recipient = $1 AND is_sent = FALSE
             ORDER BY snowflake ASC
             LIMIT $2",
        )
        .bind(recipient)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(mails)
    }

    /// Flag a message as delivered.
    pub async fn mark_sent(&self, snowflake: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE mail SET is_sent = TRUE WHERE snowflake = $1")
            .bind(snowflake)
            .execute(self.pool)
            .await
            .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every delivered message for a recipient.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_sent(&self, recipient: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM mail WHERE recipient = $1 AND is_sent = TRUE")
            .bind(recipient)
            .execute(self.pool)
            .await
            .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    /// Count messages for a recipient, delivered or not.
    pub async fn count_for(&self, recipient: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mail WHERE recipient = $1")
            .bind(recipient)
            .fetch_one(self.pool)
            .await
            .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(count)
    }
}
