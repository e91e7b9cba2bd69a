//! Account repository for the mail gateway.
//!
//! This module provides creation and lookup of console accounts.

use super::account::{Account, NewAccount};
use super::DbPool;
use crate::{MailError, Result};

/// Repository for account operations.
pub struct AccountRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new AccountRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new account.
    ///
    /// Returns `MailError::Conflict` if an account with the same id exists.
    pub async fn create(&self, account: &NewAccount) -> Result<Account> {
        sqlx::query(
            "INSERT INTO accounts (mlid, password_hash, mlchkid_hash, mail_flag)
             VALUES ($1, $2, $3, NULL)",
        )
        .bind(account.mlid)
        .bind(&account.password_hash)
        .bind(&account.mlchkid_hash)
        .execute(self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => {
                MailError::Conflict(format!("account {} already exists", account.mlid))
            }
            _ => MailError::Database(e.to_string()),
        })?;

        self.get_by_id(account.mlid)
            .await?
            .ok_or_else(|| MailError::NotFound("account".to_string()))
    }

    /// Get an account by its numeric id.
    pub async fn get_by_id(&self, mlid: i64) -> Result<Option<Account>> {
        let result = sqlx::query_as::<_, Account>(
            "SELECT mlid, password_hash, mlchkid_hash, mail_flag
             FROM accounts WHERE mlid = $1",
        )
        .bind(mlid)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Find the account whose id and password digest both match.
    pub async fn find_by_credentials(
        &self,
        mlid: i64,
        password_hash: &str,
    ) -> Result<Option<Account>> {
        let result = sqlx::query_as::<_, Account>(
            "SELECT mlid, password_hash, mlchkid_hash, mail_flag
             FROM accounts WHERE mlid = $1 AND password_hash = $2",
        )
        .bind(mlid)
        .bind(password_hash)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Find the account owning a challenge secret digest.
    pub async fn find_by_mlchkid_hash(&self, mlchkid_hash: &str) -> Result<Option<Account>> {
        let result = sqlx::query_as::<_, Account>(
            "SELECT mlid, password_hash, mlchkid_hash, mail_flag
             FROM accounts WHERE mlchkid_hash = $1",
        )
        .bind(mlchkid_hash)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Check whether an account exists.
    pub async fn exists(&self, mlid: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE mlid = $1)")
            .bind(mlid)
            .fetch_one(self.pool)
            .await
            .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(exists)
    }

    /// Store the mail flag token for an account.
    ///
    /// Returns true if the account was found.
    pub async fn set_mail_flag(&self, mlid: i64, flag: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET mail_flag = $1 WHERE mlid = $2")
            .bind(flag)
            .bind(mlid)
            .execute(self.pool)
            .await
            .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count registered accounts.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(self.pool)
            .await
            .map_err(|e| MailError::Database(e.to_string()))?;

        Ok(count)
    }
}
