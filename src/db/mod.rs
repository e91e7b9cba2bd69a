//! Database module for the mail gateway.
//!
//! This module provides the sqlx connection pool, the embedded schema
//! migrations and the account repository. SQLite is the default backend;
//! PostgreSQL is available behind the `postgres` feature. All queries use
//! `$N` placeholders, which both backends accept.

mod account;
mod repository;
mod schema;

pub use account::{parse_wire_id, wire_id, Account, NewAccount, MLID_PREFIX};
pub use repository::AccountRepository;
pub use schema::MIGRATIONS;

use tracing::{debug, info};

use crate::{MailError, Result};

/// Connection pool type for the enabled backend.
#[cfg(feature = "sqlite")]
pub type DbPool = sqlx::SqlitePool;

/// Connection pool type for the enabled backend.
#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub type DbPool = sqlx::PgPool;

#[cfg(feature = "sqlite")]
const TABLE_EXISTS_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = $1)";
#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
const TABLE_EXISTS_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = $1)";

/// Database wrapper owning the connection pool.
///
/// Each query checks a connection out of the pool and commits on its own;
/// there are no multi-statement transactions outside of migrations.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open the SQLite database file at `path`, creating it if needed.
    ///
    /// Migrations are automatically applied.
    #[cfg(feature = "sqlite")]
    pub async fn open(path: &str, max_connections: u32) -> Result<Self> {
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
        use std::time::Duration;

        info!("Opening database at {:?}", path);

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| MailError::DatabaseConnection(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the PostgreSQL database at `url`.
    ///
    /// Migrations are automatically applied.
    #[cfg(all(feature = "postgres", not(feature = "sqlite")))]
    pub async fn open(url: &str, max_connections: u32) -> Result<Self> {
        use sqlx::postgres::PgPoolOptions;

        info!("Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await
            .map_err(|e| MailError::DatabaseConnection(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// The pool holds a single connection that never expires, since every
    /// SQLite in-memory connection is its own database.
    #[cfg(feature = "sqlite")]
    pub async fn open_in_memory() -> Result<Self> {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::str::FromStr;

        debug!("Opening in-memory database");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MailError::DatabaseConnection(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| MailError::DatabaseConnection(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check if a table exists.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(TABLE_EXISTS_SQL)
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Get the current schema version.
    pub async fn schema_version(&self) -> Result<i64> {
        if !self.table_exists("schema_version").await? {
            return Ok(0);
        }

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        let current_version = self.schema_version().await?;

        if current_version as usize >= MIGRATIONS.len() {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version,
            MIGRATIONS.len()
        );

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     BIGINT PRIMARY KEY,
                applied_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate().skip(current_version as usize) {
            let version = (i + 1) as i64;
            info!("Applying migration v{}", version);

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            debug!("Migration v{} applied successfully", version);
        }

        info!(
            "Database migration complete (now at version {})",
            MIGRATIONS.len()
        );
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.schema_version().await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_migrations_applied() {
        let db = Database::open_in_memory().await.unwrap();
        let version = db.schema_version().await.unwrap();
        assert_eq!(version as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_tables_exist() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.table_exists("accounts").await.unwrap());
        assert!(db.table_exists("mail").await.unwrap());
        assert!(db.table_exists("schema_version").await.unwrap());
        assert!(!db.table_exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap() as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("mail.db");
        let db_path = db_path.to_str().unwrap().to_string();

        {
            let db = Database::open(&db_path, 2).await.unwrap();
            assert!(db.table_exists("accounts").await.unwrap());
            db.close().await;
        }

        // Reopen: migrations must not be reapplied
        let db = Database::open(&db_path, 2).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap() as usize, MIGRATIONS.len());
        db.close().await;
    }
}
