//! Database schema and migrations for the mail gateway.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded. The SQL is kept portable between SQLite and PostgreSQL.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: accounts keyed by the numeric console id
    r#"
CREATE TABLE accounts (
    mlid            BIGINT PRIMARY KEY,      -- console id without the 'w' prefix
    password_hash   TEXT NOT NULL,           -- salted SHA-512, hex
    mlchkid_hash    TEXT NOT NULL,           -- salted SHA-512, hex
    mail_flag       TEXT                     -- token echoed by check.cgi
);

CREATE INDEX idx_accounts_mlchkid_hash ON accounts(mlchkid_hash);
"#,
    // v2: mail queue ordered by snowflake id
    r#"
CREATE TABLE mail (
    snowflake   BIGINT PRIMARY KEY,
    data        TEXT NOT NULL,
    sender      TEXT NOT NULL,
    recipient   BIGINT NOT NULL,
    is_sent     BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX idx_mail_recipient_pending ON mail(recipient, is_sent, snowflake);
"#,
];
