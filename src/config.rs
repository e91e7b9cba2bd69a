//! Configuration module for the mail gateway.

use serde::Deserialize;
use std::path::Path;

use crate::{MailError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Node number mixed into every snowflake id (0-1023).
    #[serde(default = "default_node_id")]
    pub node_id: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_node_id() -> u16 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            node_id: default_node_id(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or a connection URL for PostgreSQL.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/mail.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/mail.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Mail addressing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Domain the gateway owns. Recipients at this domain are consoles.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Domain the console firmware writes into payloads; rewritten to `domain`.
    #[serde(default = "default_legacy_domain")]
    pub legacy_domain: String,
    /// Recipient domains that are always discarded.
    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,
}

fn default_domain() -> String {
    "rc24.xyz".to_string()
}

fn default_legacy_domain() -> String {
    "wii.com".to_string()
}

fn default_blocked_domains() -> Vec<String> {
    vec!["wii.com".to_string()]
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            legacy_domain: default_legacy_domain(),
            blocked_domains: default_blocked_domains(),
        }
    }
}

impl MailConfig {
    /// Check whether a recipient domain must be discarded.
    pub fn is_blocked(&self, domain: &str) -> bool {
        self.blocked_domains
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(domain))
    }

    /// Build the gateway address for a console id (`w1234...@domain`).
    pub fn address_for(&self, mlid: &str) -> String {
        format!("{}@{}", mlid, self.domain)
    }
}

/// Credential hashing configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Salt prepended to every password and mlchkid before hashing.
    #[serde(default)]
    pub salt: String,
}

/// Outbound SMTP relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Enable relaying to Internet recipients.
    #[serde(default)]
    pub enabled: bool,
    /// Relay host name.
    #[serde(default = "default_relay_host")]
    pub host: String,
    /// Submission port (STARTTLS).
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// SMTP AUTH user name.
    #[serde(default = "default_relay_username")]
    pub username: String,
    /// SMTP AUTH password or API key.
    #[serde(default)]
    pub password: String,
    /// Per-submission timeout in seconds.
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,
}

fn default_relay_host() -> String {
    "smtp.sendgrid.net".to_string()
}

fn default_relay_port() -> u16 {
    587
}

fn default_relay_username() -> String {
    "apikey".to_string()
}

fn default_relay_timeout() -> u64 {
    30
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_relay_host(),
            port: default_relay_port(),
            username: default_relay_username(),
            password: String::new(),
            timeout_secs: default_relay_timeout(),
        }
    }
}

/// Where the inbound pipeline reads raw mail from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// A local drop directory (`store_path`).
    #[default]
    Directory,
    /// An S3 bucket (`bucket`, `region`, `endpoint`).
    S3,
}

/// Inbound ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundConfig {
    /// Enable the background ingestion loop.
    #[serde(default = "default_inbound_enabled")]
    pub enabled: bool,
    /// Object store backend.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory polled for raw RFC822 messages.
    #[serde(default = "default_inbound_path")]
    pub store_path: String,
    /// Bucket name for the s3 backend.
    #[serde(default)]
    pub bucket: String,
    /// AWS region. Empty means the AWS provider chain decides.
    #[serde(default)]
    pub region: String,
    /// Custom endpoint for S3-compatible services. Empty means AWS.
    #[serde(default)]
    pub endpoint: String,
    /// Seconds between sweeps.
    #[serde(default = "default_inbound_interval")]
    pub interval_secs: u64,
    /// Number of object keys requested per listing page.
    #[serde(default = "default_inbound_page_size")]
    pub page_size: usize,
}

fn default_inbound_enabled() -> bool {
    true
}

fn default_inbound_path() -> String {
    "data/inbound".to_string()
}

fn default_inbound_interval() -> u64 {
    30 * 60
}

fn default_inbound_page_size() -> usize {
    1000
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            enabled: default_inbound_enabled(),
            backend: StoreBackend::default(),
            store_path: default_inbound_path(),
            bucket: String::new(),
            region: String::new(),
            endpoint: String::new(),
            interval_secs: default_inbound_interval(),
            page_size: default_inbound_page_size(),
        }
    }
}

/// Mailbox retrieval configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveConfig {
    /// Wall-clock budget for one receive request, in seconds.
    #[serde(default = "default_receive_timeout")]
    pub timeout_secs: u64,
    /// Maximum number of pending rows fetched per request.
    #[serde(default = "default_receive_page_size")]
    pub page_size: i64,
}

fn default_receive_timeout() -> u64 {
    10
}

fn default_receive_page_size() -> i64 {
    10
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_receive_timeout(),
            page_size: default_receive_page_size(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Mail addressing.
    #[serde(default)]
    pub mail: MailConfig,
    /// Credential hashing.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Outbound relay.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Inbound ingestion.
    #[serde(default)]
    pub inbound: InboundConfig,
    /// Mailbox retrieval.
    #[serde(default)]
    pub receive: ReceiveConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(MailError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| MailError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `WC24MAIL_SALT`: Override the credential salt
    /// - `WC24MAIL_RELAY_PASSWORD`: Override the SMTP relay password
    /// - `WC24MAIL_DATABASE`: Override the database path or URL
    pub fn apply_env_overrides(&mut self) {
        if let Some(salt) = non_empty_env("WC24MAIL_SALT") {
            self.auth.salt = salt;
        }
        if let Some(password) = non_empty_env("WC24MAIL_RELAY_PASSWORD") {
            self.relay.password = password;
        }
        if let Some(path) = non_empty_env("WC24MAIL_DATABASE") {
            self.database.path = path;
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - The credential salt is empty
    /// - The relay is enabled but has no password
    /// - The snowflake node id does not fit in 10 bits
    /// - The s3 inbound backend is enabled without a bucket
    pub fn validate(&self) -> Result<()> {
        if self.auth.salt.is_empty() {
            return Err(MailError::Config(
                "auth.salt is not set. \
                 Set it in config.toml or via WC24MAIL_SALT environment variable."
                    .to_string(),
            ));
        }
        if self.relay.enabled && self.relay.password.is_empty() {
            return Err(MailError::Config(
                "relay is enabled but relay.password is not set".to_string(),
            ));
        }
        if self.inbound.enabled
            && self.inbound.backend == StoreBackend::S3
            && self.inbound.bucket.is_empty()
        {
            return Err(MailError::Config(
                "inbound.backend is s3 but inbound.bucket is not set".to_string(),
            ));
        }
        if self.server.node_id > 1023 {
            return Err(MailError::Config(format!(
                "server.node_id must be between 0 and 1023, got {}",
                self.server.node_id
            )));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
