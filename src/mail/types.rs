//! Queued mail types.

/// A queued message.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MailMessage {
    /// Snowflake id. Primary key and delivery order.
    pub snowflake: i64,
    /// Fully formulated MIME text.
    pub data: String,
    /// Sender address or console id.
    pub sender: String,
    /// Numeric id of the receiving console.
    pub recipient: i64,
    /// Whether the message has been handed to the console.
    pub is_sent: bool,
}

/// A message about to be queued.
#[derive(Debug, Clone)]
pub struct NewMailMessage {
    pub snowflake: i64,
    pub data: String,
    pub sender: String,
    pub recipient: i64,
}

impl NewMailMessage {
    /// Create a new pending message.
    pub fn new(
        snowflake: i64,
        data: impl Into<String>,
        sender: impl Into<String>,
        recipient: i64,
    ) -> Self {
        Self {
            snowflake,
            data: data.into(),
            sender: sender.into(),
            recipient,
        }
    }
}
