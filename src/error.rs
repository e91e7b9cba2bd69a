//! Error types for the mail gateway.

use thiserror::Error;

/// Common error type for the mail gateway.
#[derive(Error, Debug)]
pub enum MailError {
    /// Database error.
    ///
    /// This is a generic database error that wraps errors from any database backend.
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Validation error for client input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Outbound SMTP relay error.
    #[error("relay error: {0}")]
    Relay(String),

    /// Object store error.
    #[error("object store error: {0}")]
    ObjectStore(String),

    /// A bounded operation ran past its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Image decoding or encoding error.
    #[error("image error: {0}")]
    Image(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for MailError {
    fn from(e: sqlx::Error) -> Self {
        MailError::Database(e.to_string())
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, MailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        let err = MailError::Auth("invalid password".to_string());
        assert_eq!(err.to_string(), "authentication error: invalid password");
    }

    #[test]
    fn test_validation_error_display() {
        let err = MailError::Validation("maxsize".to_string());
        assert_eq!(err.to_string(), "validation error: maxsize");
    }

    #[test]
    fn test_not_found_error_display() {
        let err = MailError::NotFound("account".to_string());
        assert_eq!(err.to_string(), "account not found");
    }

    #[test]
    fn test_timeout_error_display() {
        let err = MailError::Timeout("receive".to_string());
        assert_eq!(err.to_string(), "operation timed out: receive");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MailError = io_err.into();
        assert!(matches!(err, MailError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let err: MailError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, MailError::Database(_)));
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(MailError::Relay("test".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
