//! Outbound relay to Internet recipients.

use std::time::Duration;

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

use crate::config::RelayConfig;
use crate::{MailError, Result};

/// Hands a finished message to an external mail system.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Submit `payload` verbatim from `from` to the single recipient `to`.
    async fn relay(&self, from: &str, to: &str, payload: &[u8]) -> Result<()>;
}

/// Authenticated SMTP submission over STARTTLS.
pub struct SmtpRelay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpRelay {
    /// Build a pooled transport from the relay configuration.
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailError::Relay(format!("invalid relay host {}: {e}", config.host)))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl Relay for SmtpRelay {
    async fn relay(&self, from: &str, to: &str, payload: &[u8]) -> Result<()> {
        let envelope = build_envelope(from, to)?;
        self.transport
            .send_raw(&envelope, payload)
            .await
            .map_err(|e| MailError::Relay(e.to_string()))?;

        debug!(from = %from, to = %to, bytes = payload.len(), "relayed message");
        Ok(())
    }
}

/// Relay used when no SMTP relay is configured. Every submission fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRelay;

#[async_trait]
impl Relay for DisabledRelay {
    async fn relay(&self, _from: &str, to: &str, _payload: &[u8]) -> Result<()> {
        Err(MailError::Relay(format!(
            "relay is disabled, cannot deliver to {to}"
        )))
    }
}

/// Build the SMTP envelope for a single recipient.
pub fn build_envelope(from: &str, to: &str) -> Result<Envelope> {
    let from: Address = from
        .parse()
        .map_err(|e| MailError::Relay(format!("invalid sender address {from}: {e}")))?;
    let to: Address = to
        .parse()
        .map_err(|e| MailError::Relay(format!("invalid recipient address {to}: {e}")))?;

    Envelope::new(Some(from), vec![to]).map_err(|e| MailError::Relay(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_envelope() {
        let envelope = build_envelope("w6382198605942757@rc24.xyz", "friend@example.com").unwrap();
        assert_eq!(
            envelope.from().map(|a| a.to_string()),
            Some("w6382198605942757@rc24.xyz".to_string())
        );
        assert_eq!(envelope.to().len(), 1);
    }

    #[test]
    fn test_build_envelope_rejects_garbage() {
        assert!(build_envelope("not an address", "friend@example.com").is_err());
        assert!(build_envelope("w1@rc24.xyz", "nope").is_err());
    }

    #[tokio::test]
    async fn test_disabled_relay_fails() {
        let result = DisabledRelay
            .relay("w1@rc24.xyz", "friend@example.com", b"payload")
            .await;
        assert!(matches!(result, Err(MailError::Relay(_))));
    }

    #[tokio::test]
    async fn test_smtp_relay_builds() {
        let relay = SmtpRelay::new(&RelayConfig {
            enabled: true,
            password: "key".to_string(),
            ..Default::default()
        });
        assert!(relay.is_ok());
    }
}
