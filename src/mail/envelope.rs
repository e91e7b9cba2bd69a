//! Parser for the pseudo-SMTP transaction the console embeds in each send slot.
//!
//! A slot looks like:
//!
//! ```text
//! MAIL FROM: w6382198605942757@rc24.xyz
//! RCPT TO: w2649255872877667@rc24.xyz
//! RCPT TO: someone@example.com
//! DATA
//! From: w6382198605942757@rc24.xyz
//! Subject: ...
//! ...
//! ```
//!
//! Everything after the `DATA` line is the MIME payload.

use crate::config::MailConfig;

/// Result of parsing one send slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Console recipients at the gateway domain, as wire ids (`w...`).
    pub internal: Vec<String>,
    /// Internet recipients, as full addresses.
    pub external: Vec<String>,
    /// Byte offset of the first payload byte.
    pub body_offset: usize,
    /// Whether the slot lacked a `DATA` line.
    pub missing_data: bool,
    /// Whether either sender check failed.
    pub spoofed: bool,
}

impl Envelope {
    /// Parse a slot sent by the authenticated console `sender` (wire id).
    pub fn parse(content: &str, sender: &str, config: &MailConfig) -> Self {
        let expected = config.address_for(sender);
        let mut envelope = Envelope {
            missing_data: true,
            body_offset: content.len(),
            ..Default::default()
        };
        let mut seen_mail_from = false;
        let mut in_payload = false;
        let mut offset = 0;

        for raw in content.split_inclusive('\n') {
            let line_start = offset;
            offset += raw.len();
            let line = raw.trim_end_matches(['\r', '\n']);

            if in_payload {
                // Only the payload header block is inspected
                if line.is_empty() {
                    break;
                }
                if let Some(value) = strip_prefix_ignore_case(line, "From:") {
                    if !extract_address(value).eq_ignore_ascii_case(&expected) {
                        envelope.spoofed = true;
                    }
                    break;
                }
                continue;
            }

            if line == "DATA" {
                envelope.body_offset = line_start + raw.len();
                envelope.missing_data = false;
                if !seen_mail_from {
                    envelope.spoofed = true;
                    break;
                }
                in_payload = true;
            } else if let Some(value) = strip_prefix_ignore_case(line, "MAIL FROM:") {
                seen_mail_from = true;
                if !extract_address(value).eq_ignore_ascii_case(&expected) {
                    envelope.spoofed = true;
                    break;
                }
            } else if let Some(value) = strip_prefix_ignore_case(line, "RCPT TO:") {
                let address = extract_address(value);
                let Some((local, domain)) = address.rsplit_once('@') else {
                    continue;
                };
                if domain.eq_ignore_ascii_case(&config.domain) {
                    envelope.internal.push(local.to_string());
                } else if !config.is_blocked(domain) {
                    envelope.external.push(address.to_string());
                }
            }
        }

        if envelope.missing_data && !seen_mail_from {
            envelope.spoofed = true;
        }

        envelope
    }

    /// The payload of `content`, with the legacy domain rewritten.
    pub fn payload(&self, content: &str, config: &MailConfig) -> String {
        let body = content.get(self.body_offset..).unwrap_or_default();
        if config.legacy_domain.is_empty() {
            body.to_string()
        } else {
            body.replace(&config.legacy_domain, &config.domain)
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

/// Pull the bare address out of `Name <addr>`, `<addr>` or `addr`.
fn extract_address(value: &str) -> &str {
    let value = value.trim();
    match (value.rfind('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => value[start + 1..end].trim(),
        _ => value,
    }
}
