//! Extracting console mail from foreign RFC 822 messages.

use mail_parser::{Address, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use thiserror::Error;

use crate::db::parse_wire_id;
use crate::MailError;

/// Why an inbound message could not be queued.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The raw object is not a parseable RFC 822 message.
    #[error("unparseable message")]
    Unparseable,

    /// A required address header is absent or malformed.
    #[error("missing or malformed {0} address")]
    BadAddress(&'static str),

    /// The recipient local part is not a console id.
    #[error("recipient {0} is not a console address")]
    InvalidRecipient(String),

    /// No console account exists for the recipient.
    #[error("no account for console {0}")]
    UnknownRecipient(i64),

    /// Building the console message failed.
    #[error("formulation failed: {0}")]
    Formulate(MailError),

    /// Writing to the mail queue failed.
    #[error("enqueue failed: {0}")]
    Enqueue(MailError),
}

/// A foreign message reduced to what a console can display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMail {
    /// Bare sender address.
    pub from: String,
    /// Bare recipient address, `w<digits>@domain` for a console.
    pub to: String,
    /// Subject with line breaks removed.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// First image attachment, undecoded.
    pub image: Option<Vec<u8>>,
}

impl InboundMail {
    /// Console id of the recipient, from the `To` local part (`w<digits>@...`).
    pub fn recipient(&self) -> Result<i64, IngestError> {
        let local = self
            .to
            .rsplit_once('@')
            .map(|(local, _)| local)
            .unwrap_or(&self.to);

        parse_wire_id(&local.to_ascii_lowercase())
            .ok_or_else(|| IngestError::InvalidRecipient(self.to.clone()))
    }
}

/// Parse a raw RFC 822 message.
///
/// Multipart bodies contribute their first text part as the body and their
/// first image part as the attachment; everything else is dropped. A flat
/// `text/*` body is used directly.
pub fn parse_message(raw: &[u8]) -> Result<InboundMail, IngestError> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or(IngestError::Unparseable)?;

    let from = first_address(message.from()).ok_or(IngestError::BadAddress("from"))?;
    let to = first_address(message.to()).ok_or(IngestError::BadAddress("to"))?;
    let subject = message.subject().map(sanitize_header).unwrap_or_default();

    let (body, image) = extract_content(&message);

    Ok(InboundMail {
        from,
        to,
        subject,
        body,
        image,
    })
}

fn extract_content(message: &Message<'_>) -> (String, Option<Vec<u8>>) {
    let Some(root) = message.parts.first() else {
        return (String::new(), None);
    };

    if root.is_multipart() {
        let mut body = None;
        let mut image = None;

        for part in message.parts.iter().skip(1) {
            if part.is_multipart() || matches!(part.body, PartType::Message(_)) {
                continue;
            }
            match media_type(part).as_str() {
                "image" if image.is_none() => image = Some(part.contents().to_vec()),
                "text" if body.is_none() => body = Some(sanitize_text(part.contents())),
                _ => {}
            }
            if body.is_some() && image.is_some() {
                break;
            }
        }

        return (body.unwrap_or_default(), image);
    }

    if media_type(root) == "text" {
        return (sanitize_text(root.contents()), None);
    }

    (String::new(), None)
}

/// Top-level media type of a part, lowercased. Untyped parts are text.
fn media_type(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| ct.ctype().to_ascii_lowercase())
        .unwrap_or_else(|| "text".to_string())
}

fn first_address(address: Option<&Address<'_>>) -> Option<String> {
    let addr = address?.first()?.address()?.trim();
    if addr.contains('@') && !addr.contains(char::is_whitespace) {
        Some(addr.to_string())
    } else {
        None
    }
}

/// Parse a single RFC 5322 address such as `Name <user@example.com>`.
///
/// Returns the bare `user@example.com` part.
pub fn parse_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains(['\r', '\n']) {
        return None;
    }

    let header = format!("From: {raw}\r\n\r\n");
    let message = MessageParser::default().parse(header.as_bytes())?;
    first_address(message.from())
}

/// Keep only well-formed UTF-8 sequences, dropping everything else.
pub fn sanitize_text(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// Headers are placed verbatim in the console message, so line breaks go.
pub fn sanitize_header(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_text_message() {
        let raw = b"From: Alice <alice@example.com>\r\n\
                    To: w6382198605942757@rc24.xyz\r\n\
                    Subject: Hello\r\n\
                    Content-Type: text/plain; charset=utf-8\r\n\
                    \r\n\
                    Hi there!\r\n";

        let mail = parse_message(raw).unwrap();
        assert_eq!(mail.from, "alice@example.com");
        assert_eq!(mail.to, "w6382198605942757@rc24.xyz");
        assert_eq!(mail.subject, "Hello");
        assert_eq!(mail.body.trim_end(), "Hi there!");
        assert!(mail.image.is_none());
        assert_eq!(mail.recipient().unwrap(), 6382198605942757);
    }

    #[test]
    fn test_multipart_takes_first_text_and_image() {
        let raw = b"From: bob@example.com\r\n\
                    To: w6382198605942757@rc24.xyz\r\n\
                    Subject: Photo\r\n\
                    MIME-Version: 1.0\r\n\
                    Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
                    \r\n\
                    --XX\r\n\
                    Content-Type: text/plain; charset=utf-8\r\n\
                    \r\n\
                    Look at this\r\n\
                    --XX\r\n\
                    Content-Type: text/html; charset=utf-8\r\n\
                    \r\n\
                    <p>ignored</p>\r\n\
                    --XX\r\n\
                    Content-Type: image/png\r\n\
                    Content-Transfer-Encoding: base64\r\n\
                    \r\n\
                    aGVsbG8=\r\n\
                    --XX\r\n\
                    Content-Type: image/gif\r\n\
                    \r\n\
                    second\r\n\
                    --XX--\r\n";

        let mail = parse_message(raw).unwrap();
        assert_eq!(mail.body.trim_end(), "Look at this");
        assert_eq!(mail.image.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_non_text_flat_body_is_dropped() {
        let raw = b"From: bob@example.com\r\n\
                    To: w6382198605942757@rc24.xyz\r\n\
                    Content-Type: application/octet-stream\r\n\
                    \r\n\
                    binary\r\n";

        let mail = parse_message(raw).unwrap();
        assert!(mail.body.is_empty());
        assert!(mail.image.is_none());
        assert!(mail.subject.is_empty());
    }

    #[test]
    fn test_missing_addresses() {
        let raw = b"To: w6382198605942757@rc24.xyz\r\nSubject: x\r\n\r\nbody\r\n";
        assert!(matches!(
            parse_message(raw),
            Err(IngestError::BadAddress("from"))
        ));

        let raw = b"From: bob@example.com\r\nSubject: x\r\n\r\nbody\r\n";
        assert!(matches!(parse_message(raw), Err(IngestError::BadAddress("to"))));
    }

    #[test]
    fn test_recipient_requires_console_prefix() {
        let mail = InboundMail {
            to: "someone@rc24.xyz".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            mail.recipient(),
            Err(IngestError::InvalidRecipient(_))
        ));

        let mail = InboundMail {
            to: "W6382198605942757@rc24.xyz".to_string(),
            ..Default::default()
        };
        assert_eq!(mail.recipient().unwrap(), 6382198605942757);
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("Alice Example <alice@example.com>").as_deref(),
            Some("alice@example.com")
        );
        assert_eq!(
            parse_address("bob@example.com").as_deref(),
            Some("bob@example.com")
        );
        assert!(parse_address("").is_none());
        assert!(parse_address("not an address").is_none());
        assert!(parse_address("a@b.com\r\nBcc: c@d.com").is_none());
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text(b"plain"), "plain");
        assert_eq!(sanitize_text(b"ab\xffcd\xc3"), "abcd");
        assert_eq!(sanitize_text("日本".as_bytes()), "日本");
    }

    #[test]
    fn test_sanitize_header() {
        assert_eq!(sanitize_header("a\r\nb"), "a  b");
    }
}
