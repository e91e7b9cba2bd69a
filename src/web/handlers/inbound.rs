//! Webhook for mail services that post parsed mail.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::inbound::{parse_address, sanitize_header, sanitize_text, InboundMail, IngestError};
use crate::web::error::ApiError;
use crate::web::form::CgiForm;
use crate::web::state::AppState;

/// Description of one uploaded attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AttachmentInfo {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub charset: String,
    #[serde(default, rename = "type")]
    pub content_type: String,
}

/// Parse the `attachment-info` field. Anything unreadable means no attachments.
pub fn parse_attachment_info(raw: Option<&[u8]>) -> HashMap<String, AttachmentInfo> {
    raw.and_then(|raw| serde_json::from_slice(raw).ok())
        .unwrap_or_default()
}

/// Reduce a webhook post to an [`InboundMail`].
///
/// The first `image` attachment becomes the picture. The first `text`
/// attachment is used as the body only when the `text` field is empty.
pub fn mail_from_form(form: &CgiForm) -> Result<InboundMail, ApiError> {
    let from_raw = form.text_or_empty("from");
    let to_raw = form.text_or_empty("to");
    if from_raw.is_empty() || to_raw.is_empty() {
        return Err(ApiError::bad_request());
    }

    let from = parse_address(&from_raw).ok_or_else(|| {
        debug!(from = %from_raw, "unparseable sender address");
        ApiError::bad_request()
    })?;
    let to = parse_address(&to_raw).ok_or_else(|| {
        debug!(to = %to_raw, "unparseable recipient address");
        ApiError::bad_request()
    })?;

    let mut body = form
        .get("text")
        .map(|field| sanitize_text(&field.data))
        .unwrap_or_default();
    let subject = sanitize_header(&form.text_or_empty("subject"));

    let attachments = parse_attachment_info(form.get("attachment-info").map(|f| &f.data[..]));
    let mut image = None;
    let mut attached_text = false;

    for field in form.fields() {
        let Some(info) = attachments.get(&field.name) else {
            continue;
        };
        if info.content_type.contains("image") {
            if image.is_none() {
                image = Some(field.data.to_vec());
            }
        } else if info.content_type.contains("text") && !attached_text && body.is_empty() {
            body = sanitize_text(&field.data);
            attached_text = true;
        }
    }

    Ok(InboundMail {
        from,
        to,
        subject,
        body,
        image,
    })
}

/// POST /mail/inbound - Queue mail posted by a mail service.
pub async fn inbound(
    State(state): State<Arc<AppState>>,
    form: CgiForm,
) -> Result<StatusCode, ApiError> {
    let mail = mail_from_form(&form)?;
    let to = mail.to.clone();

    match state.ingestor.deliver(mail).await {
        Ok(snowflake) => {
            debug!(to = %to, snowflake, "webhook mail queued");
            Ok(StatusCode::OK)
        }
        Err(IngestError::UnknownRecipient(mlid)) => {
            warn!(mlid, "webhook mail for unknown console dropped");
            Ok(StatusCode::OK)
        }
        Err(IngestError::InvalidRecipient(to)) => {
            debug!(to = %to, "webhook recipient is not a console");
            Err(ApiError::bad_request())
        }
        Err(e) => {
            error!(to = %to, error = %e, "failed to queue webhook mail");
            Err(ApiError::internal())
        }
    }
}
