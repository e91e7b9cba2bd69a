//! Form extraction for console and webhook posts.
//!
//! Consoles send `send.cgi` as `multipart/form-data` and everything else
//! url-encoded; the webhook is multipart with file fields. [`CgiForm`]
//! accepts either encoding and keeps fields in request order.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header,
    Form,
};

use super::error::ApiError;

/// One form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    /// Field name.
    pub name: String,
    /// File name, for file fields.
    pub file_name: Option<String>,
    /// Raw value.
    pub data: Bytes,
}

impl FormField {
    /// The value as text. Invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Fields of a form post in request order.
#[derive(Debug, Clone, Default)]
pub struct CgiForm {
    fields: Vec<FormField>,
}

impl CgiForm {
    /// Build a form from name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(name, value)| FormField {
                name: name.into(),
                file_name: None,
                data: Bytes::from(value.into()),
            })
            .collect();
        Self { fields }
    }

    /// First field with the given name.
    pub fn get(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// First value with the given name, as text.
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(FormField::text)
    }

    /// First value with the given name, or an empty string.
    pub fn text_or_empty(&self, name: &str) -> String {
        self.text(name).unwrap_or_default()
    }

    /// All fields in request order.
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }
}

#[async_trait]
impl<S> FromRequest<S> for CgiForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| {
                    tracing::debug!(error = %e, "rejected url-encoded form");
                    ApiError::bad_request()
                })?;
            return Ok(Self::from_pairs(pairs));
        }

        let mut multipart = Multipart::from_request(req, state).await.map_err(|e| {
            tracing::debug!(error = %e, "rejected multipart form");
            ApiError::bad_request()
        })?;

        let mut fields = Vec::new();
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            tracing::debug!(error = %e, "failed to read multipart field");
            ApiError::bad_request()
        })? {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let data = field.bytes().await.map_err(|e| {
                tracing::debug!(field = %name, error = %e, "failed to read multipart value");
                ApiError::bad_request()
            })?;
            fields.push(FormField {
                name,
                file_name,
                data,
            });
        }

        Ok(Self { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_keeps_order_and_first_value() {
        let form = CgiForm::from_pairs([("m2", "b"), ("m1", "a"), ("m2", "c")]);
        let names: Vec<&str> = form.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["m2", "m1", "m2"]);
        assert_eq!(form.text("m2").as_deref(), Some("b"));
        assert!(form.text("missing").is_none());
        assert_eq!(form.text_or_empty("missing"), "");
    }

    #[test]
    fn test_field_text_is_lossy() {
        let field = FormField {
            name: "x".to_string(),
            file_name: None,
            data: Bytes::from_static(b"ok\xff"),
        };
        assert_eq!(field.text(), "ok\u{fffd}");
    }
}
