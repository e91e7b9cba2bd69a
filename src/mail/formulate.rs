//! Builds console-readable MIME messages.
//!
//! The console's parser is picky: CRLF line breaks everywhere, a single
//! `text/plain` part first, and base64 wrapped at exactly 64 columns.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use rand::Rng;
use tracing::debug;

use crate::{MailError, Result};

/// Body used when the sender supplied no text.
pub const PLACEHOLDER_MESSAGE: &str = "No Content.";

/// Largest width or height an attached image may have.
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Largest message the console accepts, in bytes.
pub const MAX_MAIL_SIZE: usize = 1_578_040;

/// Column at which base64 attachment data is wrapped.
const BASE64_LINE_WIDTH: usize = 64;

/// Generate a multipart boundary: `YYYYMMDDhhmm/<7 random digits>`.
pub fn generate_boundary() -> String {
    let suffix: u32 = rand::rng().random_range(1_000_000..10_000_000);
    format!("{}/{}", Utc::now().format("%Y%m%d%H%M"), suffix)
}

/// Formulate a message for a console, capped at [`MAX_MAIL_SIZE`].
///
/// An image that cannot be decoded, or that would push the message over the
/// cap, is dropped and the text-only message is returned instead.
pub fn formulate_message(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    attachment: Option<&[u8]>,
) -> Result<String> {
    formulate_with_limit(from, to, subject, body, attachment, MAX_MAIL_SIZE)
}

/// [`formulate_message`] with an explicit size cap.
pub fn formulate_with_limit(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    attachment: Option<&[u8]>,
    max_size: usize,
) -> Result<String> {
    let boundary = generate_boundary();
    let body = if body.is_empty() { PLACEHOLDER_MESSAGE } else { body };

    let header = format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\
         \r\n\
         --{boundary}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Description: wiimail\r\n\
         \r\n"
    );
    let text_only = format!("{header}{body}\r\n\r\n\r\n--{boundary}--");

    let Some(attachment) = attachment else {
        return Ok(text_only);
    };

    let image = match image::load_from_memory(attachment) {
        Ok(image) => image,
        Err(e) => {
            debug!(error = %e, "attachment is not a decodable image, sending text only");
            return Ok(text_only);
        }
    };

    let jpeg = encode_jpeg(&resize(image))?;
    let encoded = wrap_base64(&STANDARD.encode(&jpeg));

    let message = format!(
        "{header}{body}\r\n\r\n\r\n\
         --{boundary}\r\n\
         Content-Type: image/jpeg; name=image.jpeg\r\n\
         Content-Transfer-Encoding: base64\r\n\
         Content-Disposition: attachment; filename=image.jpeg\r\n\
         \r\n\
         {encoded}\r\n\
         \r\n\
         --{boundary}--"
    );

    if message.len() > max_size {
        debug!(
            size = message.len(),
            max_size, "image makes the message too large, sending text only"
        );
        return Ok(text_only);
    }

    Ok(message)
}

/// Clamp an image to [`MAX_IMAGE_DIMENSION`] on both axes, keeping its aspect ratio.
pub fn resize(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = clamped_dimensions(width, height);

    if (new_width, new_height) == (width, height) {
        return image;
    }
    image.resize_exact(new_width, new_height, FilterType::Triangle)
}

fn clamped_dimensions(width: u32, height: u32) -> (u32, u32) {
    let max = u64::from(MAX_IMAGE_DIMENSION);
    let (mut w, mut h) = (u64::from(width), u64::from(height));

    if w > max {
        h = h * max / w;
        w = max;
    }
    if h > max {
        w = w * max / h;
        h = max;
    }

    (w.max(1) as u32, h.max(1) as u32)
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| MailError::Image(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Break base64 text into CRLF-terminated lines of 64 characters.
///
/// Every full line is followed by CRLF; the remainder, possibly empty, is
/// left unterminated.
fn wrap_base64(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_WIDTH * 2);
    let mut rest = encoded;
    while rest.len() >= BASE64_LINE_WIDTH {
        let (line, tail) = rest.split_at(BASE64_LINE_WIDTH);
        out.push_str(line);
        out.push_str("\r\n");
        rest = tail;
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn boundary_of(message: &str) -> &str {
        let start = message.find("boundary=\"").unwrap() + "boundary=\"".len();
        let end = message[start..].find('"').unwrap();
        &message[start..start + end]
    }

    fn image_part(message: &str) -> String {
        let start = message.find("filename=image.jpeg\r\n\r\n").unwrap()
            + "filename=image.jpeg\r\n\r\n".len();
        let end = message.rfind("\r\n\r\n--").unwrap();
        message[start..end].to_string()
    }

    #[test]
    fn test_boundary_format() {
        let boundary = generate_boundary();
        let (stamp, suffix) = boundary.split_once('/').unwrap();
        assert_eq!(stamp.len(), 12);
        assert!(stamp.bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(suffix.len(), 7);
        let suffix: u32 = suffix.parse().unwrap();
        assert!((1_000_000..10_000_000).contains(&suffix));
    }

    #[test]
    fn test_text_only_layout() {
        let message =
            formulate_message("a@example.com", "w1@rc24.xyz", "Hi", "Hello there", None).unwrap();
        let boundary = boundary_of(&message).to_string();

        let expected = format!(
            "From: a@example.com\r\nTo: w1@rc24.xyz\r\nSubject: Hi\r\nMIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n--{boundary}\r\n\
             Content-Type: text/plain; charset=utf-8\r\nContent-Description: wiimail\r\n\r\n\
             Hello there\r\n\r\n\r\n--{boundary}--"
        );
        assert_eq!(message, expected);
    }

    #[test]
    fn test_text_only_is_stable_modulo_boundary() {
        let a = formulate_message("a@example.com", "w1@rc24.xyz", "Hi", "Body", None).unwrap();
        let b = formulate_message("a@example.com", "w1@rc24.xyz", "Hi", "Body", None).unwrap();
        assert_eq!(
            a.replace(boundary_of(&a), "B"),
            b.replace(boundary_of(&b), "B")
        );
    }

    #[test]
    fn test_empty_body_uses_placeholder() {
        let message = formulate_message("a@example.com", "w1@rc24.xyz", "", "", None).unwrap();
        assert!(message.contains("\r\n\r\nNo Content.\r\n\r\n\r\n--"));
    }

    #[test]
    fn test_undecodable_attachment_falls_back() {
        let message = formulate_message(
            "a@example.com",
            "w1@rc24.xyz",
            "Hi",
            "Body",
            Some(b"definitely not an image"),
        )
        .unwrap();
        assert!(!message.contains("image/jpeg"));
        assert!(message.ends_with("--"));
    }

    #[test]
    fn test_image_part_is_wrapped_jpeg() {
        let png = png_bytes(40, 30);
        let message =
            formulate_message("a@example.com", "w1@rc24.xyz", "Hi", "Body", Some(&png)).unwrap();

        assert!(message.contains("Content-Type: image/jpeg; name=image.jpeg\r\n"));
        assert!(message.contains("Content-Transfer-Encoding: base64\r\n"));
        assert!(message.ends_with(&format!("\r\n\r\n--{}--", boundary_of(&message))));

        let part = image_part(&message);
        for line in part.split("\r\n") {
            assert!(line.len() <= 64);
        }
        assert!(part.split("\r\n").next().unwrap().len() == 64);

        let jpeg = STANDARD.decode(part.replace("\r\n", "")).unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[test]
    fn test_oversize_image_falls_back_to_text() {
        let png = png_bytes(64, 64);
        let text_only =
            formulate_message("a@example.com", "w1@rc24.xyz", "Hi", "Body", None).unwrap();

        let message = formulate_with_limit(
            "a@example.com",
            "w1@rc24.xyz",
            "Hi",
            "Body",
            Some(&png),
            text_only.len() + 16,
        )
        .unwrap();

        assert!(!message.contains("image/jpeg"));
        assert_eq!(message.len(), text_only.len());
    }

    #[test]
    fn test_wide_image_is_resized() {
        let png = png_bytes(MAX_IMAGE_DIMENSION + 1, 10);
        let message =
            formulate_message("a@example.com", "w1@rc24.xyz", "Hi", "Body", Some(&png)).unwrap();

        let jpeg = STANDARD.decode(image_part(&message).replace("\r\n", "")).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (MAX_IMAGE_DIMENSION, 9));
    }

    #[test]
    fn test_clamped_dimensions() {
        assert_eq!(clamped_dimensions(100, 50), (100, 50));
        assert_eq!(clamped_dimensions(16384, 100), (8192, 50));
        assert_eq!(clamped_dimensions(100, 16384), (50, 8192));
        assert_eq!(clamped_dimensions(16384, 32768), (4096, 8192));
        assert_eq!(clamped_dimensions(8192, 8192), (8192, 8192));
        assert_eq!(clamped_dimensions(100_000, 1), (8192, 1));
    }

    #[test]
    fn test_wrap_base64() {
        assert_eq!(wrap_base64("abc"), "abc");
        let exact = "a".repeat(64);
        assert_eq!(wrap_base64(&exact), format!("{exact}\r\n"));
        let long = "b".repeat(130);
        assert_eq!(
            wrap_base64(&long),
            format!("{}\r\n{}\r\nbb", "b".repeat(64), "b".repeat(64))
        );
    }
}
