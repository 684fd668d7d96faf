//! Byte-level `multipart/form-data` decoding for fully buffered request bodies.
//!
//! Parts are located by the literal `--{boundary}` delimiter on the raw bytes.
//! Only parts without a `filename` are ever turned into text, so PDF payloads
//! pass through untouched even when they contain boundary-looking sequences.

use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

/// Filename used when the attachment part carries an empty `filename=""`.
pub const DEFAULT_ATTACHMENT_NAME: &str = "report.pdf";

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultipartError {
    #[error("No boundary in content type")]
    MissingBoundary,

    #[error("Multipart body is not terminated by a closing boundary")]
    Unterminated,

    #[error("Malformed part: {0}")]
    MalformedPart(String),

    #[error("Field '{0}' is not valid UTF-8 text")]
    InvalidText(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Decoded form: text fields by name plus at most one binary attachment.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    attachment: Option<Attachment>,
}

impl MultipartForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Returns the trimmed value of a text field, treating blank values as absent.
    pub fn require_text(&self, name: &str) -> Result<&str, MultipartError> {
        self.text(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MultipartError::MissingField(name.to_string()))
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn require_attachment(&self, name: &str) -> Result<&Attachment, MultipartError> {
        self.attachment
            .as_ref()
            .filter(|a| a.field == name)
            .ok_or_else(|| MultipartError::MissingField(name.to_string()))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len() + usize::from(self.attachment.is_some())
    }
}

/// Pulls the `boundary` parameter out of a `Content-Type` header value.
pub fn extract_boundary(content_type: &str) -> Result<&str, MultipartError> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Decodes a complete multipart body.
///
/// The preamble before the first delimiter and the epilogue after the closing
/// `--{boundary}--` are dropped. A body without a closing delimiter is rejected
/// rather than decoded partially.
pub fn decode(body: &[u8], content_type: &str) -> Result<MultipartForm, MultipartError> {
    let boundary = extract_boundary(content_type)?;
    let delimiter = [b"--".as_slice(), boundary.as_bytes()].concat();

    let mut form = MultipartForm::default();
    let mut current = next_delimiter(body, &delimiter, 0).ok_or(MultipartError::Unterminated)?;

    loop {
        let after = current + delimiter.len();
        if body[after..].starts_with(b"--") {
            break;
        }

        let part_start = after + CRLF.len();
        let next = next_delimiter(body, &delimiter, part_start)
            .ok_or(MultipartError::Unterminated)?;
        if next < part_start + CRLF.len() {
            return Err(MultipartError::MalformedPart(
                "part has no headers".to_string(),
            ));
        }

        // The CRLF in front of the next delimiter belongs to the delimiter.
        parse_part(&body[part_start..next - CRLF.len()], &mut form)?;
        current = next;
    }

    Ok(form)
}

/// Finds the next real delimiter at or after `from`: it must start a line and be
/// followed by CRLF (another part) or `--` (the closing delimiter).
fn next_delimiter(body: &[u8], delimiter: &[u8], from: usize) -> Option<usize> {
    let mut offset = from;
    while offset + delimiter.len() <= body.len() {
        let found = offset + find(&body[offset..], delimiter)?;
        let at_line_start = found == 0 || (found >= 2 && &body[found - 2..found] == CRLF);
        let tail = &body[found + delimiter.len()..];
        if at_line_start && (tail.starts_with(CRLF) || tail.starts_with(b"--")) {
            return Some(found);
        }
        offset = found + 1;
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_part(raw: &[u8], form: &mut MultipartForm) -> Result<(), MultipartError> {
    let (head, content) = if raw.starts_with(CRLF) {
        (&raw[..0], &raw[CRLF.len()..])
    } else {
        let split = find(raw, HEADER_END).ok_or_else(|| {
            MultipartError::MalformedPart("missing header terminator".to_string())
        })?;
        (&raw[..split], &raw[split + HEADER_END.len()..])
    };

    let head = String::from_utf8_lossy(head);
    let mut disposition = None;
    let mut content_type = None;
    for line in head.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            disposition = Some(disposition_params(value));
        } else if key.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let Some(params) = disposition else {
        tracing::debug!("Skipping multipart part without Content-Disposition");
        return Ok(());
    };
    let Some(name) = params.get("name").cloned() else {
        tracing::debug!("Skipping unnamed multipart part");
        return Ok(());
    };

    match params.get("filename") {
        Some(filename) => {
            if form.attachment.is_some() {
                tracing::debug!("Ignoring extra attachment in field '{}'", name);
                return Ok(());
            }
            let filename = if filename.is_empty() {
                DEFAULT_ATTACHMENT_NAME.to_string()
            } else {
                filename.clone()
            };
            form.attachment = Some(Attachment {
                field: name,
                filename,
                content_type,
                data: Bytes::copy_from_slice(content),
            });
        }
        None => {
            let text = String::from_utf8(content.to_vec())
                .map_err(|_| MultipartError::InvalidText(name.clone()))?;
            form.fields.insert(name, text);
        }
    }

    Ok(())
}

/// Parses `form-data; name="file"; filename="a;b.pdf"` into lowercase keys and
/// unquoted values. Semicolons inside quotes do not split parameters.
fn disposition_params(value: &str) -> HashMap<String, String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);

    segments
        .into_iter()
        .skip(1)
        .filter_map(|segment| {
            let (key, raw) = segment.split_once('=')?;
            Some((key.trim().to_ascii_lowercase(), unquote(raw.trim())))
        })
        .collect()
}

fn unquote(value: &str) -> String {
    match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOUNDARY: &str = "----ReportBoundary7MA4YWxkTrZu0gW";

    fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    fn body_with(project_id: &str, filename: &str, file: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"project_id\"\r\n\r\n");
        body.extend_from_slice(project_id.as_bytes());
        body.extend_from_slice(format!("\r\n--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    #[test]
    fn test_extract_boundary() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=abc123").unwrap(),
            "abc123"
        );
        assert_eq!(
            extract_boundary("multipart/form-data; BOUNDARY=\"quoted value\"").unwrap(),
            "quoted value"
        );
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=xyz; charset=utf-8").unwrap(),
            "xyz"
        );
        assert_eq!(
            extract_boundary("multipart/form-data"),
            Err(MultipartError::MissingBoundary)
        );
        assert_eq!(
            extract_boundary("multipart/form-data; boundary="),
            Err(MultipartError::MissingBoundary)
        );
    }

    #[test]
    fn test_decode_text_and_file() {
        let body = body_with("p1", "report.pdf", b"%PDF-1.7 hello");
        let form = decode(&body, &content_type()).unwrap();

        assert_eq!(form.field_count(), 2);
        assert_eq!(form.require_text("project_id").unwrap(), "p1");
        let file = form.require_attachment("file").unwrap();
        assert_eq!(file.filename, "report.pdf");
        assert_eq!(file.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(&file.data[..], b"%PDF-1.7 hello");
    }

    #[test]
    fn test_boundary_text_inside_binary_does_not_split() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"%PDF-1.4\n\xff\xfe\x00binary ");
        payload.extend_from_slice(format!("--{}", BOUNDARY).as_bytes());
        payload.extend_from_slice(b" mid-stream\r\n");
        payload.extend_from_slice(format!("--{}", BOUNDARY).as_bytes());
        payload.extend_from_slice(b"trailing junk\r\n\x00\x01%%EOF");

        let body = body_with("p1", "report.pdf", &payload);
        let form = decode(&body, &content_type()).unwrap();

        assert_eq!(form.field_count(), 2);
        assert_eq!(form.require_text("project_id").unwrap(), "p1");
        assert_eq!(&form.require_attachment("file").unwrap().data[..], &payload[..]);
    }

    #[test]
    fn test_preamble_and_epilogue_are_discarded() {
        let mut body = b"This is the preamble.\r\n".to_vec();
        body.extend(body_with("p9", "a.pdf", b"data"));
        body.extend_from_slice(b"epilogue that must be ignored");

        let form = decode(&body, &content_type()).unwrap();
        assert_eq!(form.field_count(), 2);
        assert_eq!(form.text("project_id"), Some("p9"));
    }

    #[test]
    fn test_missing_boundary_is_rejected() {
        let body = body_with("p1", "report.pdf", b"x");
        let err = decode(&body, "multipart/form-data").unwrap_err();
        assert_eq!(err, MultipartError::MissingBoundary);
    }

    #[test]
    fn test_truncated_body_is_rejected() {
        let body = body_with("p1", "report.pdf", b"%PDF-1.7 complete");
        let truncated = &body[..body.len() - 20];
        assert_eq!(
            decode(truncated, &content_type()).unwrap_err(),
            MultipartError::Unterminated
        );
    }

    #[test]
    fn test_missing_required_fields() {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file_id\"\r\n\r\n  \r\n--{b}--\r\n",
            b = BOUNDARY
        );
        let form = decode(body.as_bytes(), &content_type()).unwrap();
        assert_eq!(
            form.require_text("file_id"),
            Err(MultipartError::MissingField("file_id".to_string()))
        );
        assert_eq!(
            form.require_attachment("file"),
            Err(MultipartError::MissingField("file".to_string()))
        );
    }

    #[test]
    fn test_empty_filename_falls_back_to_default() {
        let body = body_with("p1", "", b"x");
        let form = decode(&body, &content_type()).unwrap();
        assert_eq!(form.attachment().unwrap().filename, DEFAULT_ATTACHMENT_NAME);
    }

    #[test]
    fn test_quoted_semicolon_in_filename() {
        let body = body_with("p1", "site; north wing.pdf", b"x");
        let form = decode(&body, &content_type()).unwrap();
        assert_eq!(form.attachment().unwrap().filename, "site; north wing.pdf");
    }

    #[test]
    fn test_only_first_attachment_is_kept() {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"one.pdf\"\r\n\r\nONE\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"two.pdf\"\r\n\r\nTWO\r\n\
             --{b}--\r\n",
            b = BOUNDARY
        );
        let form = decode(body.as_bytes(), &content_type()).unwrap();
        let file = form.attachment().unwrap();
        assert_eq!(file.filename, "one.pdf");
        assert_eq!(&file.data[..], b"ONE");
    }

    #[test]
    fn test_non_utf8_text_field_is_rejected() {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"project_id\"\r\n\r\n",
            b = BOUNDARY
        )
        .into_bytes();
        body.extend_from_slice(&[0xff, 0xfe]);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        assert_eq!(
            decode(&body, &content_type()).unwrap_err(),
            MultipartError::InvalidText("project_id".to_string())
        );
    }

    proptest! {
        /// Binary payloads survive byte-for-byte, including embedded boundary text.
        #[test]
        fn decode_preserves_binary_payload(
            prefix in proptest::collection::vec(any::<u8>(), 0..512),
            suffix in proptest::collection::vec(any::<u8>(), 0..512),
            project_id in "[a-z0-9-]{1,36}",
        ) {
            let mut payload = prefix.clone();
            payload.extend_from_slice(b"x--");
            payload.extend_from_slice(BOUNDARY.as_bytes());
            payload.extend_from_slice(&suffix);

            let body = body_with(&project_id, "report.pdf", &payload);
            let form = decode(&body, &content_type()).unwrap();

            prop_assert_eq!(form.field_count(), 2);
            prop_assert_eq!(form.require_text("project_id").unwrap(), project_id.as_str());
            prop_assert_eq!(&form.require_attachment("file").unwrap().data[..], &payload[..]);
        }
    }
}
