use std::path::Path;

use crate::utils::multipart::DEFAULT_ATTACHMENT_NAME;

const MAX_FILENAME_BYTES: usize = 200;

/// Reduces an uploaded filename to something safe to embed as the last
/// segment of an object key.
///
/// Only the final path component is kept; separators, control characters and
/// shell/URL-hostile characters become `_`. Never fails: an unusable name falls
/// back to `report.pdf`.
pub fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from uploaded filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || matches!(
                    c,
                    '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';' | '#' | '%'
                )
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let mut sanitized = if sanitized.len() > MAX_FILENAME_BYTES {
        let mut end = MAX_FILENAME_BYTES;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.starts_with('.') {
        sanitized = sanitized.trim_start_matches('.').to_string();
    }

    if sanitized.trim().is_empty() {
        DEFAULT_ATTACHMENT_NAME.to_string()
    } else {
        sanitized
    }
}

/// Checks that an identifier can be used verbatim as one object-key segment.
pub fn validate_path_segment(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    if value == "." || value == ".." {
        return Err(format!("{} is not a valid identifier", field));
    }
    if value.len() > 128 {
        return Err(format!("{} is too long", field));
    }
    if value
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || c == '/' || c == '\\')
    {
        return Err(format!("{} contains characters not allowed in a path", field));
    }
    Ok(())
}
