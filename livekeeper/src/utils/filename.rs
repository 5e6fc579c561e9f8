//! Filename construction for recordings.
//!
//! Names are built from the broadcaster name, the start timestamp and the
//! stream title, then sanitized so they are legal on Windows, Linux and macOS
//! while keeping CJK and other Unicode text intact.

use chrono::{DateTime, Local};

/// Characters that are invalid in Windows filenames.
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive).
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize a string for use in filenames across all platforms.
///
/// Control characters and Windows-invalid characters become `_` (runs are
/// collapsed), leading/trailing spaces and dots are trimmed, reserved device
/// names get a `_` prefix, and an empty result becomes `"unnamed"`.
///
/// ```
/// use livekeeper::utils::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("hello?world"), "hello_world");
/// assert_eq!(sanitize_filename("观看一只青蛙?"), "观看一只青蛙_");
/// assert_eq!(sanitize_filename(""), "unnamed");
/// assert_eq!(sanitize_filename("CON"), "_CON");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    for reserved in WINDOWS_RESERVED_NAMES {
        if upper == *reserved || upper.starts_with(&format!("{}.", reserved)) {
            return format!("_{}", trimmed);
        }
    }

    trimmed.to_string()
}

/// Truncate `input` to at most `max_bytes` bytes without splitting a char.
pub fn truncate_to_bytes(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

/// Build the file name of a recording: `{name}_{YYYYMMDD-HHMMSS}_{title}.{ext}`.
///
/// The stem is capped at `max_bytes` (the extension is not counted), cutting
/// the title first since name and timestamp identify the file.
pub fn recording_filename(
    name: &str,
    started_at: DateTime<Local>,
    title: &str,
    extension: &str,
    max_bytes: usize,
) -> String {
    let prefix = format!(
        "{}_{}",
        sanitize_filename(name),
        started_at.format("%Y%m%d-%H%M%S")
    );
    let title = title.trim();

    let stem = if title.is_empty() {
        truncate_to_bytes(&prefix, max_bytes).to_string()
    } else {
        let full = format!("{}_{}", prefix, sanitize_filename(title));
        let cut = truncate_to_bytes(&full, max_bytes);
        // Trailing dots/spaces are illegal on Windows after a cut.
        cut.trim_end_matches(['.', ' ']).to_string()
    };

    format!("{}.{}", stem, extension.trim_start_matches('.'))
}
