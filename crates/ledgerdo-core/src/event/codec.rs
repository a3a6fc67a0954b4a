//! JSON-lines encoding of event logs, used for fixtures and sim traces.
//!
//! One [`LedgerEvent`] per line. Blank lines and lines starting with `#`
//! are ignored.

use super::LedgerEvent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid event JSON: {0}")]
    InvalidJson(String),
    #[error("failed to encode event: {0}")]
    Encode(String),
}

/// Encode one event as a single JSON line (no trailing newline).
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn write_line(event: &LedgerEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Encode a whole log, newline-terminated.
///
/// # Errors
///
/// Returns the first encoding failure.
pub fn write_lines<'a, I>(events: I) -> Result<String, CodecError>
where
    I: IntoIterator<Item = &'a LedgerEvent>,
{
    let mut out = String::new();
    for event in events {
        out.push_str(&write_line(event)?);
        out.push('\n');
    }
    Ok(out)
}

/// Decode a log.
///
/// # Errors
///
/// Returns `(line_number, CodecError)` for the first malformed line.
/// Line numbers are 1-indexed.
pub fn parse_lines(input: &str) -> Result<Vec<LedgerEvent>, (usize, CodecError)> {
    let mut events = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str::<LedgerEvent>(trimmed)
            .map_err(|e| (i + 1, CodecError::InvalidJson(e.to_string())))?;
        events.push(event);
    }
    Ok(events)
}
