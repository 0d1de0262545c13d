//! Locating and strictly decoding the JSON array inside a completion.

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Markers the request templates ask the collaborator to wrap its answer in.
pub const JSON_OPEN: &str = "<json>";
pub const JSON_CLOSE: &str = "</json>";

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("completion is empty")]
    Empty,

    #[error("completion contains no JSON array")]
    NoArray,

    #[error("JSON array rejected: {0}")]
    Invalid(#[from] serde_json::Error),
}

fn outer_brackets(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn between_markers(text: &str) -> Option<&str> {
    let start = text.find(JSON_OPEN)? + JSON_OPEN.len();
    let end = start + text[start..].find(JSON_CLOSE)?;
    outer_brackets(&text[start..end])
}

/// Candidate array spans in priority order: the whole trimmed text, the span
/// between the delimiter markers, then the first `[` to the last `]`.
fn candidates(text: &str) -> Vec<&str> {
    let trimmed = text.trim();
    let mut spans = Vec::new();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        spans.push(trimmed);
    }
    spans.extend(between_markers(text));
    spans.extend(outer_brackets(text));
    spans.dedup();
    spans
}

/// Decodes every item of the JSON array in `text`. Any item that does not
/// match `T` rejects the whole response.
pub fn parse_items<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, ResponseError> {
    if text.trim().is_empty() {
        return Err(ResponseError::Empty);
    }

    let mut last_error = ResponseError::NoArray;
    for span in candidates(text) {
        match serde_json::from_str::<Vec<T>>(span) {
            Ok(items) => return Ok(items),
            Err(error) => last_error = ResponseError::Invalid(error),
        }
    }
    Err(last_error)
}
