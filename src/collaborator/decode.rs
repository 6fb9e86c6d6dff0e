//! Decode-with-fallback for collaborator replies.
//!
//! Models often wrap JSON in prose or code fences. Decoding tries, in order:
//!
//! - the whole reply as JSON
//! - the body of a fenced ```json block
//! - the first balanced `{...}` object in the text
//! - the widest span from the first `{` to the last `}`
//!
//! and only then reports a [`DecodeError`] carrying the raw reply.

use serde::de::DeserializeOwned;

use crate::error::DecodeError;
use crate::model::Stage;

/// Decode `raw` into the shape a stage expects.
pub fn decode_json<T: DeserializeOwned>(stage: Stage, raw: &str) -> Result<T, DecodeError> {
    let first_err = match serde_json::from_str::<T>(raw.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let candidates = [
        fenced_block(raw),
        extract_first_object(raw),
        widest_object_span(raw),
    ];
    let mut last_err = None;
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_err = Some(e),
        }
    }

    let reason = match last_err {
        Some(e) => e.to_string(),
        None if raw.contains('{') => first_err.to_string(),
        None => "no JSON object found".to_string(),
    };
    Err(DecodeError::new(stage, reason, raw))
}

/// Returns the first balanced JSON object in `text`, ignoring braces inside
/// string literals.
pub fn extract_first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = find_matching_brace(&text[start..])?;
    Some(&text[start..=start + end])
}

/// Finds the byte offset of the brace closing the object that opens at the
/// start of `s`.
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn fenced_block(text: &str) -> Option<&str> {
    let re = regex::Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn widest_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
