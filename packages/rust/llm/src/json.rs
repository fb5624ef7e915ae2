//! Recover the single JSON object from a model reply.

use std::sync::LazyLock;

use regex::Regex;
use seoflow_shared::{Result, SeoflowError};
use serde_json::{Map, Value};

/// Parse the JSON object a model was asked to return.
///
/// Accepts a bare object, an object inside a markdown code fence, or an
/// object surrounded by prose. Blank input is `EmptyResponse`; anything
/// else that does not yield an object is `InvalidJson`.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SeoflowError::EmptyResponse);
    }

    if let Some(obj) = parse_object(trimmed) {
        return Ok(obj);
    }

    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)```").expect("valid regex")
    });
    for caps in FENCE_RE.captures_iter(trimmed) {
        if let Some(obj) = caps.get(1).and_then(|m| parse_object(m.as_str().trim())) {
            return Ok(obj);
        }
    }

    // Prose around the object: try each balanced `{...}` span in order.
    let mut search_from = 0;
    while let Some(offset) = trimmed[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&trimmed[start..]) {
            if let Some(obj) = parse_object(&trimmed[start..start + end]) {
                return Ok(obj);
            }
        }
        search_from = start + 1;
    }

    let preview: String = trimmed.chars().take(120).collect();
    Err(SeoflowError::invalid_json(format!(
        "no JSON object found in response starting with {preview:?}"
    )))
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Byte length of the balanced `{...}` prefix of `s`, honouring strings.
fn balanced_end(s: &str) -> Option<usize> {
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
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
