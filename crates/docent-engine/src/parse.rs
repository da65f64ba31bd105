//! Tolerant parsing of model classification output.
//!
//! The routing and visual-extraction steps ask the model for a bare JSON
//! array and get back everything from clean JSON to markdown-fenced,
//! chatty, or mid-string-truncated text. Parsing is layered; the first
//! layer that yields an array wins, and total failure is an empty result
//! rather than an error.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

fn array_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Non-greedy, dot matches newline: first bracketed block only.
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").expect("valid regex"))
}

fn integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

/// Strip a markdown code fence and an optional `json` language tag.
fn strip_fences(raw: &str) -> &str {
    let text = raw.trim();
    if !text.starts_with("```") {
        return text;
    }
    let text = text.trim_matches(|c| c == '`' || c == ' ' || c == '\n');
    text.strip_prefix("json").map(str::trim).unwrap_or(text)
}

/// Parse a JSON array out of arbitrary model output.
///
/// Layers, first success wins:
/// 1. strict JSON parse of the fence-stripped text
/// 2. strict JSON parse of the first `[...]` block in the text
/// 3. repair of a truncated array ([`repair_truncated_array`])
///
/// `None` means no layer produced an array.
pub fn parse_array(raw: &str) -> Option<Vec<Value>> {
    let text = strip_fences(raw);

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) {
        return Some(items);
    }

    if let Some(block) = array_block_re().find(text) {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(block.as_str()) {
            debug!(layer = "block_extraction", "Recovered array from surrounding text");
            return Some(items);
        }
    }

    repair_truncated_array(text)
}

/// Repair an array the model cut off mid-output.
///
/// The text must start with `[`. A trailing comma is trimmed; then, in
/// order: a cleanly terminated final string gets its `]` appended, a
/// truncated final element is dropped by trimming back to the last comma,
/// and only as a last resort is the dangling text closed with `"]` or
/// `]`. Dropping a half-emitted element is preferred over guessing at
/// its ending, so `["alpha.pdf","beta` repairs to `["alpha.pdf"]`.
fn repair_truncated_array(text: &str) -> Option<Vec<Value>> {
    let mut t = text.trim();
    if !t.starts_with('[') || t.ends_with(']') {
        return None;
    }
    if let Some(stripped) = t.strip_suffix(',') {
        t = stripped.trim_end();
    }

    let mut candidates: Vec<String> = Vec::new();
    if t.ends_with('"') {
        candidates.push(format!("{}]", t));
    } else {
        if let Some(pos) = t.rfind(',') {
            candidates.push(format!("{}]", &t[..pos]));
        }
        candidates.push(format!("{}\"]", t));
        candidates.push(format!("{}]", t));
    }

    for candidate in candidates {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&candidate) {
            debug!(layer = "truncation_repair", "Recovered truncated array");
            return Some(items);
        }
    }
    None
}

/// Parse a string array, coercing scalars to trimmed strings and
/// capping the result at `max_items`. Failure is an empty list.
pub fn parse_string_array(raw: &str, max_items: usize) -> Vec<String> {
    let Some(items) = parse_array(raw) else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .take(max_items)
        .collect()
}

/// Parse an array of page numbers.
///
/// Runs the [`parse_array`] layers first, then falls back to pulling
/// every integer out of the raw text; chatty output like `Pages 3 and 7`
/// still yields `[3, 7]`. Non-numeric array entries are dropped.
pub fn parse_page_numbers(raw: &str) -> Vec<u32> {
    let text = strip_fences(raw);

    if let Some(items) = parse_array(text) {
        return items
            .into_iter()
            .filter_map(|v| match v {
                Value::Number(n) => n.as_u64().map(|n| n as u32),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect();
    }

    integer_re()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}
