//! Layered recovery of JSON objects from free-form model output.
//!
//! Strategies run in order and the first one that yields an object wins:
//!
//! 1. [`direct`]: the text is already a JSON object.
//! 2. [`cleaned`]: escape raw control characters inside strings, drop
//!    trailing commas, close unbalanced strings/brackets, reparse.
//! 3. [`fenced`]: pull the object out of a ```` ```json ```` code fence.
//! 4. [`braced`]: slice from the first `{` to the last `}` and reparse.
//! 5. [`salvage`]: regex out each expected field of the [`ResponseKind`].
//!
//! If everything fails, [`parse_structured`] returns an empty map.

use super::{FieldShape, ResponseKind};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, warn};

pub type JsonMap = serde_json::Map<String, Value>;

/// A named, independently testable parse attempt.
pub struct Strategy {
    pub name: &'static str,
    pub apply: fn(&str, ResponseKind) -> Option<JsonMap>,
}

/// The ordered repair chain.
pub const STRATEGIES: [Strategy; 5] = [
    Strategy {
        name: "direct",
        apply: direct,
    },
    Strategy {
        name: "cleaned",
        apply: cleaned,
    },
    Strategy {
        name: "fenced",
        apply: fenced,
    },
    Strategy {
        name: "braced",
        apply: braced,
    },
    Strategy {
        name: "salvage",
        apply: salvage,
    },
];

static FENCED_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"));

static QUOTED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"((?:[^"\\]|\\.)*)""#).expect("valid regex"));

/// Run the repair chain. Never fails; the last resort is an empty map.
pub fn parse_structured(text: &str, kind: ResponseKind) -> JsonMap {
    for strategy in &STRATEGIES {
        if let Some(map) = (strategy.apply)(text, kind) {
            debug!(
                kind = %kind,
                strategy = strategy.name,
                keys = ?map.keys().collect::<Vec<_>>(),
                "Structured response parsed"
            );
            return map;
        }
    }
    warn!(
        kind = %kind,
        chars = text.len(),
        "All JSON repair strategies failed, returning empty object"
    );
    JsonMap::new()
}

/// Parse `text` as a JSON object. Arrays and scalars are rejected.
fn parse_object(text: &str) -> Option<JsonMap> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Strategy 1: the response is already valid JSON.
pub fn direct(text: &str, _kind: ResponseKind) -> Option<JsonMap> {
    parse_object(text)
}

/// Strategy 2: fix common structural damage, then parse.
pub fn cleaned(text: &str, _kind: ResponseKind) -> Option<JsonMap> {
    parse_object(&clean_json(text))
}

/// Strategy 3: parse the object inside a fenced code block.
pub fn fenced(text: &str, _kind: ResponseKind) -> Option<JsonMap> {
    let block = FENCED_OBJECT.captures(text)?.get(1)?.as_str();
    parse_object(block).or_else(|| parse_object(&clean_json(block)))
}

/// Strategy 4: parse the span between the first `{` and the last `}`.
pub fn braced(text: &str, _kind: ResponseKind) -> Option<JsonMap> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let span = &text[start..=end];
    parse_object(span).or_else(|| parse_object(&clean_json(span)))
}

/// Strategy 5: extract each expected field of `kind` independently.
///
/// Returns `None` when no field could be recovered.
pub fn salvage(text: &str, kind: ResponseKind) -> Option<JsonMap> {
    let mut map = JsonMap::new();
    for &(field, shape) in kind.expected_fields() {
        let value = match shape {
            FieldShape::Text => salvage_text(text, field),
            FieldShape::List => salvage_list(text, field),
            FieldShape::Number => salvage_number(text, field),
            FieldShape::Flag => salvage_flag(text, field),
        };
        if let Some(value) = value {
            map.insert(field.to_string(), value);
        }
    }
    (!map.is_empty()).then_some(map)
}

fn field_regex(field: &str, value_pattern: &str) -> Option<Regex> {
    Regex::new(&format!(
        r#"(?s)"{}"\s*:\s*{}"#,
        regex::escape(field),
        value_pattern
    ))
    .ok()
}

fn salvage_text(text: &str, field: &str) -> Option<Value> {
    // runs to the closing quote, or to the end of a truncated response
    let re = field_regex(field, r#""((?:[^"\\]|\\.)*)"#)?;
    let raw = re.captures(text)?.get(1)?.as_str();
    let value = unescape(raw);
    (!value.trim().is_empty()).then(|| Value::String(value))
}

fn salvage_list(text: &str, field: &str) -> Option<Value> {
    let re = field_regex(field, r"\[(.*?)\]")?;
    let inner = re.captures(text)?.get(1)?.as_str();
    let array_text = format!("[{inner}]");
    if let Ok(value @ Value::Array(_)) = serde_json::from_str::<Value>(&array_text) {
        return Some(value);
    }
    if let Ok(value @ Value::Array(_)) = serde_json::from_str::<Value>(&clean_json(&array_text)) {
        return Some(value);
    }
    let items: Vec<Value> = QUOTED_ITEM
        .captures_iter(inner)
        .filter_map(|c| c.get(1))
        .map(|m| Value::String(unescape(m.as_str())))
        .collect();
    Some(Value::Array(items))
}

fn salvage_number(text: &str, field: &str) -> Option<Value> {
    let re = field_regex(field, r"(-?\d+(?:\.\d+)?)")?;
    let raw = re.captures(text)?.get(1)?.as_str();
    raw.parse::<f64>().ok().map(Value::from)
}

fn salvage_flag(text: &str, field: &str) -> Option<Value> {
    let re = field_regex(field, r"(true|false)")?;
    let raw = re.captures(text)?.get(1)?.as_str();
    Some(Value::Bool(raw == "true"))
}

/// Decode JSON string escapes, tolerating malformed sequences.
fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| {
        raw.replace("\\n", "\n")
            .replace("\\t", "\t")
            .replace("\\r", "\r")
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    })
}

/// Repair common structural damage in near-JSON text.
///
/// Escapes raw control characters inside string literals, removes trailing
/// commas before `}`/`]`, drops unmatched closers, terminates an unclosed
/// string, and closes any brackets still open at the end.
pub fn clean_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.trim().chars() {
        if in_string {
            if escaped {
                out.push(ch);
                escaped = false;
                continue;
            }
            match ch {
                '\\' => {
                    out.push(ch);
                    escaped = true;
                }
                '"' => {
                    out.push(ch);
                    in_string = false;
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '{' => {
                closers.push('}');
                out.push(ch);
            }
            '[' => {
                closers.push(']');
                out.push(ch);
            }
            '}' | ']' => {
                if closers.last() == Some(&ch) {
                    closers.pop();
                    strip_trailing_comma(&mut out);
                    out.push(ch);
                }
            }
            c => out.push(c),
        }
    }

    if escaped {
        out.pop();
    }
    if in_string {
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        strip_trailing_comma(&mut out);
        out.push(closer);
    }
    out
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    }
}
