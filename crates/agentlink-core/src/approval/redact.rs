//! Redaction of tool arguments before they are shown to a human.
//!
//! Only the displayed preview is redacted. Cache keys and the actual call
//! always use the full arguments.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

const REDACTED: &str = "[REDACTED]";

/// Key fragments whose values are always masked (case-insensitive).
pub const SECRET_KEY_DENYLIST: &[&str] = &[
    "api_key",
    "apikey",
    "api-key",
    "token",
    "secret",
    "password",
    "passwd",
    "authorization",
    "cookie",
    "bearer",
    "credential",
    "private_key",
];

/// Secret-looking values masked wherever they appear.
static SECRET_VALUE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"sk-ant-[a-zA-Z0-9\-_]{20,}",
        r"sk-[a-zA-Z0-9]{20,}",
        r"gh[pousr]_[A-Za-z0-9_]{36,}",
        r"AKIA[A-Z0-9]{16}",
        r"(?i)bearer\s+[a-zA-Z0-9_.=\-]{8,}",
        r"-----BEGIN\s+(RSA\s+)?PRIVATE\s+KEY-----",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Bounds applied to the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedactionLimits {
    pub max_string_chars: usize,
    pub max_items: usize,
    pub max_depth: usize,
}

impl Default for RedactionLimits {
    fn default() -> Self {
        Self {
            max_string_chars: 512,
            max_items: 32,
            max_depth: 8,
        }
    }
}

/// A redacted preview plus the JSON paths that were masked.
#[derive(Debug, Clone, PartialEq)]
pub struct Redacted {
    pub value: Value,
    pub redactions: Vec<String>,
}

pub fn is_secret_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SECRET_KEY_DENYLIST.iter().any(|d| lower.contains(d))
}

/// Redact `args` with default limits.
pub fn redact_args(args: &Value) -> Redacted {
    redact_with_limits(args, RedactionLimits::default())
}

pub fn redact_with_limits(args: &Value, limits: RedactionLimits) -> Redacted {
    let mut redactions = Vec::new();
    let value = walk(args, "$", 0, &limits, &mut redactions);
    Redacted { value, redactions }
}

fn walk(
    value: &Value,
    path: &str,
    depth: usize,
    limits: &RedactionLimits,
    redactions: &mut Vec<String>,
) -> Value {
    if depth >= limits.max_depth && (value.is_object() || value.is_array()) {
        return Value::String("[depth limit]".into());
    }
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (i, (key, v)) in map.iter().enumerate() {
                if i >= limits.max_items {
                    out.insert(
                        "…".into(),
                        Value::String(format!("+{} more keys", map.len() - limits.max_items)),
                    );
                    break;
                }
                let child = format!("{path}.{key}");
                if is_secret_key(key) {
                    redactions.push(child);
                    out.insert(key.clone(), Value::String(REDACTED.into()));
                } else {
                    out.insert(key.clone(), walk(v, &child, depth + 1, limits, redactions));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out: Vec<Value> = items
                .iter()
                .take(limits.max_items)
                .enumerate()
                .map(|(i, v)| walk(v, &format!("{path}[{i}]"), depth + 1, limits, redactions))
                .collect();
            if items.len() > limits.max_items {
                out.push(Value::String(format!(
                    "+{} more items",
                    items.len() - limits.max_items
                )));
            }
            Value::Array(out)
        }
        Value::String(s) => {
            let mut text = s.clone();
            let mut masked = false;
            for re in SECRET_VALUE_PATTERNS.iter() {
                if re.is_match(&text) {
                    text = re.replace_all(&text, REDACTED).into_owned();
                    masked = true;
                }
            }
            if masked {
                redactions.push(path.to_string());
            }
            Value::String(truncate(&text, limits.max_string_chars))
        }
        other => other.clone(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{head}…[+{} chars]", count - max_chars)
}
