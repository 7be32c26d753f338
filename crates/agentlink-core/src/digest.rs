//! Canonical JSON serialization and SHA-256 digests.
//!
//! Object keys are sorted by UTF-16 code units (RFC 8785 §3.2.3) and
//! integer-valued floats collapse to integers, so two argument maps that differ
//! only in key order or `1` vs `1.0` produce the same bytes.

use serde_json::Value;
use sha2::{Digest, Sha256};

fn normalize_numbers(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_numbers(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(normalize_numbers).collect()),
        Value::Number(n) if !(n.is_i64() || n.is_u64()) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Value::Number(serde_json::Number::from(f as i64))
            }
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Compact canonical JSON text for `value`.
pub fn canonical_json(value: &Value) -> String {
    // Keys are ordered while writing; `serde_json::Map` may re-order on insert.
    let mut out = String::new();
    write_canonical(&normalize_numbers(value), &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// SHA-256 hex digest of the canonical JSON of `value`.
pub fn compute_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}
