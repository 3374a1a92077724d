//! Canonical JSON and input hashing
//!
//! Decision reproducibility rests on this module: the same logical input
//! must hash identically across runs, machines, and JSON key orderings.
//! Canonical form: UTF-8 NFC strings, object keys sorted lexicographically,
//! arrays in order, numbers in shortest round-trip form, no insignificant
//! whitespace.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

/// Render a value in canonical form.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// SHA-256 over the canonical bytes, as 64 lowercase hex chars.
pub fn inputs_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(value).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        // serde_json renders numbers via itoa/ryu: already shortest
        // round-trip
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            let normalized: String = s.nfc().collect();
            out.push_str(&serde_json::to_string(&normalized).expect("string serializes"));
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
        Value::Object(map) => {
            let sorted: BTreeMap<String, &Value> = map
                .iter()
                .map(|(k, v)| (k.nfc().collect::<String>(), v))
                .collect();
            out.push('{');
            for (i, (key, item)) in sorted.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("key serializes"));
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}
