// ABOUTME: Stable serialization and SHA-256 fingerprinting of raw records
// ABOUTME: Object keys are sorted so semantically equal payloads hash identically

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub type RawRecord = Map<String, Value>;

/// Hex SHA-256 of the stable encoding of `payload`.
pub fn checksum(payload: &RawRecord) -> String {
    let mut encoded = String::new();
    write_object(payload, &mut encoded);
    digest_hex(&encoded)
}

pub fn checksum_value(value: &Value) -> String {
    digest_hex(&stable_stringify(value))
}

/// Deterministic JSON text: sorted object keys, arrays in order, scalars as JSON literals.
/// Dates reach the engine as ISO-8601 strings and are encoded like any other string.
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn digest_hex(encoded: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        // Scalars: serde_json's literal form. Serializing a scalar cannot fail.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_value(&map[key], out);
    }
    out.push('}');
}
