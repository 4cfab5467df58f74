// ABOUTME: Resolves a stable external id for a raw record
// ABOUTME: Natural keys come from a preferred field or a fallback list; otherwise the checksum

use serde_json::{Number, Value};
use std::fmt;
use tracing::warn;

use crate::checksum::{checksum, RawRecord};

/// Identity-like keys tried in order when a dataset names no id field.
pub const FALLBACK_ID_FIELDS: &[&str] = &[
    "sourceId", "id", "path", "number", "code", "document", "email", "name",
];

/// How a record's external id was obtained.
///
/// A `Fallback` id is the payload checksum, so a changed payload under a
/// fallback id shows up as a new record rather than an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalIdentity {
    Natural { field: String, value: String },
    Fallback(String),
}

impl ExternalIdentity {
    pub fn as_str(&self) -> &str {
        match self {
            ExternalIdentity::Natural { value, .. } => value,
            ExternalIdentity::Fallback(sum) => sum,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            ExternalIdentity::Natural { value, .. } => value,
            ExternalIdentity::Fallback(sum) => sum,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ExternalIdentity::Fallback(_))
    }
}

impl fmt::Display for ExternalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `None` only when `preferred_field` is set and holds no usable value.
pub fn resolve_external_id(
    record: &RawRecord,
    record_type: &str,
    index: usize,
    preferred_field: Option<&str>,
) -> Option<ExternalIdentity> {
    if let Some(field) = preferred_field {
        return usable_value(record.get(field)).map(|value| ExternalIdentity::Natural {
            field: field.to_string(),
            value,
        });
    }

    for field in FALLBACK_ID_FIELDS {
        if let Some(value) = usable_value(record.get(*field)) {
            return Some(ExternalIdentity::Natural {
                field: (*field).to_string(),
                value,
            });
        }
    }

    let sum = checksum(record);
    warn!(
        record_type = %record_type,
        index,
        checksum = %sum,
        "Record has no identity field; using payload checksum as external id"
    );
    Some(ExternalIdentity::Fallback(sum))
}

fn usable_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(number_to_id(n)),
        _ => None,
    }
}

// 7.0 stringifies as "7" so float-typed ids match their integer form.
fn number_to_id(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}
