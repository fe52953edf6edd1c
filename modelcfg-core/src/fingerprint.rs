//! Document fingerprinting for dirty detection.
//!
//! The hash covers the canonical persisted JSON: object keys sorted at every
//! depth, so two documents that differ only in key order hash the same.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::domain::ConfigDocument;

/// BLAKE3 hex digest of a document's canonical JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentHash(pub String);

impl DocumentHash {
    pub fn of(doc: &ConfigDocument) -> Self {
        // Every map in the document is keyed by strings, so this cannot fail.
        let value = serde_json::to_value(doc).expect("ConfigDocument must serialize");
        Self::of_value(&value)
    }

    pub fn of_value(value: &Value) -> Self {
        let canonical = canonicalize(value).to_string();
        Self(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for DocumentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_the_hash() {
        let a = json!({"lr": 0.01, "nested": {"x": 1, "y": [1, {"b": 2, "a": 1}]}});
        let b = json!({"nested": {"y": [1, {"a": 1, "b": 2}], "x": 1}, "lr": 0.01});
        assert_eq!(DocumentHash::of_value(&a), DocumentHash::of_value(&b));
    }

    #[test]
    fn any_edit_changes_the_hash() {
        let mut doc = ConfigDocument::default();
        let before = DocumentHash::of(&doc);
        doc.training_defaults.insert("epochs".into(), json!(10));
        assert_ne!(before, DocumentHash::of(&doc));
    }

    #[test]
    fn digest_is_hex() {
        let hash = DocumentHash::of(&ConfigDocument::default());
        assert_eq!(hash.0.len(), 64);
        assert_eq!(hash.short().len(), 12);
        assert!(hash.0.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
