//! Per-field parse errors.
//!
//! A malformed value only ever marks its own cell. Errors are keyed by
//! (section, row, field) and cleared by the next successful edit of that cell.

use modelcfg_core::Section;
use std::collections::HashMap;
use std::fmt;

/// Cell locator.
///
/// `row` is the hyperparameter key, the feature name, or the layer id;
/// `field` is `value` for hyperparameters, the overlay field for features and
/// the parameter key for layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub section: Section,
    pub row: String,
    pub field: String,
}

impl FieldKey {
    pub fn new(section: Section, row: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            section,
            row: row.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.section, self.row, self.field)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    errors: HashMap<FieldKey, String>,
}

impl FieldErrors {
    pub fn record(&mut self, key: FieldKey, message: impl Into<String>) {
        self.errors.insert(key, message.into());
    }

    pub fn clear(&mut self, key: &FieldKey) {
        self.errors.remove(key);
    }

    pub fn clear_all(&mut self) {
        self.errors.clear();
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&FieldKey) -> bool) {
        self.errors.retain(|key, _| keep(key));
    }

    pub fn get(&self, key: &FieldKey) -> Option<&str> {
        self.errors.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors sorted by their locator, for stable display.
    pub fn sorted(&self) -> Vec<(&FieldKey, &str)> {
        let mut entries: Vec<(&FieldKey, &str)> =
            self.errors.iter().map(|(k, v)| (k, v.as_str())).collect();
        entries.sort_by_key(|(k, _)| k.to_string());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_independent_per_cell() {
        let mut errors = FieldErrors::default();
        let a = FieldKey::new(Section::Features, "rsi", "callback_params");
        let b = FieldKey::new(Section::Features, "rsi", "scaler_params");
        errors.record(a.clone(), "invalid JSON");
        errors.record(b.clone(), "invalid JSON");
        errors.clear(&a);
        assert!(errors.get(&a).is_none());
        assert_eq!(errors.get(&b), Some("invalid JSON"));
        assert_eq!(b.to_string(), "features[rsi].scaler_params");
    }
}
