//! Hierarchical hyperparameter resolution.
//!
//! Three levels, lowest to highest precedence:
//! 1. `training_defaults`: global
//! 2. `model_defaults[model]`: per model family
//! 3. `timeframes[tf][model].hyperparameters`: per (timeframe, model) overrides
//!
//! Merging is shallow: an object-valued entry at a higher level replaces the
//! lower one wholesale. Edits only ever land in level 3, so clearing level 3
//! is "reset to defaults".

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::coerce::{coerce_like, is_blank, ParseError, ValueKind};
use crate::domain::{ConfigDocument, ModelType, Timeframe, ValueMap};

/// Which level supplied a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Default,
    Model,
    Override,
}

/// One effective hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedParam {
    pub key: String,
    pub value: Value,
    pub level: Level,
}

/// Effective hyperparameters for a (timeframe, model) pair, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedParams {
    entries: Vec<ResolvedParam>,
}

impl ResolvedParams {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entry(key).map(|e| &e.value)
    }

    pub fn entry(&self, key: &str) -> Option<&ResolvedParam> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedParam> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten into a plain ordered map.
    pub fn to_map(&self) -> ValueMap {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }
}

/// The three levels for one (timeframe, model) pair, any of which may be missing.
struct Levels<'a> {
    defaults: &'a ValueMap,
    model: Option<&'a ValueMap>,
    overrides: Option<&'a ValueMap>,
}

impl<'a> Levels<'a> {
    fn of(doc: &'a ConfigDocument, tf: &Timeframe, model: &ModelType) -> Self {
        Self {
            defaults: &doc.training_defaults,
            model: doc.model_defaults.get(model),
            overrides: doc.model_config(tf, model).map(|c| &c.hyperparameters),
        }
    }

    /// Lowest-level non-null definition of `key`: the type source of truth.
    fn reference(&self, key: &str) -> Option<&'a Value> {
        [Some(self.defaults), self.model, self.overrides]
            .into_iter()
            .flatten()
            .filter_map(|level| level.get(key))
            .find(|v| !v.is_null())
    }
}

/// Compute the effective hyperparameters for `(tf, model)`.
///
/// Key order: default keys in declaration order, then model-only keys, then
/// override-only keys. The highest level defining a key supplies its value.
pub fn resolve(doc: &ConfigDocument, tf: &Timeframe, model: &ModelType) -> ResolvedParams {
    let levels = Levels::of(doc, tf, model);
    let mut entries: Vec<ResolvedParam> = Vec::new();

    let tiers = [
        (Level::Default, Some(levels.defaults)),
        (Level::Model, levels.model),
        (Level::Override, levels.overrides),
    ];
    for (level, map) in tiers {
        let Some(map) = map else { continue };
        for (key, value) in map {
            match entries.iter().position(|e| &e.key == key) {
                Some(i) => {
                    entries[i].value = value.clone();
                    entries[i].level = level;
                }
                None => entries.push(ResolvedParam {
                    key: key.clone(),
                    value: value.clone(),
                    level,
                }),
            }
        }
    }

    ResolvedParams { entries }
}

/// Write `key` into the override level of `(tf, model)`.
///
/// The value is coerced to the type of the lowest level that defines the key.
/// Blank input (null, or empty text for a non-text key) removes the override
/// instead. On a [`ParseError`] the document is not touched.
pub fn update(
    doc: &ConfigDocument,
    tf: &Timeframe,
    model: &ModelType,
    key: &str,
    input: Value,
) -> Result<ConfigDocument, ParseError> {
    let reference = Levels::of(doc, tf, model).reference(key).cloned();
    let reference_kind = reference.as_ref().and_then(ValueKind::of);

    if input.is_null() || (is_blank(&input) && reference_kind != Some(ValueKind::Text)) {
        return Ok(clear_override(doc, tf, model, key));
    }

    let value = match &reference {
        Some(reference) => coerce_like(reference, key, input)?,
        None => input,
    };

    debug!(timeframe = %tf, model = %model, key, value = %value, "hyperparameter override set");
    let mut next = doc.clone();
    next.model_config_mut(tf, model)
        .hyperparameters
        .insert(key.to_string(), value);
    Ok(next)
}

/// Remove `key` from the override level, reverting it to the inherited value.
pub fn clear_override(
    doc: &ConfigDocument,
    tf: &Timeframe,
    model: &ModelType,
    key: &str,
) -> ConfigDocument {
    let mut next = doc.clone();
    if let Some(config) = next
        .timeframes
        .get_mut(tf)
        .and_then(|models| models.get_mut(model))
    {
        if config.hyperparameters.remove(key).is_some() {
            debug!(timeframe = %tf, model = %model, key, "hyperparameter override cleared");
        }
    }
    next
}

/// Drop every override for `(tf, model)`.
pub fn reset_overrides(doc: &ConfigDocument, tf: &Timeframe, model: &ModelType) -> ConfigDocument {
    let mut next = doc.clone();
    if let Some(config) = next
        .timeframes
        .get_mut(tf)
        .and_then(|models| models.get_mut(model))
    {
        config.hyperparameters.clear();
    }
    next
}

/// How a shell should render the input for a hyperparameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputKind {
    Boolean,
    Number {
        step: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    Text,
    Structured,
}

impl InputKind {
    /// Pick an input for `key` from its current value, with step heuristics by name.
    pub fn for_param(key: &str, value: &Value) -> Self {
        let lower = key.to_ascii_lowercase();
        let number = |step| InputKind::Number {
            step,
            min: None,
            max: None,
        };
        match value {
            Value::Bool(_) => InputKind::Boolean,
            Value::String(_) => InputKind::Text,
            Value::Array(_) | Value::Object(_) => InputKind::Structured,
            Value::Number(_) | Value::Null => {
                if lower.contains("lr") || lower.contains("learning_rate") {
                    number(0.0001)
                } else if lower.contains("dropout") || lower.contains("tau") {
                    InputKind::Number {
                        step: 0.01,
                        min: Some(0.0),
                        max: Some(1.0),
                    }
                } else if lower.contains("threshold") {
                    number(0.001)
                } else {
                    number(1.0)
                }
            }
        }
    }
}

/// Human label for a snake_case key: `batch_size` → `Batch Size`.
pub fn label(key: &str) -> String {
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> ConfigDocument {
        serde_json::from_value(json!({
            "version": "1",
            "updated": "2025-01-01",
            "training_defaults": {
                "lr": 0.001,
                "epochs": 50,
                "shuffle": true,
                "class_weights": {"0": 1.0},
            },
            "model_defaults": {"LSTM": {"epochs": 80, "units": 128}},
            "timeframes": {"m5": {"LSTM": {"hyperparameters": {"lr": 0.01, "patience": 5}}}},
        }))
        .unwrap()
    }

    fn sel() -> (Timeframe, ModelType) {
        (Timeframe::from("m5"), ModelType::from("LSTM"))
    }

    #[test]
    fn resolution_order_and_precedence() {
        let (tf, model) = sel();
        let resolved = resolve(&doc(), &tf, &model);
        let keys: Vec<&str> = resolved.keys().collect();
        assert_eq!(keys, vec!["lr", "epochs", "shuffle", "class_weights", "units", "patience"]);
        assert_eq!(resolved.get("lr"), Some(&json!(0.01)));
        assert_eq!(resolved.entry("lr").unwrap().level, Level::Override);
        assert_eq!(resolved.get("epochs"), Some(&json!(80)));
        assert_eq!(resolved.entry("epochs").unwrap().level, Level::Model);
        assert_eq!(resolved.entry("shuffle").unwrap().level, Level::Default);
    }

    #[test]
    fn missing_model_node_resolves_to_defaults() {
        let resolved = resolve(&doc(), &Timeframe::from("d1"), &ModelType::from("Transformer"));
        assert_eq!(resolved.to_map(), doc().training_defaults);
    }

    #[test]
    fn update_coerces_to_lowest_level_type() {
        let (tf, model) = sel();
        let next = update(&doc(), &tf, &model, "epochs", json!("120")).unwrap();
        let overrides = &next.model_config(&tf, &model).unwrap().hyperparameters;
        assert_eq!(overrides["epochs"], json!(120));
        assert_eq!(next.training_defaults, doc().training_defaults);
        assert_eq!(next.model_defaults, doc().model_defaults);

        let next = update(&next, &tf, &model, "shuffle", json!("false")).unwrap();
        assert_eq!(resolve(&next, &tf, &model).get("shuffle"), Some(&json!(false)));
    }

    #[test]
    fn structured_parse_failure_leaves_document_untouched() {
        let (tf, model) = sel();
        let original = doc();
        let err = update(&original, &tf, &model, "class_weights", json!("{bad")).unwrap_err();
        assert_eq!(err.field, "class_weights");
        assert_eq!(original, doc());
    }

    #[test]
    fn blank_input_clears_the_override() {
        let (tf, model) = sel();
        let next = update(&doc(), &tf, &model, "lr", json!("")).unwrap();
        assert_eq!(resolve(&next, &tf, &model).get("lr"), Some(&json!(0.001)));
    }

    #[test]
    fn unknown_key_is_stored_verbatim() {
        let (tf, model) = sel();
        let next = update(&doc(), &tf, &model, "optimizer", json!("adamw")).unwrap();
        assert_eq!(resolve(&next, &tf, &model).get("optimizer"), Some(&json!("adamw")));
    }

    #[test]
    fn reset_overrides_restores_defaults() {
        let (tf, model) = sel();
        let next = reset_overrides(&doc(), &tf, &model);
        let resolved = resolve(&next, &tf, &model);
        assert_eq!(resolved.get("lr"), Some(&json!(0.001)));
        assert!(resolved.get("patience").is_none());
    }

    #[test]
    fn input_kind_heuristics() {
        assert_eq!(InputKind::for_param("shuffle", &json!(true)), InputKind::Boolean);
        assert_eq!(
            InputKind::for_param("dropout", &json!(0.2)),
            InputKind::Number { step: 0.01, min: Some(0.0), max: Some(1.0) }
        );
        assert_eq!(
            InputKind::for_param("zigzag_threshold", &json!(0.5)),
            InputKind::Number { step: 0.001, min: None, max: None }
        );
        assert_eq!(InputKind::for_param("class_weights", &json!({})), InputKind::Structured);
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(label("batch_size"), "Batch Size");
        assert_eq!(label("lr"), "Lr");
    }
}
