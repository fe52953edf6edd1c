//! Document validation.
//!
//! Structural, referential and range checks over a whole document. Checks run
//! on the raw JSON so that documents the typed model would silently default
//! (missing keys, wrong shapes) are still reported. Every check runs; one
//! failure never hides another. Issues are advisory: nothing here blocks
//! editing, and only a caller about to persist decides what to do with them.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

use crate::domain::ConfigDocument;

/// Top-level keys every document must carry.
pub const REQUIRED_KEYS: &[&str] = &["version", "updated", "feature_catalog", "timeframes"];

/// Closed interval a numeric hyperparameter must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeRule {
    pub key: &'static str,
    pub min: f64,
    pub max: f64,
    /// Bounds as written in messages (`1e-7` rather than `0.0000001`).
    pub label: &'static str,
}

pub const RANGE_RULES: &[RangeRule] = &[
    RangeRule { key: "tau", min: 0.0, max: 1.0, label: "[0, 1]" },
    RangeRule { key: "dropout", min: 0.0, max: 1.0, label: "[0, 1]" },
    RangeRule { key: "lr", min: 1e-7, max: 1.0, label: "[1e-7, 1]" },
    RangeRule { key: "epochs", min: 1.0, max: 100_000.0, label: "[1, 100000]" },
    RangeRule { key: "batch_size", min: 1.0, max: 1_048_576.0, label: "[1, 1048576]" },
    RangeRule { key: "seq_len", min: 1.0, max: 100_000.0, label: "[1, 100000]" },
];

/// One finding. `path` is a dotted locator (`timeframes.m5.LSTM.features[2].name`)
/// and is the stable part; `message` is for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Collected issues of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IssueReport {
    issues: Vec<Issue>,
}

impl IssueReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

impl From<Vec<Issue>> for IssueReport {
    fn from(issues: Vec<Issue>) -> Self {
        Self { issues }
    }
}

impl fmt::Display for IssueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Validate a typed document.
pub fn validate(doc: &ConfigDocument) -> Vec<Issue> {
    match serde_json::to_value(doc) {
        Ok(value) => validate_value(&value),
        Err(e) => vec![Issue::new("document", format!("cannot be serialized: {e}"))],
    }
}

/// Validate a raw document as received over the wire.
pub fn validate_value(doc: &Value) -> Vec<Issue> {
    let mut issues = Vec::new();
    let Some(root) = doc.as_object() else {
        issues.push(Issue::new("document", "expected an object"));
        return issues;
    };

    // ── 1. Required keys ──
    for key in REQUIRED_KEYS {
        if !root.contains_key(*key) {
            issues.push(Issue::new(*key, "missing required key"));
        }
    }

    // ── 2. Catalog ──
    let catalog = check_catalog(root.get("feature_catalog"), &mut issues);

    // ── 3./4. Timeframes and per-(tf, model) nodes ──
    check_timeframes(root.get("timeframes"), &catalog, &mut issues);

    // ── 5. Ranges ──
    if let Some(defaults) = root.get("training_defaults").and_then(Value::as_object) {
        check_ranges("training_defaults", defaults, &mut issues);
    }
    if let Some(models) = root.get("model_defaults").and_then(Value::as_object) {
        for (model, params) in models {
            if let Some(params) = params.as_object() {
                check_ranges(&format!("model_defaults.{model}"), params, &mut issues);
            }
        }
    }
    if let Some(timeframes) = root.get("timeframes").and_then(Value::as_object) {
        for (tf, models) in timeframes {
            let Some(models) = models.as_object() else { continue };
            for (model, node) in models {
                if let Some(params) = node.get("hyperparameters").and_then(Value::as_object) {
                    let prefix = format!("timeframes.{tf}.{model}.hyperparameters");
                    check_ranges(&prefix, params, &mut issues);
                }
            }
        }
    }

    issues
}

/// Returns the set of valid catalog names for the referential checks.
fn check_catalog<'a>(catalog: Option<&'a Value>, issues: &mut Vec<Issue>) -> HashSet<&'a str> {
    let mut names = HashSet::new();
    let Some(catalog) = catalog else {
        return names;
    };
    let Some(entries) = catalog.as_array() else {
        issues.push(Issue::new("feature_catalog", "expected a list"));
        return names;
    };
    if entries.is_empty() {
        issues.push(Issue::new("feature_catalog", "must not be empty"));
    }
    for (i, entry) in entries.iter().enumerate() {
        let path = format!("feature_catalog[{i}].name");
        match entry.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => {
                if !names.insert(name) {
                    issues.push(Issue::new(path, format!("duplicate feature name '{name}'")));
                }
            }
            _ => issues.push(Issue::new(path, "missing feature name")),
        }
    }
    names
}

fn check_timeframes(timeframes: Option<&Value>, catalog: &HashSet<&str>, issues: &mut Vec<Issue>) {
    let Some(timeframes) = timeframes else { return };
    let Some(timeframes) = timeframes.as_object() else {
        issues.push(Issue::new("timeframes", "expected an object"));
        return;
    };
    if timeframes.is_empty() {
        issues.push(Issue::new("timeframes", "must not be empty"));
    }
    for (tf, models) in timeframes {
        let path = format!("timeframes.{tf}");
        match models.as_object() {
            None => issues.push(Issue::new(path, "expected an object")),
            Some(models) if models.is_empty() => {
                issues.push(Issue::new(path, "no models configured"))
            }
            Some(models) => {
                for (model, node) in models {
                    check_model_node(&format!("{path}.{model}"), node, catalog, issues);
                }
            }
        }
    }
}

fn check_model_node(path: &str, node: &Value, catalog: &HashSet<&str>, issues: &mut Vec<Issue>) {
    let Some(node) = node.as_object() else {
        issues.push(Issue::new(path, "expected an object"));
        return;
    };

    if let Some(features) = node.get("features") {
        match features.as_array() {
            None => issues.push(Issue::new(format!("{path}.features"), "expected a list")),
            Some(features) => check_overlays(path, features, catalog, issues),
        }
    }

    if let Some(architecture) = node.get("architecture") {
        match architecture.as_array() {
            None => issues.push(Issue::new(format!("{path}.architecture"), "expected a list")),
            Some(layers) => {
                for (i, layer) in layers.iter().enumerate() {
                    check_layer(&format!("{path}.architecture[{i}]"), layer, issues);
                }
            }
        }
    }
}

fn check_overlays(
    path: &str,
    features: &[Value],
    catalog: &HashSet<&str>,
    issues: &mut Vec<Issue>,
) {
    let mut seen = HashSet::new();
    for (i, overlay) in features.iter().enumerate() {
        let row = format!("{path}.features[{i}]");
        match overlay.get("name").and_then(Value::as_str) {
            Some(name) if catalog.contains(name) => {
                if !seen.insert(name) {
                    issues.push(Issue::new(
                        format!("{row}.name"),
                        format!("duplicate overlay '{name}'"),
                    ));
                }
            }
            _ => issues.push(Issue::new(
                format!("{row}.name"),
                "unknown or missing feature name",
            )),
        }
        if !overlay.get("enabled").is_some_and(Value::is_boolean) {
            issues.push(Issue::new(format!("{row}.enabled"), "expected a boolean"));
        }
    }
}

fn check_layer(path: &str, layer: &Value, issues: &mut Vec<Issue>) {
    let Some(layer) = layer.as_object() else {
        issues.push(Issue::new(path, "expected an object"));
        return;
    };
    if !layer.get("type").is_some_and(Value::is_string) {
        issues.push(Issue::new(format!("{path}.type"), "expected a string"));
    }
    if layer.get("params").is_some_and(|p| !p.is_object()) {
        issues.push(Issue::new(format!("{path}.params"), "expected an object"));
    }
}

fn check_ranges(prefix: &str, params: &Map<String, Value>, issues: &mut Vec<Issue>) {
    for rule in RANGE_RULES {
        let Some(value) = params.get(rule.key) else { continue };
        let Some(number) = value.as_f64() else { continue };
        if number < rule.min || number > rule.max {
            issues.push(Issue::new(
                format!("{prefix}.{}", rule.key),
                format!("out of range {}: {value}", rule.label),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "version": "1",
            "updated": "2025-01-01",
            "feature_catalog": [{"name": "rsi", "default_enabled": true}],
            "timeframes": {"m5": {"LSTM": {}}},
        })
    }

    fn paths(issues: &[Issue]) -> Vec<&str> {
        issues.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn minimal_document_is_clean() {
        assert!(validate_value(&minimal()).is_empty());
    }

    #[test]
    fn non_object_root_is_one_issue() {
        assert_eq!(paths(&validate_value(&json!([1, 2]))), vec!["document"]);
    }

    #[test]
    fn missing_keys_are_reported_in_order() {
        let issues = validate_value(&json!({"version": "1"}));
        assert_eq!(paths(&issues), vec!["updated", "feature_catalog", "timeframes"]);
    }

    #[test]
    fn catalog_problems_do_not_short_circuit() {
        let mut doc = minimal();
        doc["feature_catalog"] = json!([{"name": "rsi"}, {"name": "rsi"}, {"group": "x"}]);
        doc["timeframes"] = json!({"m5": {}});
        let issues = validate_value(&doc);
        assert_eq!(
            paths(&issues),
            vec!["feature_catalog[1].name", "feature_catalog[2].name", "timeframes.m5"]
        );
    }

    #[test]
    fn overlay_checks() {
        let mut doc = minimal();
        doc["timeframes"]["m5"]["LSTM"]["features"] = json!([
            {"name": "rsi", "enabled": true},
            {"name": "rsi", "enabled": "yes"},
            {"name": "vwap", "enabled": false},
        ]);
        let issues = validate_value(&doc);
        assert_eq!(
            paths(&issues),
            vec![
                "timeframes.m5.LSTM.features[1].name",
                "timeframes.m5.LSTM.features[1].enabled",
                "timeframes.m5.LSTM.features[2].name",
            ]
        );
        assert_eq!(issues[2].message, "unknown or missing feature name");
    }

    #[test]
    fn unknown_layer_types_pass_but_shapes_are_checked() {
        let mut doc = minimal();
        doc["timeframes"]["m5"]["LSTM"]["architecture"] = json!([
            {"type": "Conv1D", "params": {"filters": 32}},
            {"type": 7},
            {"type": "Dense", "params": []},
            "Flatten",
        ]);
        let issues = validate_value(&doc);
        assert_eq!(
            paths(&issues),
            vec![
                "timeframes.m5.LSTM.architecture[1].type",
                "timeframes.m5.LSTM.architecture[2].params",
                "timeframes.m5.LSTM.architecture[3]",
            ]
        );
    }

    #[test]
    fn range_violation_names_path_and_value() {
        let mut doc = minimal();
        doc["training_defaults"] = json!({"lr": 2, "epochs": 10, "batch_size": "big"});
        let issues = validate_value(&doc);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].to_string(), "training_defaults.lr: out of range [1e-7, 1]: 2");
    }

    #[test]
    fn ranges_are_checked_at_every_level() {
        let mut doc = minimal();
        doc["model_defaults"] = json!({"LSTM": {"dropout": 1.5}});
        doc["timeframes"]["m5"]["LSTM"]["hyperparameters"] = json!({"seq_len": 0});
        let issues = validate_value(&doc);
        assert_eq!(
            paths(&issues),
            vec!["model_defaults.LSTM.dropout", "timeframes.m5.LSTM.hyperparameters.seq_len"]
        );
    }

    #[test]
    fn report_lists_one_issue_per_line() {
        let report = IssueReport::from(vec![Issue::new("a", "x"), Issue::new("b", "y")]);
        assert!(!report.is_clean());
        assert_eq!(report.to_string(), "a: x\nb: y\n");
    }
}
