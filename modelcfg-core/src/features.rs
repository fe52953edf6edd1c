//! Feature catalog × sparse overlay merging.
//!
//! The catalog is the immutable list of available input features. Each
//! (timeframe, model) node carries a sparse overlay list; every overlay field
//! that is absent falls back to the catalog default independently of the others.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::coerce::{is_blank, parse_structured, ParseError};
use crate::domain::{ConfigDocument, FeatureDefinition, FeatureOverlay, ModelType, Timeframe};

/// Bucket for catalog entries without a group. Always displayed last.
pub const OTHER_GROUP: &str = "Other";

/// Prescalers a shell offers. Other values are stored verbatim.
pub const PRESCALERS: &[&str] = &["pct_change", "log1p", "clip"];

/// Scalers a shell offers. Other values are stored verbatim.
pub const SCALERS: &[&str] = &["MinMaxScaler", "StandardScaler", "RobustScaler"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    #[error("feature '{name}' is not in the catalog")]
    UnknownFeature { name: String },
}

/// The five overlay fields that can override a catalog default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayField {
    CallbackParams,
    Prescaler,
    PrescalerParams,
    Scaler,
    ScalerParams,
}

impl OverlayField {
    pub const ALL: [OverlayField; 5] = [
        OverlayField::CallbackParams,
        OverlayField::Prescaler,
        OverlayField::PrescalerParams,
        OverlayField::Scaler,
        OverlayField::ScalerParams,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OverlayField::CallbackParams => "callback_params",
            OverlayField::Prescaler => "prescaler",
            OverlayField::PrescalerParams => "prescaler_params",
            OverlayField::Scaler => "scaler",
            OverlayField::ScalerParams => "scaler_params",
        }
    }

    /// Params fields hold JSON; the other two hold a plain name.
    pub fn is_structured(self) -> bool {
        matches!(
            self,
            OverlayField::CallbackParams
                | OverlayField::PrescalerParams
                | OverlayField::ScalerParams
        )
    }

    fn is_set(self, overlay: &FeatureOverlay) -> bool {
        match self {
            OverlayField::CallbackParams => overlay.callback_params.is_some(),
            OverlayField::Prescaler => overlay.prescaler.is_some(),
            OverlayField::PrescalerParams => overlay.prescaler_params.is_some(),
            OverlayField::Scaler => overlay.scaler.is_some(),
            OverlayField::ScalerParams => overlay.scaler_params.is_some(),
        }
    }
}

impl fmt::Display for OverlayField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OverlayField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OverlayField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown feature field '{s}'"))
    }
}

/// Display/edit row: a catalog entry with its overlay applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub name: String,
    pub group: String,
    pub callback: Option<String>,
    pub help: Option<String>,
    pub enabled: bool,
    pub callback_params: Value,
    pub prescaler: Option<String>,
    pub prescaler_params: Value,
    pub scaler: Option<String>,
    pub scaler_params: Value,
    /// Fields whose value comes from the overlay rather than the catalog.
    pub overridden: Vec<OverlayField>,
}

impl FeatureRow {
    fn merge(def: &FeatureDefinition, overlay: Option<&FeatureOverlay>) -> Self {
        let enabled = overlay
            .and_then(|o| o.enabled)
            .unwrap_or(def.default_enabled);
        let overridden = overlay
            .map(|o| {
                OverlayField::ALL
                    .into_iter()
                    .filter(|f| f.is_set(o))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: def.name.clone(),
            group: def
                .group
                .clone()
                .filter(|g| !g.trim().is_empty())
                .unwrap_or_else(|| OTHER_GROUP.to_string()),
            callback: def.callback.clone(),
            help: def.help.clone(),
            enabled,
            callback_params: overlay
                .and_then(|o| o.callback_params.clone())
                .unwrap_or_else(|| def.callback_params_default.clone()),
            prescaler: overlay
                .and_then(|o| o.prescaler.clone())
                .or_else(|| def.prescaler_default.clone()),
            prescaler_params: overlay
                .and_then(|o| o.prescaler_params.clone())
                .unwrap_or_else(|| def.prescaler_params_default.clone()),
            scaler: overlay
                .and_then(|o| o.scaler.clone())
                .or_else(|| def.scaler_default.clone()),
            scaler_params: overlay
                .and_then(|o| o.scaler_params.clone())
                .unwrap_or_else(|| def.scaler_params_default.clone()),
            overridden,
        }
    }

    pub fn is_overridden(&self, field: OverlayField) -> bool {
        self.overridden.contains(&field)
    }
}

/// Rows sharing a catalog group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureGroup {
    pub name: String,
    pub rows: Vec<FeatureRow>,
}

/// One row per catalog entry, in catalog order.
pub fn merged_rows(doc: &ConfigDocument, tf: &Timeframe, model: &ModelType) -> Vec<FeatureRow> {
    let config = doc.model_config(tf, model);
    doc.feature_catalog
        .iter()
        .map(|def| FeatureRow::merge(def, config.and_then(|c| c.overlay(&def.name))))
        .collect()
}

/// Rows bucketed by group: groups alphabetical, [`OTHER_GROUP`] last.
pub fn grouped_rows(doc: &ConfigDocument, tf: &Timeframe, model: &ModelType) -> Vec<FeatureGroup> {
    let mut groups: Vec<FeatureGroup> = Vec::new();
    for row in merged_rows(doc, tf, model) {
        match groups.iter().position(|g| g.name == row.group) {
            Some(i) => groups[i].rows.push(row),
            None => groups.push(FeatureGroup {
                name: row.group.clone(),
                rows: vec![row],
            }),
        }
    }
    groups.sort_by(|a, b| {
        (a.name == OTHER_GROUP)
            .cmp(&(b.name == OTHER_GROUP))
            .then_with(|| a.name.cmp(&b.name))
    });
    groups
}

/// Overlay names for `(tf, model)` that reference no catalog entry.
pub fn orphan_overlays(doc: &ConfigDocument, tf: &Timeframe, model: &ModelType) -> Vec<String> {
    doc.model_config(tf, model)
        .map(|c| {
            c.features
                .iter()
                .filter(|o| doc.feature(&o.name).is_none())
                .map(|o| o.name.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Change to a single overlay field.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldPatch<T> {
    #[default]
    Keep,
    /// Delete the override, reverting to the catalog default.
    Clear,
    Set(T),
}

impl<T: Clone> FieldPatch<T> {
    fn apply(&self, slot: &mut Option<T>) {
        match self {
            FieldPatch::Keep => {}
            FieldPatch::Clear => *slot = None,
            FieldPatch::Set(v) => *slot = Some(v.clone()),
        }
    }
}

/// Partial update to one overlay row. Untouched fields stay as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayPatch {
    pub enabled: Option<bool>,
    pub callback_params: FieldPatch<Value>,
    pub prescaler: FieldPatch<String>,
    pub prescaler_params: FieldPatch<Value>,
    pub scaler: FieldPatch<String>,
    pub scaler_params: FieldPatch<Value>,
}

impl OverlayPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Set a field from a JSON value. Null or blank text clears the override.
    pub fn set(mut self, field: OverlayField, value: Value) -> Self {
        if is_blank(&value) {
            return self.clear(field);
        }
        let name = |v: Value| match v {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        match field {
            OverlayField::CallbackParams => self.callback_params = FieldPatch::Set(value),
            OverlayField::Prescaler => self.prescaler = FieldPatch::Set(name(value)),
            OverlayField::PrescalerParams => self.prescaler_params = FieldPatch::Set(value),
            OverlayField::Scaler => self.scaler = FieldPatch::Set(name(value)),
            OverlayField::ScalerParams => self.scaler_params = FieldPatch::Set(value),
        }
        self
    }

    /// Set a field from raw text. Params fields must hold valid JSON.
    pub fn set_text(self, field: OverlayField, raw: &str) -> Result<Self, ParseError> {
        if raw.trim().is_empty() {
            return Ok(self.clear(field));
        }
        let value = if field.is_structured() {
            parse_structured(field.as_str(), raw)?
        } else {
            Value::String(raw.to_string())
        };
        Ok(self.set(field, value))
    }

    pub fn clear(mut self, field: OverlayField) -> Self {
        match field {
            OverlayField::CallbackParams => self.callback_params = FieldPatch::Clear,
            OverlayField::Prescaler => self.prescaler = FieldPatch::Clear,
            OverlayField::PrescalerParams => self.prescaler_params = FieldPatch::Clear,
            OverlayField::Scaler => self.scaler = FieldPatch::Clear,
            OverlayField::ScalerParams => self.scaler_params = FieldPatch::Clear,
        }
        self
    }

    fn apply_to(&self, overlay: &mut FeatureOverlay) {
        if let Some(enabled) = self.enabled {
            overlay.enabled = Some(enabled);
        }
        self.callback_params.apply(&mut overlay.callback_params);
        self.prescaler.apply(&mut overlay.prescaler);
        self.prescaler_params.apply(&mut overlay.prescaler_params);
        self.scaler.apply(&mut overlay.scaler);
        self.scaler_params.apply(&mut overlay.scaler_params);
    }
}

/// Create or shallow-merge the overlay row for `name`.
///
/// A new row is seeded with the catalog's `default_enabled` before the patch
/// is applied, so the row always carries an explicit `enabled`.
pub fn upsert(
    doc: &ConfigDocument,
    tf: &Timeframe,
    model: &ModelType,
    name: &str,
    patch: &OverlayPatch,
) -> Result<ConfigDocument, OverlayError> {
    let def = doc.feature(name).ok_or_else(|| OverlayError::UnknownFeature {
        name: name.to_string(),
    })?;
    let default_enabled = def.default_enabled;

    let mut next = doc.clone();
    let features = &mut next.model_config_mut(tf, model).features;
    match features.iter().position(|o| o.name == name) {
        Some(i) => patch.apply_to(&mut features[i]),
        None => {
            let mut overlay = FeatureOverlay {
                enabled: Some(default_enabled),
                ..FeatureOverlay::new(name)
            };
            patch.apply_to(&mut overlay);
            features.push(overlay);
        }
    }
    debug!(timeframe = %tf, model = %model, feature = name, "feature overlay upserted");
    Ok(next)
}

/// Replace the overlay list with one `{name, enabled: default_enabled}` per catalog entry.
pub fn reset(doc: &ConfigDocument, tf: &Timeframe, model: &ModelType) -> ConfigDocument {
    let mut next = doc.clone();
    let fresh: Vec<FeatureOverlay> = doc
        .feature_catalog
        .iter()
        .map(|def| FeatureOverlay {
            enabled: Some(def.default_enabled),
            ..FeatureOverlay::new(def.name.clone())
        })
        .collect();
    debug!(timeframe = %tf, model = %model, count = fresh.len(), "feature overlays reset");
    next.model_config_mut(tf, model).features = fresh;
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> ConfigDocument {
        serde_json::from_value(json!({
            "feature_catalog": [
                {"name": "rsi", "group": "RSI", "default_enabled": true,
                 "callback": "calc_rsi", "callback_params_default": {"period": 14}},
                {"name": "close", "group": "Price/Volatility", "default_enabled": true,
                 "scaler_default": "MinMaxScaler"},
                {"name": "is_syd", "default_enabled": false},
                {"name": "ema_short", "group": "EMA", "default_enabled": false},
            ],
            "timeframes": {"m5": {"LSTM": {}}},
        }))
        .unwrap()
    }

    fn sel() -> (Timeframe, ModelType) {
        (Timeframe::from("m5"), ModelType::from("LSTM"))
    }

    #[test]
    fn rows_fall_back_to_catalog_defaults() {
        let (tf, model) = sel();
        let rows = merged_rows(&doc(), &tf, &model);
        let rsi = &rows[0];
        assert_eq!(rsi.name, "rsi");
        assert!(rsi.enabled);
        assert!(rsi.overridden.is_empty());
        assert_eq!(rsi.callback_params, json!({"period": 14}));
        assert_eq!(rows[1].scaler.as_deref(), Some("MinMaxScaler"));
    }

    #[test]
    fn one_overridden_field_does_not_materialize_others() {
        let (tf, model) = sel();
        let patch = OverlayPatch::new().set(OverlayField::Scaler, json!("RobustScaler"));
        let next = upsert(&doc(), &tf, &model, "close", &patch).unwrap();

        let overlay = next.model_config(&tf, &model).unwrap().overlay("close").unwrap();
        assert_eq!(overlay.enabled, Some(true));
        assert_eq!(overlay.scaler.as_deref(), Some("RobustScaler"));
        assert!(overlay.prescaler.is_none());
        assert!(overlay.callback_params.is_none());

        let row = &merged_rows(&next, &tf, &model)[1];
        assert_eq!(row.overridden, vec![OverlayField::Scaler]);
    }

    #[test]
    fn clearing_a_field_reverts_to_default() {
        let (tf, model) = sel();
        let set = OverlayPatch::new().set(OverlayField::CallbackParams, json!({"period": 7}));
        let next = upsert(&doc(), &tf, &model, "rsi", &set).unwrap();
        assert_eq!(merged_rows(&next, &tf, &model)[0].callback_params, json!({"period": 7}));

        let clear = OverlayPatch::new().set(OverlayField::CallbackParams, json!(""));
        let next = upsert(&next, &tf, &model, "rsi", &clear).unwrap();
        let overlay = next.model_config(&tf, &model).unwrap().overlay("rsi").unwrap();
        assert!(overlay.callback_params.is_none());
        assert_eq!(merged_rows(&next, &tf, &model)[0].callback_params, json!({"period": 14}));
    }

    #[test]
    fn upsert_rejects_unknown_feature() {
        let (tf, model) = sel();
        let err = upsert(&doc(), &tf, &model, "vwap", &OverlayPatch::new()).unwrap_err();
        assert_eq!(err, OverlayError::UnknownFeature { name: "vwap".into() });
    }

    #[test]
    fn set_text_rejects_invalid_json_only_for_params_fields() {
        assert!(OverlayPatch::new()
            .set_text(OverlayField::ScalerParams, "{nope")
            .is_err());
        let patch = OverlayPatch::new()
            .set_text(OverlayField::Prescaler, "log1p")
            .unwrap();
        assert_eq!(patch.prescaler, FieldPatch::Set("log1p".to_string()));
    }

    #[test]
    fn groups_are_alphabetical_with_other_last() {
        let (tf, model) = sel();
        let names: Vec<String> = grouped_rows(&doc(), &tf, &model)
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["EMA", "Price/Volatility", "RSI", "Other"]);
    }

    #[test]
    fn reset_replaces_overlays_with_catalog_defaults() {
        let (tf, model) = sel();
        let patch = OverlayPatch::new()
            .enabled(true)
            .set(OverlayField::Scaler, json!("StandardScaler"));
        let edited = upsert(&doc(), &tf, &model, "is_syd", &patch).unwrap();
        let next = reset(&edited, &tf, &model);
        let features = &next.model_config(&tf, &model).unwrap().features;
        assert_eq!(features.len(), 4);
        let syd = features.iter().find(|o| o.name == "is_syd").unwrap();
        assert_eq!(syd, &FeatureOverlay { enabled: Some(false), ..FeatureOverlay::new("is_syd") });
    }

    #[test]
    fn orphans_are_reported() {
        let (tf, model) = sel();
        let mut d = doc();
        d.model_config_mut(&tf, &model).features.push(FeatureOverlay::new("gone"));
        assert_eq!(orphan_overlays(&d, &tf, &model), vec!["gone".to_string()]);
    }
}
