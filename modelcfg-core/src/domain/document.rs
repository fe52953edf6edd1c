//! The configuration document and its per-(timeframe, model) nodes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::ids::{ModelType, Timeframe};

/// Flat key → value table (hyperparameters, layer params). Keeps declaration order.
pub type ValueMap = Map<String, Value>;

/// Per-timeframe model nodes.
pub type TimeframeModels = BTreeMap<ModelType, ModelConfig>;

/// Root of the training configuration.
///
/// Every field defaults when absent or wrongly shaped so that partially formed
/// documents still load; the validation engine is what reports them. Only a
/// root that is not a document shape fails to decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub updated: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub feature_catalog: Vec<FeatureDefinition>,
    #[serde(default, deserialize_with = "lenient")]
    pub training_defaults: ValueMap,
    #[serde(default, deserialize_with = "lenient_map")]
    pub model_defaults: BTreeMap<ModelType, ValueMap>,
    #[serde(default, deserialize_with = "lenient_timeframes")]
    pub timeframes: BTreeMap<Timeframe, TimeframeModels>,
}

impl ConfigDocument {
    pub fn model_config(&self, tf: &Timeframe, model: &ModelType) -> Option<&ModelConfig> {
        self.timeframes.get(tf).and_then(|models| models.get(model))
    }

    /// Mutable access to a model node, creating the timeframe and model entries if absent.
    pub fn model_config_mut(&mut self, tf: &Timeframe, model: &ModelType) -> &mut ModelConfig {
        self.timeframes
            .entry(tf.clone())
            .or_default()
            .entry(model.clone())
            .or_default()
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureDefinition> {
        self.feature_catalog.iter().find(|f| f.name == name)
    }

    /// All (timeframe, model) pairs in map order.
    pub fn selections(&self) -> impl Iterator<Item = (&Timeframe, &ModelType)> {
        self.timeframes
            .iter()
            .flat_map(|(tf, models)| models.keys().map(move |m| (tf, m)))
    }

    /// Model types appearing anywhere in the document, sorted and de-duplicated.
    pub fn model_types(&self) -> Vec<ModelType> {
        let mut models: Vec<ModelType> = self
            .model_defaults
            .keys()
            .chain(self.timeframes.values().flat_map(|m| m.keys()))
            .cloned()
            .collect();
        models.sort();
        models.dedup();
        models
    }
}

/// Immutable catalog entry describing one input feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureDefinition {
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub callback_params_default: Value,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub prescaler_default: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub prescaler_params_default: Value,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub scaler_default: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub scaler_params_default: Value,
    #[serde(default, deserialize_with = "lenient")]
    pub default_enabled: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// Configuration node for one (timeframe, model) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Highest-precedence hyperparameter level.
    #[serde(default, deserialize_with = "lenient")]
    pub hyperparameters: ValueMap,
    #[serde(default, deserialize_with = "lenient_list")]
    pub features: Vec<FeatureOverlay>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub architecture: Vec<Layer>,
}

impl ModelConfig {
    pub fn overlay(&self, name: &str) -> Option<&FeatureOverlay> {
        self.features.iter().find(|o| o.name == name)
    }
}

/// Sparse per-(timeframe, model) override of a catalog feature.
///
/// Absent fields inherit the catalog default at read time and are not written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureOverlay {
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_params: Option<Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub prescaler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescaler_params: Option<Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub scaler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler_params: Option<Value>,
}

impl FeatureOverlay {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Persisted form of one architecture stage: block type plus parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub layer_type: String,
    #[serde(default, deserialize_with = "lenient")]
    pub params: ValueMap,
}

impl Layer {
    pub fn new(layer_type: impl Into<String>) -> Self {
        Self {
            layer_type: layer_type.into(),
            params: ValueMap::new(),
        }
    }
}

/// YAML round-trips turn `version: 2` into a number; accept either form.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// `T` if the value has its shape, otherwise `T::default()`.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Elements of a list that have the element shape; a non-list is empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(list_items(Value::deserialize(deserializer)?))
}

fn lenient_map<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
where
    D: Deserializer<'de>,
    K: Ord + From<String>,
    V: DeserializeOwned,
{
    Ok(object_entries(Value::deserialize(deserializer)?))
}

/// A timeframe whose value is not an object keeps its key with no models.
fn lenient_timeframes<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<Timeframe, TimeframeModels>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(timeframes) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(timeframes
        .into_iter()
        .map(|(tf, models)| (Timeframe::from(tf), object_entries(models)))
        .collect())
}

fn list_items<T: DeserializeOwned>(value: Value) -> Vec<T> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn object_entries<K, V>(value: Value) -> BTreeMap<K, V>
where
    K: Ord + From<String>,
    V: DeserializeOwned,
{
    match value {
        Value::Object(entries) => entries
            .into_iter()
            .filter_map(|(key, item)| Some((K::from(key), serde_json::from_value(item).ok()?)))
            .collect(),
        _ => BTreeMap::new(),
    }
}
