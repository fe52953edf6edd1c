//! Ordered layer-pipeline editor.
//!
//! Holds the layer list of the active (timeframe, model) as identity-stable
//! nodes. Ids are session-local: they come from the builder's own
//! [`IdGenerator`], are stripped by [`ArchitectureBuilder::to_persisted`], and
//! are regenerated whenever the builder rehydrates from a persisted list.

use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use super::schema::schema_for;
use crate::coerce::{coerce, ParseError};
use crate::domain::{IdGenerator, Layer, LayerId, ValueMap};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error("index {index} out of range for {len} layers")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no layer with id {0}")]
    UnknownNode(LayerId),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// One stage of the pipeline, with its session-local id.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNode {
    pub id: LayerId,
    pub layer_type: String,
    pub params: ValueMap,
}

impl LayerNode {
    pub fn to_layer(&self) -> Layer {
        Layer {
            layer_type: self.layer_type.clone(),
            params: self.params.clone(),
        }
    }

    /// False for types outside the schema table; such nodes round-trip untouched.
    pub fn has_schema(&self) -> bool {
        schema_for(&self.layer_type).is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArchitectureBuilder {
    nodes: Vec<LayerNode>,
    ids: IdGenerator,
    expanded: HashSet<LayerId>,
}

impl ArchitectureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_persisted(layers: &[Layer]) -> Self {
        let mut builder = Self::new();
        builder.rehydrate(layers);
        builder
    }

    pub fn nodes(&self) -> &[LayerNode] {
        &self.nodes
    }

    pub fn node(&self, id: LayerId) -> Option<&LayerNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a new `block_type` node at `at_index` (append when `None` or past the end).
    ///
    /// Params start from the schema defaults; a type outside the schema table
    /// is accepted with empty params.
    pub fn add_node(&mut self, block_type: &str, at_index: Option<usize>) -> LayerId {
        let params = schema_for(block_type)
            .map(|s| s.default_params())
            .unwrap_or_default();
        let id = self.ids.next_id();
        let index = at_index.unwrap_or(self.nodes.len()).min(self.nodes.len());
        self.nodes.insert(
            index,
            LayerNode {
                id,
                layer_type: block_type.to_string(),
                params,
            },
        );
        debug!(%id, block_type, index, "layer added");
        id
    }

    /// Remove the node at `from`, then insert it at `to` in the shortened list.
    pub fn move_node(&mut self, from: usize, to: usize) -> Result<(), BuilderError> {
        let len = self.nodes.len();
        for index in [from, to] {
            if index >= len {
                return Err(BuilderError::IndexOutOfRange { index, len });
            }
        }
        if from == to {
            return Ok(());
        }
        let node = self.nodes.remove(from);
        self.nodes.insert(to, node);
        debug!(from, to, "layer moved");
        Ok(())
    }

    pub fn remove_node(&mut self, id: LayerId) -> Result<LayerNode, BuilderError> {
        let index = self.index_of(id)?;
        self.expanded.remove(&id);
        debug!(%id, "layer removed");
        Ok(self.nodes.remove(index))
    }

    /// Set `key` on node `id`.
    ///
    /// Declared parameters are coerced to their schema kind; anything else is
    /// stored verbatim. On a parse failure the node is left unchanged.
    pub fn update_param(
        &mut self,
        id: LayerId,
        key: &str,
        value: Value,
    ) -> Result<(), BuilderError> {
        let index = self.index_of(id)?;
        let node = &mut self.nodes[index];
        let value = match schema_for(&node.layer_type).and_then(|s| s.param(key)) {
            Some(spec) => coerce(spec.kind, key, value)?,
            None => value,
        };
        node.params.insert(key.to_string(), value);
        Ok(())
    }

    pub fn toggle_expanded(&mut self, id: LayerId) -> Result<bool, BuilderError> {
        self.index_of(id)?;
        if self.expanded.remove(&id) {
            Ok(false)
        } else {
            self.expanded.insert(id);
            Ok(true)
        }
    }

    pub fn is_expanded(&self, id: LayerId) -> bool {
        self.expanded.contains(&id)
    }

    /// Id-stripped projection written back into `ModelConfig.architecture`.
    pub fn to_persisted(&self) -> Vec<Layer> {
        self.nodes.iter().map(LayerNode::to_layer).collect()
    }

    /// Bring the builder in line with an externally changed persisted list.
    ///
    /// Only when the current projection differs structurally from `persisted`
    /// are nodes replaced (with fresh ids) and expansion state dropped; an
    /// equal list keeps ids and expansion intact. Returns whether it rehydrated.
    pub fn reconcile(&mut self, persisted: &[Layer]) -> bool {
        if layers_equivalent(&self.to_persisted(), persisted) {
            return false;
        }
        self.rehydrate(persisted);
        debug!(layers = persisted.len(), "architecture rehydrated");
        true
    }

    fn rehydrate(&mut self, layers: &[Layer]) {
        let ids = &mut self.ids;
        self.nodes = layers
            .iter()
            .map(|layer| LayerNode {
                id: ids.next_id(),
                layer_type: layer.layer_type.clone(),
                params: layer.params.clone(),
            })
            .collect();
        self.expanded.clear();
    }

    fn index_of(&self, id: LayerId) -> Result<usize, BuilderError> {
        self.nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(BuilderError::UnknownNode(id))
    }
}

/// Structural equality of two persisted layer lists: same order, same types,
/// equivalent params.
pub fn layers_equivalent(a: &[Layer], b: &[Layer]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.layer_type == y.layer_type && maps_equivalent(&x.params, &y.params)
        })
}

/// Structural equality of JSON values: numbers compare by numeric value
/// (`1` equals `1.0`) and object key order is ignored.
pub fn values_equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equivalent(p, q))
        }
        (Value::Object(x), Value::Object(y)) => maps_equivalent(x, y),
        _ => a == b,
    }
}

fn maps_equivalent(a: &ValueMap, b: &ValueMap) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(k, v)| b.get(k).is_some_and(|w| values_equivalent(v, w)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer(t: &str, params: Value) -> Layer {
        Layer {
            layer_type: t.into(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn add_uses_schema_defaults() {
        let mut b = ArchitectureBuilder::new();
        let id = b.add_node("Dropout", None);
        assert_eq!(b.node(id).unwrap().params["rate"], json!(0.5));
    }

    #[test]
    fn unknown_type_is_kept_with_empty_params() {
        let mut b = ArchitectureBuilder::new();
        let id = b.add_node("Conv1D", None);
        let node = b.node(id).unwrap();
        assert!(node.params.is_empty());
        assert!(!node.has_schema());
        assert_eq!(b.to_persisted(), vec![layer("Conv1D", json!({}))]);
    }

    #[test]
    fn add_at_index_inserts_and_clamps() {
        let mut b = ArchitectureBuilder::new();
        b.add_node("Dense", None);
        b.add_node("Flatten", Some(0));
        b.add_node("Add", Some(99));
        let types: Vec<String> = b.to_persisted().into_iter().map(|l| l.layer_type).collect();
        assert_eq!(types, vec!["Flatten", "Dense", "Add"]);
    }

    #[test]
    fn move_out_of_range_is_rejected() {
        let mut b = ArchitectureBuilder::new();
        b.add_node("Dense", None);
        assert_eq!(
            b.move_node(0, 1),
            Err(BuilderError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(b.move_node(0, 0), Ok(()));
    }

    #[test]
    fn update_param_coerces_declared_keys_only() {
        let mut b = ArchitectureBuilder::new();
        let id = b.add_node("LSTM", None);
        b.update_param(id, "units", json!("256")).unwrap();
        b.update_param(id, "return_sequences", json!("false")).unwrap();
        b.update_param(id, "kernel_initializer", json!("glorot_uniform")).unwrap();
        let params = &b.node(id).unwrap().params;
        assert_eq!(params["units"], json!(256));
        assert_eq!(params["return_sequences"], json!(false));
        assert_eq!(params["kernel_initializer"], json!("glorot_uniform"));

        let err = b.update_param(id, "units", json!("lots")).unwrap_err();
        assert!(matches!(err, BuilderError::Parse(_)));
        assert_eq!(b.node(id).unwrap().params["units"], json!(256));
    }

    #[test]
    fn reconcile_keeps_ids_and_expansion_when_equal() {
        let mut b = ArchitectureBuilder::new();
        let id = b.add_node("Dense", None);
        b.toggle_expanded(id).unwrap();
        let persisted = vec![layer("Dense", json!({"activation": "relu", "units": 64.0}))];
        assert!(!b.reconcile(&persisted));
        assert_eq!(b.nodes()[0].id, id);
        assert!(b.is_expanded(id));
    }

    #[test]
    fn reconcile_rehydrates_with_fresh_ids_when_different() {
        let mut b = ArchitectureBuilder::new();
        let id = b.add_node("Dense", None);
        b.toggle_expanded(id).unwrap();
        let persisted = vec![layer("Dropout", json!({"rate": 0.3})), layer("Dense", json!({}))];
        assert!(b.reconcile(&persisted));
        assert_eq!(b.len(), 2);
        assert!(b.nodes().iter().all(|n| n.id != id));
        assert!(!b.is_expanded(b.nodes()[0].id));
        assert_eq!(b.to_persisted(), persisted);
    }

    #[test]
    fn remove_unknown_id_fails() {
        let mut b = ArchitectureBuilder::new();
        assert_eq!(
            b.remove_node(LayerId(7)).unwrap_err(),
            BuilderError::UnknownNode(LayerId(7))
        );
    }

    #[test]
    fn equivalence_ignores_key_order_and_number_repr() {
        assert!(values_equivalent(&json!({"a": 1, "b": [2.0]}), &json!({"b": [2], "a": 1.0})));
        assert!(!values_equivalent(&json!({"a": 1}), &json!({"a": 1, "b": null})));
        assert!(!values_equivalent(&json!("1"), &json!(1)));
    }
}
