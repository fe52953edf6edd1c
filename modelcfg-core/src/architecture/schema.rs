//! Parameter schema table: one canonical definition per block type.
//!
//! The table is flat and independent of the model family: a `Dropout` block
//! has the same parameters whether it sits in an LSTM or a Transformer
//! pipeline. Which blocks a family *offers* is the separate block library.

use serde::Serialize;
use serde_json::Value;

use crate::coerce::ValueKind;
use crate::domain::{ModelType, ValueMap};

/// Compile-time default for a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamDefault {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(&'static str),
}

impl ParamDefault {
    pub fn to_value(self) -> Value {
        match self {
            ParamDefault::Int(v) => Value::from(v),
            ParamDefault::Float(v) => Value::from(v),
            ParamDefault::Bool(v) => Value::Bool(v),
            ParamDefault::Text(v) => Value::String(v.to_string()),
        }
    }
}

/// One declared, editable parameter of a block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ValueKind,
    pub default: ParamDefault,
}

/// Declared parameters of a block type, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockSchema {
    pub block_type: &'static str,
    pub params: &'static [ParamSpec],
}

impl BlockSchema {
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Fresh parameter map filled with the declared defaults.
    pub fn default_params(&self) -> ValueMap {
        self.params
            .iter()
            .map(|p| (p.name.to_string(), p.default.to_value()))
            .collect()
    }
}

const fn spec(
    name: &'static str,
    label: &'static str,
    kind: ValueKind,
    default: ParamDefault,
) -> ParamSpec {
    ParamSpec {
        name,
        label,
        kind,
        default,
    }
}

const ACTIVATION: ParamSpec = spec(
    "activation",
    "Activation",
    ValueKind::Text,
    ParamDefault::Text("relu"),
);

pub const PARAMETER_SCHEMAS: &[BlockSchema] = &[
    BlockSchema {
        block_type: "LSTM",
        params: &[
            spec("units", "Units", ValueKind::Number, ParamDefault::Int(128)),
            spec("dropout", "Dropout", ValueKind::Number, ParamDefault::Float(0.2)),
            spec(
                "recurrent_dropout",
                "Recurrent Dropout",
                ValueKind::Number,
                ParamDefault::Float(0.0),
            ),
            spec(
                "return_sequences",
                "Return Sequences",
                ValueKind::Boolean,
                ParamDefault::Bool(true),
            ),
        ],
    },
    BlockSchema {
        block_type: "Dense",
        params: &[
            spec("units", "Units", ValueKind::Number, ParamDefault::Int(64)),
            ACTIVATION,
        ],
    },
    BlockSchema {
        block_type: "Dropout",
        params: &[spec("rate", "Rate", ValueKind::Number, ParamDefault::Float(0.5))],
    },
    BlockSchema {
        block_type: "Flatten",
        params: &[],
    },
    BlockSchema {
        block_type: "Activation",
        params: &[ACTIVATION],
    },
    BlockSchema {
        block_type: "MultiHeadSelfAttention",
        params: &[
            spec("num_heads", "Number of Heads", ValueKind::Number, ParamDefault::Int(4)),
            spec("key_dim", "Key Dimension", ValueKind::Number, ParamDefault::Int(32)),
            spec("dropout", "Dropout", ValueKind::Number, ParamDefault::Float(0.1)),
        ],
    },
    BlockSchema {
        block_type: "FeedForward",
        params: &[
            spec("ff_dim", "FF Dimension", ValueKind::Number, ParamDefault::Int(128)),
            ACTIVATION,
        ],
    },
    BlockSchema {
        block_type: "LayerNormalization",
        params: &[
            spec("axis", "Axis", ValueKind::Number, ParamDefault::Int(-1)),
            spec("epsilon", "Epsilon", ValueKind::Number, ParamDefault::Float(1e-6)),
        ],
    },
    BlockSchema {
        block_type: "Add",
        params: &[],
    },
];

/// Schema for `block_type`, or `None` for types outside the table.
pub fn schema_for(block_type: &str) -> Option<&'static BlockSchema> {
    PARAMETER_SCHEMAS.iter().find(|s| s.block_type == block_type)
}

/// Block types offered for a model family. Unknown families offer nothing.
pub fn block_library(model: &ModelType) -> &'static [&'static str] {
    match model.as_str() {
        "LSTM" => &["LSTM", "Dense", "Dropout", "Flatten", "Activation"],
        "Transformer" => &[
            "MultiHeadSelfAttention",
            "FeedForward",
            "Dropout",
            "LayerNormalization",
            "Add",
        ],
        "Testmodel" => &["Dense", "Activation", "Dropout"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_offered_block_has_a_schema() {
        for family in ["LSTM", "Transformer", "Testmodel"] {
            for block in block_library(&ModelType::from(family)) {
                assert!(schema_for(block).is_some(), "{family} offers {block} without a schema");
            }
        }
    }

    #[test]
    fn block_types_are_unique() {
        for (i, a) in PARAMETER_SCHEMAS.iter().enumerate() {
            for b in &PARAMETER_SCHEMAS[i + 1..] {
                assert_ne!(a.block_type, b.block_type);
            }
        }
    }

    #[test]
    fn defaults_keep_declaration_order_and_types() {
        let params = schema_for("LSTM").unwrap().default_params();
        let keys: Vec<&str> = params.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["units", "dropout", "recurrent_dropout", "return_sequences"]);
        assert_eq!(params["units"], json!(128));
        assert_eq!(params["return_sequences"], json!(true));
    }

    #[test]
    fn unknown_type_has_no_schema() {
        assert!(schema_for("Conv1D").is_none());
        assert!(block_library(&ModelType::from("XGBoost")).is_empty());
    }
}
