//! Domain types for the training configuration document

pub mod document;
pub mod ids;

pub use document::{
    ConfigDocument, FeatureDefinition, FeatureOverlay, Layer, ModelConfig, TimeframeModels,
    ValueMap,
};
pub use ids::{IdGenerator, LayerId, ModelType, Timeframe};
