//! modelcfg core: the training configuration model and its editing semantics.
//!
//! This crate contains everything that has invariants, and no I/O:
//! - Domain types (document, catalog, per-(timeframe, model) nodes, layers)
//! - Hierarchical hyperparameter resolution with type-preserving edits
//! - Feature catalog × sparse overlay merging
//! - Whole-document validation with stable issue paths
//! - The ordered architecture builder and its block parameter schema
//! - Confirmed cross-timeframe push
//!
//! Every editing operation takes a `&ConfigDocument` and returns a new one;
//! the input snapshot is never mutated.

pub mod architecture;
pub mod coerce;
pub mod domain;
pub mod features;
pub mod fingerprint;
pub mod hyperparams;
pub mod push;
pub mod validate;

pub use architecture::{ArchitectureBuilder, BuilderError, LayerNode};
pub use coerce::{ParseError, ValueKind};
pub use domain::{
    ConfigDocument, FeatureDefinition, FeatureOverlay, Layer, LayerId, ModelConfig, ModelType,
    Timeframe, ValueMap,
};
pub use features::{FeatureGroup, FeatureRow, OverlayError, OverlayField, OverlayPatch};
pub use fingerprint::DocumentHash;
pub use hyperparams::{InputKind, Level, ResolvedParam, ResolvedParams};
pub use push::{ConfirmedPush, PushError, PushPlan, Section};
pub use validate::{validate, validate_value, Issue, IssueReport};
