//! Property tests for editing invariants.
//!
//! Uses proptest to verify:
//! 1. Resolution precedence: the highest level defining a key wins
//! 2. Edits never touch the default levels
//! 3. Overlay upsert is idempotent
//! 4. Builder moves are single-element relocations
//! 5. Reconcile against its own projection is a no-op

use modelcfg_core::features::{self, OverlayPatch};
use modelcfg_core::hyperparams::{self, Level};
use modelcfg_core::{ArchitectureBuilder, ConfigDocument, ModelType, Timeframe, ValueMap};
use proptest::prelude::*;
use serde_json::{json, Value};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_key() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["lr", "epochs", "dropout", "patience", "units", "seq_len"])
        .prop_map(str::to_string)
}

fn arb_level_map() -> impl Strategy<Value = ValueMap> {
    prop::collection::vec((arb_key(), 0..1000i64), 0..6)
        .prop_map(|pairs| pairs.into_iter().map(|(k, v)| (k, json!(v))).collect())
}

fn arb_block() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["LSTM", "Dense", "Dropout", "Flatten", "Add", "Conv1D"])
}

fn sel() -> (Timeframe, ModelType) {
    (Timeframe::from("m5"), ModelType::from("LSTM"))
}

fn doc_with_levels(defaults: ValueMap, model: ValueMap, overrides: ValueMap) -> ConfigDocument {
    let (tf, lstm) = sel();
    let mut doc = ConfigDocument {
        training_defaults: defaults,
        ..ConfigDocument::default()
    };
    doc.model_defaults.insert(lstm.clone(), model);
    doc.model_config_mut(&tf, &lstm).hyperparameters = overrides;
    doc
}

// ── 1. Resolution precedence ─────────────────────────────────────────

proptest! {
    #[test]
    fn highest_defining_level_wins(
        defaults in arb_level_map(),
        model in arb_level_map(),
        overrides in arb_level_map(),
    ) {
        let (tf, lstm) = sel();
        let doc = doc_with_levels(defaults.clone(), model.clone(), overrides.clone());
        let resolved = hyperparams::resolve(&doc, &tf, &lstm);

        for entry in resolved.iter() {
            let (expected, level) = if let Some(v) = overrides.get(&entry.key) {
                (v, Level::Override)
            } else if let Some(v) = model.get(&entry.key) {
                (v, Level::Model)
            } else {
                (&defaults[&entry.key], Level::Default)
            };
            prop_assert_eq!(&entry.value, expected);
            prop_assert_eq!(entry.level, level);
        }

        let mut all: Vec<&String> = defaults
            .keys()
            .chain(model.keys())
            .chain(overrides.keys())
            .collect();
        all.sort();
        all.dedup();
        prop_assert_eq!(resolved.len(), all.len());
    }

    // ── 2. Defaults are never touched ────────────────────────────────

    #[test]
    fn update_only_writes_overrides(
        defaults in arb_level_map(),
        model in arb_level_map(),
        key in arb_key(),
        value in 1..500i64,
    ) {
        let (tf, lstm) = sel();
        let doc = doc_with_levels(defaults, model, ValueMap::new());
        let raw = Value::String(value.to_string());
        let next = hyperparams::update(&doc, &tf, &lstm, &key, raw).unwrap();

        prop_assert_eq!(&next.training_defaults, &doc.training_defaults);
        prop_assert_eq!(&next.model_defaults, &doc.model_defaults);
        let resolved = hyperparams::resolve(&next, &tf, &lstm);
        prop_assert_eq!(resolved.entry(&key).map(|e| e.level), Some(Level::Override));
    }

    // ── 3. Upsert idempotence ────────────────────────────────────────

    #[test]
    fn upsert_enabled_is_idempotent(enabled in any::<bool>(), default_enabled in any::<bool>()) {
        let (tf, lstm) = sel();
        let doc: ConfigDocument = serde_json::from_value(json!({
            "feature_catalog": [
                {"name": "rsi", "group": "RSI", "default_enabled": default_enabled},
            ],
        })).unwrap();
        let patch = OverlayPatch::new().enabled(enabled);
        let once = features::upsert(&doc, &tf, &lstm, "rsi", &patch).unwrap();
        let twice = features::upsert(&once, &tf, &lstm, "rsi", &patch).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(features::merged_rows(&twice, &tf, &lstm)[0].enabled, enabled);
    }

    // ── 4. Move semantics ────────────────────────────────────────────

    #[test]
    fn move_is_single_element_relocation(
        blocks in prop::collection::vec(arb_block(), 1..8),
        from_seed in any::<prop::sample::Index>(),
        to_seed in any::<prop::sample::Index>(),
    ) {
        let mut builder = ArchitectureBuilder::new();
        for block in &blocks {
            builder.add_node(block, None);
        }
        let before: Vec<_> = builder.nodes().iter().map(|n| n.id).collect();
        let from = from_seed.index(blocks.len());
        let to = to_seed.index(blocks.len());

        builder.move_node(from, to).unwrap();

        let mut expected = before.clone();
        let moved = expected.remove(from);
        expected.insert(to, moved);
        let after: Vec<_> = builder.nodes().iter().map(|n| n.id).collect();
        prop_assert_eq!(after, expected);
    }

    // ── 5. Reconcile stability ───────────────────────────────────────

    #[test]
    fn reconcile_with_own_projection_keeps_ids(blocks in prop::collection::vec(arb_block(), 0..8)) {
        let mut builder = ArchitectureBuilder::new();
        for block in &blocks {
            builder.add_node(block, None);
        }
        let ids: Vec<_> = builder.nodes().iter().map(|n| n.id).collect();
        let persisted = builder.to_persisted();
        prop_assert!(!builder.reconcile(&persisted));
        let after: Vec<_> = builder.nodes().iter().map(|n| n.id).collect();
        prop_assert_eq!(after, ids);
    }
}
