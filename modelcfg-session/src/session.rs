//! The editing session.
//!
//! Single owner of all editing state: the pristine snapshot taken at load, the
//! current snapshot every edit produces, the active (timeframe, model)
//! selection and the architecture builder for it. Every routed edit replaces
//! `current` with the snapshot returned by a core operation; a failed edit
//! leaves it untouched.

use chrono::{Local, NaiveDate};
use modelcfg_core::features::{self, FeatureGroup, OverlayField, OverlayPatch};
use modelcfg_core::hyperparams::{self, ResolvedParams};
use modelcfg_core::{
    validate, ArchitectureBuilder, BuilderError, ConfigDocument, DocumentHash, Issue,
    IssueReport, LayerId, ModelType, OverlayError, ParseError, PushError, PushPlan, Section,
    Timeframe,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::field_errors::{FieldErrors, FieldKey};
use crate::store::{decode_document, ConfigStore, StoreError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error("push was not confirmed; nothing changed")]
    ConfirmationRequired,

    #[error("no timeframe/model selected")]
    NoSelection,

    #[error("refusing to save with {} validation issue(s)", .0.len())]
    Invalid(IssueReport),
}

/// The (timeframe, model) pair being edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    pub timeframe: Timeframe,
    pub model: ModelType,
}

impl Selection {
    pub fn new(timeframe: impl Into<Timeframe>, model: impl Into<ModelType>) -> Self {
        Self {
            timeframe: timeframe.into(),
            model: model.into(),
        }
    }
}

/// Asks the user to agree to a destructive operation.
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, message: &str) -> bool {
        self(message)
    }
}

#[derive(Debug, Clone)]
pub struct EditSession {
    pristine: ConfigDocument,
    pristine_hash: DocumentHash,
    current: ConfigDocument,
    selection: Option<Selection>,
    builder: ArchitectureBuilder,
    field_errors: FieldErrors,
    load_issues: Vec<Issue>,
}

impl EditSession {
    /// Fetch and open the stored document. Nothing is built unless the fetch
    /// and decode both succeed. Validation issues in the stored document are
    /// kept in [`load_issues`](Self::load_issues) and never block editing.
    pub fn load(store: &dyn ConfigStore) -> Result<Self, SessionError> {
        let raw = store.fetch_raw()?;
        let load_issues = modelcfg_core::validate_value(&raw);
        let doc = decode_document(raw, store.snippet_len())?;
        if !load_issues.is_empty() {
            warn!(
                store = store.name(),
                issues = load_issues.len(),
                "loaded document has validation issues"
            );
        }
        info!(store = store.name(), version = %doc.version, "session opened");
        Ok(Self::open(doc, load_issues))
    }

    /// Start a session on an in-memory document.
    pub fn from_document(doc: ConfigDocument) -> Self {
        let issues = validate(&doc);
        Self::open(doc, issues)
    }

    fn open(doc: ConfigDocument, load_issues: Vec<Issue>) -> Self {
        let selection = doc
            .selections()
            .next()
            .map(|(tf, model)| Selection::new(tf.clone(), model.clone()));
        let mut session = Self {
            pristine_hash: DocumentHash::of(&doc),
            pristine: doc.clone(),
            current: doc,
            selection,
            builder: ArchitectureBuilder::new(),
            field_errors: FieldErrors::default(),
            load_issues,
        };
        session.sync_builder();
        session
    }

    /// Re-fetch from `store`. On failure the session is left as it was.
    pub fn reload(&mut self, store: &dyn ConfigStore) -> Result<(), SessionError> {
        let fresh = Self::load(store)?;
        let selection = self.selection.take();
        *self = fresh;
        if let Some(selection) = selection {
            self.select(selection);
        }
        Ok(())
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn document(&self) -> &ConfigDocument {
        &self.current
    }

    pub fn pristine(&self) -> &ConfigDocument {
        &self.pristine
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn builder(&self) -> &ArchitectureBuilder {
        &self.builder
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    /// Issues found in the raw document at load time.
    pub fn load_issues(&self) -> &[Issue] {
        &self.load_issues
    }

    pub fn hyperparameters(&self) -> Result<ResolvedParams, SessionError> {
        let (tf, model) = self.selected()?;
        Ok(hyperparams::resolve(&self.current, &tf, &model))
    }

    pub fn feature_groups(&self) -> Result<Vec<FeatureGroup>, SessionError> {
        let (tf, model) = self.selected()?;
        Ok(features::grouped_rows(&self.current, &tf, &model))
    }

    // ─── Selection ──────────────────────────────────────────────────

    /// Switch the active pair. The builder is reconciled with the new pair's
    /// persisted layers and field errors of the old view are dropped.
    pub fn select(&mut self, selection: Selection) {
        debug!(timeframe = %selection.timeframe, model = %selection.model, "selected");
        self.selection = Some(selection);
        self.field_errors.clear_all();
        self.sync_builder();
    }

    // ─── Hyperparameters ────────────────────────────────────────────

    pub fn set_hyperparameter(&mut self, key: &str, input: Value) -> Result<(), SessionError> {
        let (tf, model) = self.selected()?;
        let cell = FieldKey::new(Section::Hyperparameters, key, "value");
        let next = self.track(cell, hyperparams::update(&self.current, &tf, &model, key, input))?;
        self.current = next;
        Ok(())
    }

    pub fn clear_hyperparameter(&mut self, key: &str) -> Result<(), SessionError> {
        let (tf, model) = self.selected()?;
        self.field_errors
            .clear(&FieldKey::new(Section::Hyperparameters, key, "value"));
        self.current = hyperparams::clear_override(&self.current, &tf, &model, key);
        Ok(())
    }

    pub fn reset_hyperparameters(&mut self) -> Result<(), SessionError> {
        let (tf, model) = self.selected()?;
        self.clear_section_errors(Section::Hyperparameters);
        self.current = hyperparams::reset_overrides(&self.current, &tf, &model);
        Ok(())
    }

    // ─── Features ───────────────────────────────────────────────────

    pub fn upsert_feature(&mut self, name: &str, patch: &OverlayPatch) -> Result<(), SessionError> {
        let (tf, model) = self.selected()?;
        self.current = features::upsert(&self.current, &tf, &model, name, patch)?;
        Ok(())
    }

    /// Edit one overlay field from raw text. Invalid JSON in a params field
    /// marks only that cell.
    pub fn set_feature_text(
        &mut self,
        name: &str,
        field: OverlayField,
        raw: &str,
    ) -> Result<(), SessionError> {
        let cell = FieldKey::new(Section::Features, name, field.as_str());
        let patch = self.track(cell, OverlayPatch::new().set_text(field, raw))?;
        self.upsert_feature(name, &patch)
    }

    pub fn reset_features(&mut self) -> Result<(), SessionError> {
        let (tf, model) = self.selected()?;
        self.clear_section_errors(Section::Features);
        self.current = features::reset(&self.current, &tf, &model);
        Ok(())
    }

    // ─── Architecture ───────────────────────────────────────────────

    pub fn add_layer(
        &mut self,
        block_type: &str,
        at: Option<usize>,
    ) -> Result<LayerId, SessionError> {
        self.selected()?;
        let id = self.builder.add_node(block_type, at);
        self.commit_architecture()?;
        Ok(id)
    }

    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<(), SessionError> {
        self.selected()?;
        self.builder.move_node(from, to)?;
        self.commit_architecture()
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Result<(), SessionError> {
        self.selected()?;
        self.builder.remove_node(id)?;
        let prefix = id.to_string();
        self.field_errors.retain(|k| !(k.section == Section::Architecture && k.row == prefix));
        self.commit_architecture()
    }

    pub fn set_layer_param(
        &mut self,
        id: LayerId,
        key: &str,
        value: Value,
    ) -> Result<(), SessionError> {
        self.selected()?;
        let cell = FieldKey::new(Section::Architecture, id.to_string(), key);
        match self.builder.update_param(id, key, value) {
            Ok(()) => self.field_errors.clear(&cell),
            Err(BuilderError::Parse(e)) => {
                warn!(field = %cell, error = %e.message, "rejected layer parameter");
                self.field_errors.record(cell, e.message.clone());
                return Err(SessionError::Parse(e));
            }
            Err(e) => return Err(e.into()),
        }
        self.commit_architecture()
    }

    // ─── Push ───────────────────────────────────────────────────────

    /// Apply `plan` after `confirmer` agrees. Declining changes nothing.
    pub fn push(
        &mut self,
        plan: PushPlan,
        confirmer: &mut dyn Confirm,
    ) -> Result<(), SessionError> {
        if !confirmer.confirm(&plan.confirmation_message()) {
            info!(source = %plan.source(), "push declined");
            return Err(SessionError::ConfirmationRequired);
        }
        self.current = plan.confirm().apply(&self.current)?;
        self.sync_builder();
        Ok(())
    }

    /// Push sections of the current selection to `destinations`.
    pub fn push_selection(
        &mut self,
        destinations: Vec<Timeframe>,
        sections: Vec<Section>,
        confirmer: &mut dyn Confirm,
    ) -> Result<(), SessionError> {
        let (tf, model) = self.selected()?;
        let plan = PushPlan::new(tf, model, destinations, sections)?;
        self.push(plan, confirmer)
    }

    // ─── Validation & persistence ───────────────────────────────────

    pub fn validate(&self) -> IssueReport {
        IssueReport::from(validate(&self.current))
    }

    /// True when the current snapshot differs from what was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        DocumentHash::of(&self.current) != self.pristine_hash
    }

    /// Discard all edits since load or the last save.
    pub fn revert(&mut self) {
        self.current = self.pristine.clone();
        self.field_errors.clear_all();
        self.sync_builder();
    }

    /// Stamp `updated` with today's date and persist. Session state only
    /// changes once the store accepted the document.
    pub fn save(&mut self, store: &dyn ConfigStore) -> Result<(), SessionError> {
        self.save_on(store, Local::now().date_naive())
    }

    pub fn save_on(
        &mut self,
        store: &dyn ConfigStore,
        today: NaiveDate,
    ) -> Result<(), SessionError> {
        let mut stamped = self.current.clone();
        stamped.updated = today.format("%Y-%m-%d").to_string();
        store.save(&stamped)?;

        self.pristine_hash = DocumentHash::of(&stamped);
        self.pristine = stamped.clone();
        self.current = stamped;
        info!(store = store.name(), hash = %self.pristine_hash.short(), "session saved");
        Ok(())
    }

    /// Like [`save`](Self::save), but refuses when the document has issues.
    pub fn save_validated(&mut self, store: &dyn ConfigStore) -> Result<(), SessionError> {
        let report = self.validate();
        if !report.is_clean() {
            for issue in report.iter() {
                warn!(path = %issue.path, "{}", issue.message);
            }
            return Err(SessionError::Invalid(report));
        }
        self.save(store)
    }

    // ─── Helpers ────────────────────────────────────────────────────

    fn selected(&self) -> Result<(Timeframe, ModelType), SessionError> {
        self.selection
            .as_ref()
            .map(|s| (s.timeframe.clone(), s.model.clone()))
            .ok_or(SessionError::NoSelection)
    }

    /// Record or clear the cell's error depending on the outcome.
    fn track<T>(
        &mut self,
        cell: FieldKey,
        result: Result<T, ParseError>,
    ) -> Result<T, SessionError> {
        match result {
            Ok(value) => {
                self.field_errors.clear(&cell);
                Ok(value)
            }
            Err(e) => {
                warn!(field = %cell, error = %e.message, "rejected input");
                self.field_errors.record(cell, e.message.clone());
                Err(e.into())
            }
        }
    }

    fn clear_section_errors(&mut self, section: Section) {
        self.field_errors.retain(|k| k.section != section);
    }

    /// Write the builder's projection into the selected node.
    fn commit_architecture(&mut self) -> Result<(), SessionError> {
        let (tf, model) = self.selected()?;
        let mut next = self.current.clone();
        next.model_config_mut(&tf, &model).architecture = self.builder.to_persisted();
        self.current = next;
        Ok(())
    }

    fn sync_builder(&mut self) {
        let layers = self
            .selection
            .as_ref()
            .and_then(|s| self.current.model_config(&s.timeframe, &s.model))
            .map(|c| c.architecture.as_slice())
            .unwrap_or_default();
        if self.builder.reconcile(layers) {
            debug!(layers = layers.len(), "builder reconciled");
        }
    }
}
