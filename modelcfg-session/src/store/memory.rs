//! In-memory store for tests and offline use.

use modelcfg_core::ConfigDocument;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};

use super::{ConfigStore, StoreError};
use crate::settings::DEFAULT_SNIPPET_LEN;

#[derive(Debug, Default)]
struct State {
    raw: Value,
    saves: usize,
    fail_fetch: bool,
    reject_save: Option<u16>,
}

/// Holds the document as raw JSON, like a server would.
///
/// Failures can be injected to exercise the all-or-nothing load and save paths.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    snippet_len: usize,
}


impl MemoryStore {
    pub fn new(raw: Value) -> Self {
        Self {
            state: Mutex::new(State {
                raw,
                ..State::default()
            }),
            snippet_len: DEFAULT_SNIPPET_LEN,
        }
    }

    pub fn with_snippet_len(mut self, snippet_len: usize) -> Self {
        self.snippet_len = snippet_len;
        self
    }

    pub fn from_document(doc: &ConfigDocument) -> Result<Self, StoreError> {
        let raw = serde_json::to_value(doc).map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(Self::new(raw))
    }

    /// Make every fetch fail with a network error until cleared.
    pub fn fail_fetch(&self, fail: bool) {
        self.lock().fail_fetch = fail;
    }

    /// Make every save fail with `status` until cleared with `None`.
    pub fn reject_save(&self, status: Option<u16>) {
        self.lock().reject_save = status;
    }

    /// The stored document as last written.
    pub fn raw(&self) -> Value {
        self.lock().raw.clone()
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn snippet_len(&self) -> usize {
        self.snippet_len
    }

    fn fetch_raw(&self) -> Result<Value, StoreError> {
        let state = self.lock();
        if state.fail_fetch {
            return Err(StoreError::Network("memory store: fetch disabled".into()));
        }
        Ok(state.raw.clone())
    }

    fn save(&self, doc: &ConfigDocument) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(status) = state.reject_save {
            return Err(StoreError::SaveRejected { status });
        }
        state.raw = serde_json::to_value(doc).map_err(|e| StoreError::Encode(e.to_string()))?;
        state.saves += 1;
        Ok(())
    }

    /// Pretty JSON; the memory store has no YAML renderer.
    fn download(&self) -> Result<Vec<u8>, StoreError> {
        let state = self.lock();
        serde_json::to_vec_pretty(&state.raw).map_err(|e| StoreError::Encode(e.to_string()))
    }
}
