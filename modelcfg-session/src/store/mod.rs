//! Config store trait and structured error types.
//!
//! The ConfigStore trait abstracts over where the document lives (the config
//! server over HTTP, or memory) so sessions can be driven without a network
//! in tests.

pub mod http;
pub mod memory;

pub use http::HttpConfigStore;
pub use memory::MemoryStore;

use modelcfg_core::ConfigDocument;
use serde_json::Value;
use thiserror::Error;

use crate::settings::DEFAULT_SNIPPET_LEN;

/// Load/save failures. Any of these aborts the operation as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("response is not a config document ({message}); body starts with: {snippet}")]
    Decode { message: String, snippet: String },

    #[error("save rejected by server (HTTP {status})")]
    SaveRejected { status: u16 },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("failed to encode document: {0}")]
    Encode(String),
}

/// Where the training configuration is loaded from and saved to.
pub trait ConfigStore: Send + Sync {
    /// Human-readable name of this store.
    fn name(&self) -> &str;

    /// The document exactly as stored, before typing. Validation runs on this.
    fn fetch_raw(&self) -> Result<Value, StoreError>;

    /// Characters of the offending body kept in a decode error.
    fn snippet_len(&self) -> usize {
        DEFAULT_SNIPPET_LEN
    }

    fn fetch(&self) -> Result<ConfigDocument, StoreError> {
        decode_document(self.fetch_raw()?, self.snippet_len())
    }

    /// Replace the stored document. Last write wins.
    fn save(&self, doc: &ConfigDocument) -> Result<(), StoreError>;

    /// The stored document rendered as a file for download.
    fn download(&self) -> Result<Vec<u8>, StoreError>;
}

/// Type a raw document, keeping a snippet of it for the error on failure.
pub fn decode_document(raw: Value, snippet_len: usize) -> Result<ConfigDocument, StoreError> {
    let snippet_src = raw.to_string();
    serde_json::from_value(raw).map_err(|e| StoreError::Decode {
        message: e.to_string(),
        snippet: snippet(&snippet_src, snippet_len),
    })
}

/// First `max_chars` characters of `body`, with an ellipsis when cut.
pub fn snippet(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}
