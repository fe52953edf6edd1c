//! modelcfg session: stateful editing on top of `modelcfg-core`.
//!
//! This crate provides:
//! - The editing session (pristine/current snapshots, selection, builder)
//! - Per-cell parse error tracking
//! - The config store abstraction with HTTP and in-memory implementations
//! - Client settings from `modelcfg.toml`

pub mod field_errors;
pub mod session;
pub mod settings;
pub mod store;

pub use field_errors::{FieldErrors, FieldKey};
pub use session::{Confirm, EditSession, Selection, SessionError};
pub use settings::{ClientSettings, SettingsError};
pub use store::{ConfigStore, HttpConfigStore, MemoryStore, StoreError};
