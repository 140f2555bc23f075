//! Section-aware editing sessions for CollabTree documents.
//!
//! A document is fetched once, split into an outline of sections, and edited
//! one section at a time. Edits are persisted by a debounced save plus a
//! periodic autosave, always as a whole-document write. Real-time
//! collaboration runs alongside through a pluggable transport.

pub mod api;
pub mod cache;
pub mod collab;
pub mod config;
pub mod drafts;
pub mod models;
pub mod schedule;
pub mod state;
pub mod tree;
pub mod util;

pub use api::{ApiClient, ApiError, ApiErrorKind, ApiResult, DocumentStore};
pub use collab::{CollabTransport, EditorBuffer, TextBuffer, TransportEvent};
pub use config::{ConfigError, EnvConfig, SyncConfig};
pub use models::{DocumentData, UpdateDocumentRequest};
pub use state::{SaveStatus, SectionSync, SessionError, SessionEvent, SessionRunner};
pub use tree::{SectionId, SectionTree, TreeError};

// Only register the start function for normal builds; wasm-bindgen-test
// brings its own entry symbol.
#[cfg(target_arch = "wasm32")]
#[cfg_attr(not(test), wasm_bindgen::prelude::wasm_bindgen(start))]
pub fn start() {
    console_error_panic_hook::set_once();
}
