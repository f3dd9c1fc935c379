//! # Tuneloop Memory
//!
//! Persistence for what the tuning loop learns between iterations and between runs.
//!
//! ## Architectural Principles
//!
//! - **One trait, two backends:** `MemoryStore` is implemented by a local JSON file and
//!   by a client for the memory server. The loop only ever sees `dyn MemoryStore`.
//! - **Whole-document writes:** The file backend rewrites the entire document on each
//!   mutation. The data is small and a half-written key is worse than a slow write.
//! - **Forgiving reads:** Missing or malformed memory reads as empty. Memory biases the
//!   prompt; it must never stop a run.
//!
//! ## Public API
//!
//! - `MemoryStore`: The key-value interface (`put`, `get`, `delete`, `append`, `keys`).
//! - `JsonFileStore` / `HttpMemoryStore`: The two backends.
//! - `MemoryWindow`: Short-term, long-term, history and best-record tiers.
//! - `open_store`: Builds the backend named in `MemorySettings`.
//! - `MemoryError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod http;
pub mod store;
pub mod window;

pub use error::MemoryError;
pub use http::HttpMemoryStore;
pub use store::{JsonFileStore, MemoryStore};
pub use window::MemoryWindow;

use configuration::{MemoryBackend, MemorySettings};
use std::sync::Arc;

/// Builds the configured backend.
pub fn open_store(settings: &MemorySettings) -> Result<Arc<dyn MemoryStore>, MemoryError> {
    let store: Arc<dyn MemoryStore> = match settings.backend {
        MemoryBackend::File => Arc::new(JsonFileStore::new(&settings.path)),
        MemoryBackend::Http => Arc::new(HttpMemoryStore::from_settings(settings)?),
    };
    tracing::info!(backend = ?settings.backend, "Opened memory store");
    Ok(store)
}
