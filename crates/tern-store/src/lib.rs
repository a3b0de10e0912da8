//! Versioned document storage trait and backend implementations.
//!
//! This crate defines the [`DocumentStore`] trait, the fetch/insert contract
//! of the content-addressed network documents are published to, along with
//! three backends:
//!
//! - [`MemoryStore`]: in-memory storage backed by a `RwLock<HashMap>`, with
//!   hooks to corrupt or drop individual editions.
//! - [`FileStore`]: one directory per identity, one file per edition.
//! - [`SlowStore`]: wraps another store and injects seeded random latency.

mod error;
mod file_store;
mod memory_store;
mod slow_store;
mod traits;

pub use error::StoreError;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use slow_store::SlowStore;
pub use traits::DocumentStore;
