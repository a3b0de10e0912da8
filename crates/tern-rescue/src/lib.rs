//! Versioned retrieval and rescue of identity documents.
//!
//! This crate provides:
//!
//! - [`EditionFetcher`]: retrieves and validates one edition of one identity.
//! - [`RescueController`]: per-identity state machine that probes editions
//!   on request until a usable one is found.
//! - [`UpdateLocks`]: per-identity exclusive locks that serialize every merge
//!   into an identity's document snapshot.
//! - [`StatusBoard`]: per-identity [`IdentityStatus`](tern_types::IdentityStatus).
//! - [`DocumentSink`]: the seam through which fetched documents are merged.

pub mod controller;
pub mod error;
pub mod fetcher;
pub mod lock;
pub mod sink;
pub mod status;

pub use controller::{
    FetchRequest, RescueConfig, RescueController, RescueHandle, RescueSession, RescueState,
};
pub use error::{FetchError, RescueError};
pub use fetcher::EditionFetcher;
pub use lock::{UpdateGuard, UpdateLocks};
pub use sink::{DocumentSink, MergeMode};
pub use status::StatusBoard;
