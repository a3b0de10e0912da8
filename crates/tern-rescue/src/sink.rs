//! Seam between the fetch path and the local document cache.

use tern_types::{Document, Edition, IdentityId};

use crate::error::RescueError;
use crate::lock::UpdateGuard;

/// How a fetched document is allowed to replace the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Caller-chosen edition; may move the current edition downward.
    Rescue,
    /// Normal refresh; only newer editions are accepted.
    Refresh,
}

/// Where verified documents end up.
///
/// Implemented by the engine. Tests substitute an in-memory mock.
#[async_trait::async_trait]
pub trait DocumentSink: Send + Sync {
    /// Edition of the identity's current snapshot, `None` if unknown.
    fn current_edition(&self, identity: &IdentityId) -> Option<Edition>;

    /// Replace the identity's snapshot with `document`.
    ///
    /// The guard proves the caller holds the identity's update lock.
    async fn merge(
        &self,
        guard: &UpdateGuard,
        document: Document,
        mode: MergeMode,
    ) -> Result<(), RescueError>;
}
