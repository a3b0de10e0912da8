//! Error types for fetching and rescue.

use tern_store::StoreError;
use tern_types::{Edition, IdentityId};

/// Why one edition could not be used.
///
/// These are values the controller inspects, not failures of the controller.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Nothing stored at the address.
    #[error("edition {edition} of {identity} not found")]
    NotFound { identity: IdentityId, edition: Edition },

    /// Data exists but does not parse or fails verification.
    #[error("edition {edition} of {identity} is corrupt: {reason}")]
    Corrupt {
        identity: IdentityId,
        edition: Edition,
        reason: String,
    },

    /// The store failed transiently.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The caller's deadline expired before the store answered.
    #[error("fetch timed out")]
    TimedOut,
}

impl FetchError {
    /// Present but unusable, as opposed to absent or unreachable.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Outcomes the rescue control surface reports to its caller.
#[derive(Debug, thiserror::Error)]
pub enum RescueError {
    /// Every edition down to 0 has been tried without success.
    #[error("no older edition of {identity} left to try")]
    Exhausted { identity: IdentityId },

    /// The per-identity update lock was not acquired in time.
    #[error("timed out waiting for the update lock of {identity}")]
    LockTimeout { identity: IdentityId },

    /// The controller has been stopped.
    #[error("rescue controller stopped")]
    Stopped,

    /// Merging a fetched document failed.
    #[error("merge failed: {0}")]
    Sink(String),
}
