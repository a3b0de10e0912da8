//! Error types for the engine.

use tern_types::{AlbumId, IdentityId, PostId, ReplyId};

/// Errors that can occur during engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Failed to access the document store.
    #[error("store error: {0}")]
    Store(#[from] tern_store::StoreError),

    /// Failed to encode a document.
    #[error("codec error: {0}")]
    Codec(#[from] tern_codec::CodecError),

    /// Rescue subsystem error.
    #[error("rescue error: {0}")]
    Rescue(#[from] tern_rescue::RescueError),

    /// The identity is not in the registry.
    #[error("unknown identity: {0}")]
    UnknownIdentity(IdentityId),

    /// The operation needs a local identity.
    #[error("identity {0} is not local")]
    NotLocal(IdentityId),

    #[error("post not found: {0}")]
    PostNotFound(PostId),

    #[error("reply not found: {0}")]
    ReplyNotFound(ReplyId),

    #[error("album not found: {0}")]
    AlbumNotFound(AlbumId),

    /// A merge was attempted under another identity's update lock.
    #[error("update lock held for {held}, not {wanted}")]
    WrongLock {
        held: IdentityId,
        wanted: IdentityId,
    },
}
