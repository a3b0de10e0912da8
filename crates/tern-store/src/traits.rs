//! Core trait for versioned document storage.

use bytes::Bytes;
use tern_types::DocumentAddress;

use crate::error::StoreError;

/// Fetch/insert contract of the versioned store.
///
/// Addresses are `(identity, edition, label)` tuples. Implementations never
/// interpret the payload; parsing and verification belong to the codec.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Retrieve the bytes at `address`. Returns `None` if nothing is stored.
    async fn get(&self, address: &DocumentAddress) -> Result<Option<Bytes>, StoreError>;

    /// Store `data` at `address`, replacing anything already there.
    async fn put(&self, address: &DocumentAddress, data: Bytes) -> Result<(), StoreError>;

    /// Check whether anything is stored at `address`.
    async fn contains(&self, address: &DocumentAddress) -> Result<bool, StoreError>;
}
