//! In-memory document storage backend.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tern_types::{DocumentAddress, Edition, IdentityId};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::DocumentStore;

/// In-memory document store backed by a `RwLock<HashMap>`.
///
/// Used by tests and by the integration harness, which relies on the
/// [`overwrite`](Self::overwrite), [`remove`](Self::remove) and
/// [`set_unavailable`](Self::set_unavailable) hooks to simulate corrupted,
/// lost or unreachable editions.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<DocumentAddress, Bytes>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the raw bytes at `address` without going through `put`.
    pub fn overwrite(&self, address: &DocumentAddress, data: impl Into<Bytes>) {
        let mut map = self.documents.write().expect("lock poisoned");
        map.insert(address.clone(), data.into());
    }

    /// Drop whatever is stored at `address`. Returns whether anything was there.
    pub fn remove(&self, address: &DocumentAddress) -> bool {
        let mut map = self.documents.write().expect("lock poisoned");
        map.remove(address).is_some()
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Editions stored for `identity`, ascending.
    pub fn editions(&self, identity: &IdentityId) -> Vec<Edition> {
        let map = self.documents.read().expect("lock poisoned");
        let mut editions: Vec<Edition> = map
            .keys()
            .filter(|a| a.identity == *identity)
            .map(|a| a.edition)
            .collect();
        editions.sort_unstable();
        editions.dedup();
        editions
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, address: &DocumentAddress) -> Result<Option<Bytes>, StoreError> {
        self.check_available()?;
        let map = self.documents.read().expect("lock poisoned");
        Ok(map.get(address).cloned())
    }

    async fn put(&self, address: &DocumentAddress, data: Bytes) -> Result<(), StoreError> {
        self.check_available()?;
        debug!(%address, size = data.len(), "storing document in memory");
        let mut map = self.documents.write().expect("lock poisoned");
        map.insert(address.clone(), data);
        Ok(())
    }

    async fn contains(&self, address: &DocumentAddress) -> Result<bool, StoreError> {
        self.check_available()?;
        let map = self.documents.read().expect("lock poisoned");
        Ok(map.contains_key(address))
    }
}
