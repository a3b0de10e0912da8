//! On-disk document store used by `ternd`.
//!
//! Every identity gets a directory named after its key; each edition lives
//! in a file named after the address's storage key:
//! `{root}/{identity}/{storage key hex}`.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tern_types::DocumentAddress;
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::traits::DocumentStore;

/// Suffix of files that are still being written.
const PARTIAL_SUFFIX: &str = "partial";

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn base_dir(&self) -> &Path {
        &self.root
    }

    fn identity_dir(&self, address: &DocumentAddress) -> PathBuf {
        self.root.join(address.identity.to_string())
    }

    fn path_of(&self, address: &DocumentAddress) -> PathBuf {
        let key: String = address
            .storage_key()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        self.identity_dir(address).join(key)
    }
}

/// Maps `NotFound` to `None` and keeps every other I/O failure.
fn absent_as_none<T>(result: io::Result<T>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, address: &DocumentAddress) -> Result<Option<Bytes>, StoreError> {
        let data = absent_as_none(tokio::fs::read(self.path_of(address)).await)?;
        trace!(%address, found = data.is_some(), "file store read");
        Ok(data.map(Bytes::from))
    }

    async fn put(&self, address: &DocumentAddress, data: Bytes) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.identity_dir(address)).await?;

        // Rename over the final path so readers never see a partial edition.
        let path = self.path_of(address);
        let partial = path.with_extension(PARTIAL_SUFFIX);
        tokio::fs::write(&partial, &data).await?;
        tokio::fs::rename(&partial, &path).await?;

        debug!(%address, bytes = data.len(), "edition written to disk");
        Ok(())
    }

    async fn contains(&self, address: &DocumentAddress) -> Result<bool, StoreError> {
        let meta = absent_as_none(tokio::fs::metadata(self.path_of(address)).await)?;
        Ok(meta.is_some_and(|m| m.is_file()))
    }
}
