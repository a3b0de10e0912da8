//! Edition fetcher: "retrieve and validate edition E of identity I".

use std::sync::Arc;

use tern_codec::DocumentCodec;
use tern_store::DocumentStore;
use tern_types::{Document, DocumentAddress, Edition, IdentityId, IdentityStatus};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::status::StatusBoard;

/// Wraps a [`DocumentStore`] and a [`DocumentCodec`].
///
/// Exactly one store round trip per call, no retries. The fetcher never
/// touches an identity's document snapshot; merging is the caller's job.
pub struct EditionFetcher {
    store: Arc<dyn DocumentStore>,
    codec: Arc<dyn DocumentCodec>,
    status: Arc<StatusBoard>,
}

impl EditionFetcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        codec: Arc<dyn DocumentCodec>,
        status: Arc<StatusBoard>,
    ) -> Self {
        Self {
            store,
            codec,
            status,
        }
    }

    /// Fetch, decode and verify one edition.
    ///
    /// With `verify_only` unset the identity is shown as
    /// [`IdentityStatus::Downloading`] for the duration of the round trip.
    /// Rescue probes pass `true`. Decoding and verification are identical
    /// either way.
    #[tracing::instrument(skip(self), fields(%identity))]
    pub async fn fetch(
        &self,
        identity: IdentityId,
        edition: Edition,
        verify_only: bool,
    ) -> Result<Document, FetchError> {
        if !verify_only {
            self.status.set(identity, IdentityStatus::Downloading);
        }
        let result = self.fetch_inner(identity, edition).await;
        if !verify_only {
            self.status.set(identity, IdentityStatus::Idle);
        }
        result
    }

    async fn fetch_inner(
        &self,
        identity: IdentityId,
        edition: Edition,
    ) -> Result<Document, FetchError> {
        let address = DocumentAddress::document(identity, edition);
        let Some(bytes) = self.store.get(&address).await? else {
            debug!(%address, "edition not found");
            return Err(FetchError::NotFound { identity, edition });
        };

        let corrupt = |reason: String| {
            warn!(%address, %reason, "corrupt edition");
            FetchError::Corrupt {
                identity,
                edition,
                reason,
            }
        };

        let document = self
            .codec
            .decode(&bytes)
            .map_err(|e| corrupt(e.to_string()))?;
        if !self.codec.verify(&document, &identity) {
            return Err(corrupt("signature verification failed".into()));
        }
        if document.edition != edition {
            return Err(corrupt(format!(
                "document claims edition {}",
                document.edition
            )));
        }
        if let Some(owner) = foreign_owner(&document) {
            return Err(corrupt(format!("document carries content owned by {owner}")));
        }

        debug!(%address, size = bytes.len(), "fetched edition");
        Ok(document)
    }
}

/// First owner other than the signer among the document's posts, replies
/// and albums. A signature only vouches for content its signer owns.
fn foreign_owner(document: &Document) -> Option<IdentityId> {
    let posts = document.posts.iter().map(|p| p.owner);
    let replies = document.replies.iter().map(|r| r.owner);
    let albums = document.albums.iter().map(|a| a.owner);
    posts
        .chain(replies)
        .chain(albums)
        .find(|owner| *owner != document.identity)
}

impl std::fmt::Debug for EditionFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditionFetcher").finish_non_exhaustive()
    }
}
