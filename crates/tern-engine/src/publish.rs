//! Editing and inserting the documents of local identities.

use ed25519_dalek::SigningKey;
use rand::RngCore;
use tern_codec::DocumentCodec;
use tern_types::events::UpdateOrigin;
use tern_types::{
    Album, AlbumId, Document, DocumentAddress, Edition, IdentityId, IdentityStatus, Post, PostId,
    Profile, Reply, ReplyId,
};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::node::TernNode;

/// Hash an owner, a creation time and a random nonce into 32 ID bytes.
fn derive_id(owner: &IdentityId, time: u64) -> [u8; 32] {
    let mut nonce = [0u8; 16];
    rand::rng().fill_bytes(&mut nonce);
    let mut hasher = blake3::Hasher::new();
    hasher.update(owner.as_bytes());
    hasher.update(&time.to_be_bytes());
    hasher.update(&nonce);
    hasher.finalize().into()
}

impl TernNode {
    /// Apply `edit` to the draft of a local identity under its update lock.
    async fn edit_local<T, F>(&self, owner: &IdentityId, edit: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Document) -> Result<T, EngineError> + Send,
        T: Send,
    {
        self.require_local(owner)?;
        let guard = self.locks.lock(*owner).await;
        let snapshot = self
            .registry
            .get(owner)
            .ok_or(EngineError::UnknownIdentity(*owner))?;
        let mut document = snapshot
            .document
            .clone()
            .unwrap_or_else(|| Document::empty(*owner));

        let out = edit(&mut document)?;
        self.registry.apply(&guard, document, UpdateOrigin::Local)?;

        let mut locals = self.locals.write().expect("lock poisoned");
        if let Some(local) = locals.get_mut(owner) {
            local.modified = true;
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Posts and replies
    // ------------------------------------------------------------------

    /// Add a post, optionally directed at another identity.
    pub async fn create_post(
        &self,
        owner: &IdentityId,
        recipient: Option<IdentityId>,
        text: impl Into<String>,
    ) -> Result<PostId, EngineError> {
        let time = self.clock.now_millis();
        let post = Post {
            id: PostId::from(derive_id(owner, time)),
            owner: *owner,
            recipient: recipient.filter(|r| r != owner),
            time,
            text: text.into(),
        };
        let id = post.id;
        self.edit_local(owner, move |doc| {
            doc.posts.push(post);
            Ok(())
        })
        .await?;
        info!(%owner, post = %id.short(), "post created");
        Ok(id)
    }

    pub async fn delete_post(&self, owner: &IdentityId, post: &PostId) -> Result<(), EngineError> {
        let post = *post;
        self.edit_local(owner, move |doc| {
            let before = doc.posts.len();
            doc.posts.retain(|p| p.id != post);
            if doc.posts.len() == before {
                return Err(EngineError::PostNotFound(post));
            }
            Ok(())
        })
        .await?;
        info!(%owner, post = %post.short(), "post deleted");
        Ok(())
    }

    /// Reply to any post the node knows of.
    pub async fn create_reply(
        &self,
        owner: &IdentityId,
        post: &PostId,
        text: impl Into<String>,
    ) -> Result<ReplyId, EngineError> {
        if self.registry.view().find_post(post).is_none() {
            return Err(EngineError::PostNotFound(*post));
        }
        let time = self.clock.now_millis();
        let reply = Reply {
            id: ReplyId::from(derive_id(owner, time)),
            owner: *owner,
            post: *post,
            time,
            text: text.into(),
        };
        let id = reply.id;
        self.edit_local(owner, move |doc| {
            doc.replies.push(reply);
            Ok(())
        })
        .await?;
        info!(%owner, reply = %id.short(), post = %post.short(), "reply created");
        Ok(id)
    }

    pub async fn delete_reply(
        &self,
        owner: &IdentityId,
        reply: &ReplyId,
    ) -> Result<(), EngineError> {
        let reply = *reply;
        self.edit_local(owner, move |doc| {
            let before = doc.replies.len();
            doc.replies.retain(|r| r.id != reply);
            if doc.replies.len() == before {
                return Err(EngineError::ReplyNotFound(reply));
            }
            Ok(())
        })
        .await?;
        info!(%owner, reply = %reply.short(), "reply deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Likes
    // ------------------------------------------------------------------

    pub async fn like_post(&self, owner: &IdentityId, post: PostId) -> Result<(), EngineError> {
        self.edit_local(owner, move |doc| {
            doc.liked_posts.insert(post);
            Ok(())
        })
        .await
    }

    pub async fn unlike_post(&self, owner: &IdentityId, post: &PostId) -> Result<(), EngineError> {
        let post = *post;
        self.edit_local(owner, move |doc| {
            doc.liked_posts.remove(&post);
            Ok(())
        })
        .await
    }

    pub async fn like_reply(&self, owner: &IdentityId, reply: ReplyId) -> Result<(), EngineError> {
        self.edit_local(owner, move |doc| {
            doc.liked_replies.insert(reply);
            Ok(())
        })
        .await
    }

    pub async fn unlike_reply(
        &self,
        owner: &IdentityId,
        reply: &ReplyId,
    ) -> Result<(), EngineError> {
        let reply = *reply;
        self.edit_local(owner, move |doc| {
            doc.liked_replies.remove(&reply);
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------
    // Profile and albums
    // ------------------------------------------------------------------

    pub async fn set_profile(&self, owner: &IdentityId, profile: Profile) -> Result<(), EngineError> {
        self.edit_local(owner, move |doc| {
            doc.profile = profile;
            Ok(())
        })
        .await
    }

    /// Add an album at the end of its siblings.
    pub async fn create_album(
        &self,
        owner: &IdentityId,
        parent: Option<AlbumId>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<AlbumId, EngineError> {
        let time = self.clock.now_millis();
        let album = Album {
            id: AlbumId::from(derive_id(owner, time)),
            owner: *owner,
            parent,
            title: title.into(),
            description: description.into(),
        };
        let id = album.id;
        self.edit_local(owner, move |doc| {
            if let Some(parent) = parent
                && doc.album(&parent).is_none()
            {
                return Err(EngineError::AlbumNotFound(parent));
            }
            doc.albums.push(album);
            Ok(())
        })
        .await?;
        debug!(%owner, album = %id.short(), "album created");
        Ok(id)
    }

    pub async fn edit_album(
        &self,
        owner: &IdentityId,
        album: &AlbumId,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), EngineError> {
        let album = *album;
        let title = title.into();
        let description = description.into();
        self.edit_local(owner, move |doc| {
            let entry = doc
                .albums
                .iter_mut()
                .find(|a| a.id == album)
                .ok_or(EngineError::AlbumNotFound(album))?;
            entry.title = title;
            entry.description = description;
            Ok(())
        })
        .await
    }

    /// Swap an album with the previous album of the same parent.
    ///
    /// Returns `false` if it already is the first.
    pub async fn move_album_up(
        &self,
        owner: &IdentityId,
        album: &AlbumId,
    ) -> Result<bool, EngineError> {
        let album = *album;
        self.edit_local(owner, move |doc| {
            let index = album_index(doc, &album)?;
            let parent = doc.albums[index].parent;
            let previous = doc.albums[..index]
                .iter()
                .rposition(|a| a.parent == parent);
            Ok(match previous {
                Some(previous) => {
                    doc.albums.swap(index, previous);
                    true
                }
                None => false,
            })
        })
        .await
    }

    /// Swap an album with the next album of the same parent.
    ///
    /// Returns `false` if it already is the last.
    pub async fn move_album_down(
        &self,
        owner: &IdentityId,
        album: &AlbumId,
    ) -> Result<bool, EngineError> {
        let album = *album;
        self.edit_local(owner, move |doc| {
            let index = album_index(doc, &album)?;
            let parent = doc.albums[index].parent;
            let next = doc.albums[index + 1..]
                .iter()
                .position(|a| a.parent == parent)
                .map(|offset| index + 1 + offset);
            Ok(match next {
                Some(next) => {
                    doc.albums.swap(index, next);
                    true
                }
                None => false,
            })
        })
        .await
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Sign the draft of a local identity and store it as the next edition.
    ///
    /// Returns the inserted edition, or `None` if the identity is locked.
    #[tracing::instrument(skip(self), fields(%identity))]
    pub async fn insert(&self, identity: &IdentityId) -> Result<Option<Edition>, EngineError> {
        self.require_local(identity)?;
        let key = {
            let locals = self.locals.read().expect("lock poisoned");
            match locals.get(identity) {
                Some(local) if local.locked => {
                    debug!(%identity, "identity locked, insert skipped");
                    return Ok(None);
                }
                Some(local) => local.key.clone(),
                None => return Err(EngineError::NotLocal(*identity)),
            }
        };

        let guard = self.locks.lock(*identity).await;
        let snapshot = self
            .registry
            .get(identity)
            .ok_or(EngineError::UnknownIdentity(*identity))?;
        let mut document = snapshot
            .document
            .clone()
            .unwrap_or_else(|| Document::empty(*identity));
        let edition = snapshot.edition + 1;
        document.edition = edition;
        document.time = self.clock.now_millis();

        self.status.set(*identity, IdentityStatus::Inserting);
        let result = self.store_edition(&document, &key).await;
        self.status.set(*identity, IdentityStatus::Idle);
        let signed = result?;

        self.registry.apply(&guard, signed, UpdateOrigin::Local)?;
        // Cleared before the lock is released so a concurrent edit stays
        // marked for the next insert.
        if let Some(local) = self.locals.write().expect("lock poisoned").get_mut(identity) {
            local.modified = false;
        }
        drop(guard);
        info!(%identity, edition, "edition inserted");
        Ok(Some(edition))
    }

    async fn store_edition(
        &self,
        document: &Document,
        key: &SigningKey,
    ) -> Result<Document, EngineError> {
        let bytes = self.codec.encode(document, key)?;
        let signed = self.codec.decode(&bytes)?;
        let address = DocumentAddress::document(document.identity, document.edition);
        self.store.put(&address, bytes).await?;
        Ok(signed)
    }
}

fn album_index(doc: &Document, album: &AlbumId) -> Result<usize, EngineError> {
    doc.albums
        .iter()
        .position(|a| a.id == *album)
        .ok_or(EngineError::AlbumNotFound(*album))
}
