//! Identity registry: the local document cache.
//!
//! Each identity's state is an immutable [`IdentitySnapshot`] behind an
//! `Arc`. Writers build a new snapshot and swap the pointer, so readers see
//! either the old or the new snapshot in full. Every swap requires an
//! [`UpdateGuard`] for the identity.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tern_rescue::{DocumentSink, MergeMode, RescueError, UpdateGuard};
use tern_types::events::{
    EventBus, IdentityUpdated, PostFound, PostRemoved, ReplyFound, ReplyRemoved, UpdateOrigin,
};
use tern_types::{Document, Edition, IdentityId, Post, PostId, ReplyId};
use tern_visibility::{Clock, ContentSource};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::view::ViewState;

/// Immutable state of one identity.
#[derive(Debug, Clone)]
pub struct IdentitySnapshot {
    pub identity: IdentityId,
    /// Edition of `document`, or the latest edition heard of if none is loaded.
    pub edition: Edition,
    /// The current document, `None` until one has been fetched.
    pub document: Option<Document>,
    /// Whether this node holds the identity's signing key.
    pub local: bool,
    /// When the snapshot was last replaced (ms since the Unix epoch), 0 if never.
    pub last_updated: u64,
}

impl IdentitySnapshot {
    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }
}

/// All known identities.
pub struct Registry {
    identities: RwLock<HashMap<IdentityId, Arc<IdentitySnapshot>>>,
    view: Arc<ViewState>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl Registry {
    pub fn new(view: Arc<ViewState>, bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
            view,
            bus,
            clock,
        }
    }

    /// Register a remote identity known to exist at `edition`.
    ///
    /// Returns `false` if the identity was already registered.
    pub fn add_remote(&self, identity: IdentityId, edition: Edition) -> bool {
        let mut identities = self.identities.write().expect("lock poisoned");
        if identities.contains_key(&identity) {
            return false;
        }
        identities.insert(
            identity,
            Arc::new(IdentitySnapshot {
                identity,
                edition,
                document: None,
                local: false,
                last_updated: 0,
            }),
        );
        info!(%identity, edition, "remote identity added");
        true
    }

    /// Register a local identity with an empty, unpublished document.
    ///
    /// An already registered identity is turned local and keeps its document.
    pub fn add_local(&self, identity: IdentityId) {
        let mut identities = self.identities.write().expect("lock poisoned");
        let snapshot = match identities.get(&identity) {
            Some(existing) => IdentitySnapshot {
                local: true,
                ..(**existing).clone()
            },
            None => IdentitySnapshot {
                identity,
                edition: 0,
                document: Some(Document::empty(identity)),
                local: true,
                last_updated: 0,
            },
        };
        identities.insert(identity, Arc::new(snapshot));
        info!(%identity, "local identity added");
    }

    pub fn remove(&self, identity: &IdentityId) -> bool {
        let mut identities = self.identities.write().expect("lock poisoned");
        identities.remove(identity).is_some()
    }

    pub fn get(&self, identity: &IdentityId) -> Option<Arc<IdentitySnapshot>> {
        let identities = self.identities.read().expect("lock poisoned");
        identities.get(identity).cloned()
    }

    pub fn contains(&self, identity: &IdentityId) -> bool {
        self.identities
            .read()
            .expect("lock poisoned")
            .contains_key(identity)
    }

    pub fn ids(&self) -> Vec<IdentityId> {
        let identities = self.identities.read().expect("lock poisoned");
        identities.keys().copied().collect()
    }

    /// Pin the current snapshot of every identity.
    pub fn view(&self) -> RegistryView {
        let identities = self.identities.read().expect("lock poisoned");
        RegistryView {
            identities: identities.clone(),
        }
    }

    /// Replace an identity's document.
    ///
    /// [`UpdateOrigin::Refresh`] ignores documents that are not newer than
    /// the loaded one. Returns whether the snapshot changed.
    pub fn apply(
        &self,
        guard: &UpdateGuard,
        document: Document,
        origin: UpdateOrigin,
    ) -> Result<bool, EngineError> {
        let identity = document.identity;
        if guard.identity() != identity {
            return Err(EngineError::WrongLock {
                held: guard.identity(),
                wanted: identity,
            });
        }
        let previous = self
            .get(&identity)
            .ok_or(EngineError::UnknownIdentity(identity))?;

        if origin == UpdateOrigin::Refresh
            && let Some(current) = &previous.document
            && current.edition >= document.edition
        {
            debug!(%identity, edition = document.edition, "ignoring edition that is not newer");
            return Ok(false);
        }

        let edition = document.edition;
        let (found_posts, removed_posts, found_replies, removed_replies) =
            diff(previous.document.as_ref(), &document);

        let snapshot = Arc::new(IdentitySnapshot {
            identity,
            edition,
            document: Some(document),
            local: previous.local,
            last_updated: self.clock.now_millis(),
        });
        {
            let mut identities = self.identities.write().expect("lock poisoned");
            identities.insert(identity, snapshot);
        }

        if previous.local {
            for post in &found_posts {
                self.view.mark_post_known(post.id);
            }
            for reply in &found_replies {
                self.view.mark_reply_known(reply.id);
            }
        }

        info!(
            %identity,
            edition,
            ?origin,
            new_posts = found_posts.len(),
            removed_posts = removed_posts.len(),
            new_replies = found_replies.len(),
            removed_replies = removed_replies.len(),
            "identity updated"
        );

        self.bus.emit(IdentityUpdated {
            identity,
            edition,
            origin,
        });
        for post in found_posts {
            self.bus.emit(PostFound { post });
        }
        for post in removed_posts {
            self.bus.emit(PostRemoved { post });
        }
        for reply in found_replies {
            self.bus.emit(ReplyFound { reply });
        }
        for reply in removed_replies {
            self.bus.emit(ReplyRemoved { reply });
        }
        Ok(true)
    }
}

type Diff = (
    Vec<Post>,
    Vec<Post>,
    Vec<tern_types::Reply>,
    Vec<tern_types::Reply>,
);

/// Posts and replies added and removed between two documents.
fn diff(old: Option<&Document>, new: &Document) -> Diff {
    let old_posts: HashSet<PostId> = old
        .map(|d| d.posts.iter().map(|p| p.id).collect())
        .unwrap_or_default();
    let old_replies: HashSet<ReplyId> = old
        .map(|d| d.replies.iter().map(|r| r.id).collect())
        .unwrap_or_default();
    let new_posts: HashSet<PostId> = new.posts.iter().map(|p| p.id).collect();
    let new_replies: HashSet<ReplyId> = new.replies.iter().map(|r| r.id).collect();

    let found_posts = new
        .posts
        .iter()
        .filter(|p| !old_posts.contains(&p.id))
        .cloned()
        .collect();
    let found_replies = new
        .replies
        .iter()
        .filter(|r| !old_replies.contains(&r.id))
        .cloned()
        .collect();

    let (removed_posts, removed_replies) = match old {
        Some(old) => (
            old.posts
                .iter()
                .filter(|p| !new_posts.contains(&p.id))
                .cloned()
                .collect(),
            old.replies
                .iter()
                .filter(|r| !new_replies.contains(&r.id))
                .cloned()
                .collect(),
        ),
        None => (Vec::new(), Vec::new()),
    };

    (found_posts, removed_posts, found_replies, removed_replies)
}

#[async_trait::async_trait]
impl DocumentSink for Registry {
    fn current_edition(&self, identity: &IdentityId) -> Option<Edition> {
        self.get(identity).map(|s| s.edition)
    }

    async fn merge(
        &self,
        guard: &UpdateGuard,
        document: Document,
        mode: MergeMode,
    ) -> Result<(), RescueError> {
        let origin = match mode {
            MergeMode::Rescue => UpdateOrigin::Rescue,
            MergeMode::Refresh => UpdateOrigin::Refresh,
        };
        self.apply(guard, document, origin)
            .map(|_| ())
            .map_err(|e| RescueError::Sink(e.to_string()))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let identities = self.identities.read().expect("lock poisoned");
        f.debug_struct("Registry")
            .field("identities", &identities.len())
            .finish_non_exhaustive()
    }
}

/// The snapshots of every identity at one instant.
///
/// Listings resolve owners and parent posts through one view so that
/// concurrent merges cannot change the data halfway through.
#[derive(Debug, Clone)]
pub struct RegistryView {
    identities: HashMap<IdentityId, Arc<IdentitySnapshot>>,
}

impl RegistryView {
    pub fn get(&self, identity: &IdentityId) -> Option<&IdentitySnapshot> {
        self.identities.get(identity).map(|s| s.as_ref())
    }

    /// Every loaded document.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.identities.values().filter_map(|s| s.document.as_ref())
    }

    /// Find a post in any loaded document.
    pub fn find_post(&self, id: &PostId) -> Option<&Post> {
        self.documents().find_map(|d| d.post(id))
    }

    /// Find a reply in any loaded document.
    pub fn find_reply(&self, id: &ReplyId) -> Option<&tern_types::Reply> {
        self.documents().find_map(|d| d.reply(id))
    }
}

impl ContentSource for RegistryView {
    fn is_loaded(&self, identity: &IdentityId) -> bool {
        self.identities.get(identity).is_some_and(|s| s.is_loaded())
    }

    fn post(&self, id: &PostId) -> Option<Post> {
        self.find_post(id).cloned()
    }
}
