//! Local view state: what the user has seen and whom they follow.
//!
//! None of this is ever published.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use tern_types::{IdentityId, PostId, ReplyId};

/// Known markers and follow lists.
#[derive(Debug, Default)]
pub struct ViewState {
    known_identities: RwLock<HashSet<IdentityId>>,
    known_posts: RwLock<HashSet<PostId>>,
    known_replies: RwLock<HashSet<ReplyId>>,
    follows: RwLock<HashMap<IdentityId, BTreeSet<IdentityId>>>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_identity_known(&self, id: IdentityId) {
        self.known_identities.write().expect("lock poisoned").insert(id);
    }

    pub fn is_identity_known(&self, id: &IdentityId) -> bool {
        self.known_identities.read().expect("lock poisoned").contains(id)
    }

    pub fn mark_post_known(&self, id: PostId) {
        self.known_posts.write().expect("lock poisoned").insert(id);
    }

    pub fn is_post_known(&self, id: &PostId) -> bool {
        self.known_posts.read().expect("lock poisoned").contains(id)
    }

    pub fn mark_reply_known(&self, id: ReplyId) {
        self.known_replies.write().expect("lock poisoned").insert(id);
    }

    pub fn is_reply_known(&self, id: &ReplyId) -> bool {
        self.known_replies.read().expect("lock poisoned").contains(id)
    }

    /// Returns `false` if `follower` already followed `followee`.
    pub fn follow(&self, follower: IdentityId, followee: IdentityId) -> bool {
        let mut follows = self.follows.write().expect("lock poisoned");
        follows.entry(follower).or_default().insert(followee)
    }

    /// Returns `false` if `follower` did not follow `followee`.
    pub fn unfollow(&self, follower: &IdentityId, followee: &IdentityId) -> bool {
        let mut follows = self.follows.write().expect("lock poisoned");
        follows
            .get_mut(follower)
            .is_some_and(|set| set.remove(followee))
    }

    pub fn is_following(&self, follower: &IdentityId, followee: &IdentityId) -> bool {
        let follows = self.follows.read().expect("lock poisoned");
        follows.get(follower).is_some_and(|set| set.contains(followee))
    }

    pub fn following(&self, follower: &IdentityId) -> BTreeSet<IdentityId> {
        let follows = self.follows.read().expect("lock poisoned");
        follows.get(follower).cloned().unwrap_or_default()
    }

    /// Forget everything about a removed identity.
    pub fn remove_identity(&self, id: &IdentityId) {
        self.known_identities.write().expect("lock poisoned").remove(id);
        let mut follows = self.follows.write().expect("lock poisoned");
        follows.remove(id);
        for set in follows.values_mut() {
            set.remove(id);
        }
    }
}
