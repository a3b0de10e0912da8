//! Post and reply visibility rules.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tern_trust::TrustGraph;
use tern_types::{IdentityId, Post, PostId, Reply};
use tracing::trace;

use crate::clock::Clock;

/// Policy knobs for the trust gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityPolicy {
    /// Hide posts of owners the viewer has no trust information about.
    pub hide_trustless: bool,
}

/// Resolves the references a visibility check follows.
pub trait ContentSource: Send + Sync {
    /// Whether the identity's document is known locally.
    fn is_loaded(&self, identity: &IdentityId) -> bool;

    /// The post with the given ID, from whichever document contains it.
    fn post(&self, id: &PostId) -> Option<Post>;
}

/// A post or a reply.
#[derive(Debug, Clone, Copy)]
pub enum ContentItem<'a> {
    Post(&'a Post),
    Reply(&'a Reply),
}

impl<'a> From<&'a Post> for ContentItem<'a> {
    fn from(post: &'a Post) -> Self {
        Self::Post(post)
    }
}

impl<'a> From<&'a Reply> for ContentItem<'a> {
    fn from(reply: &'a Reply) -> Self {
        Self::Reply(reply)
    }
}

/// Stateless visibility filter.
///
/// Holds only its collaborators. Every check reads the trust graph and the
/// content source afresh; callers wanting to avoid repeated work memoize per
/// listing.
pub struct VisibilityFilter {
    trust: Arc<TrustGraph>,
    clock: Arc<dyn Clock>,
    policy: VisibilityPolicy,
}

impl VisibilityFilter {
    pub fn new(trust: Arc<TrustGraph>, clock: Arc<dyn Clock>, policy: VisibilityPolicy) -> Self {
        Self {
            trust,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> VisibilityPolicy {
        self.policy
    }

    /// Pin `viewer` and the current instant for one listing.
    pub fn scope<'a>(
        &'a self,
        viewer: Option<IdentityId>,
        source: &'a dyn ContentSource,
    ) -> ViewerScope<'a> {
        ViewerScope {
            filter: self,
            viewer,
            now: self.clock.now_millis(),
            source,
        }
    }

    /// One-off check. Listings should go through [`scope`](Self::scope).
    pub fn is_visible(
        &self,
        viewer: Option<IdentityId>,
        item: ContentItem<'_>,
        source: &dyn ContentSource,
    ) -> bool {
        self.scope(viewer, source).is_visible(item)
    }
}

impl std::fmt::Debug for VisibilityFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityFilter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// One viewer and one clock reading, shared by every check of a listing.
pub struct ViewerScope<'a> {
    filter: &'a VisibilityFilter,
    viewer: Option<IdentityId>,
    now: u64,
    source: &'a dyn ContentSource,
}

impl ViewerScope<'_> {
    pub fn viewer(&self) -> Option<IdentityId> {
        self.viewer
    }

    /// The instant all checks in this scope compare against.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_visible(&self, item: ContentItem<'_>) -> bool {
        match item {
            ContentItem::Post(post) => self.is_post_visible(post),
            ContentItem::Reply(reply) => self.is_reply_visible(reply),
        }
    }

    /// Owner must be loaded, the viewer must not distrust the owner and the
    /// post must not be dated in the future.
    pub fn is_post_visible(&self, post: &Post) -> bool {
        if !self.source.is_loaded(&post.owner) {
            trace!(post = %post.id, "post hidden: owner not loaded");
            return false;
        }
        if let Some(viewer) = self.viewer
            && viewer != post.owner
            && !self.trust_allows(&viewer, &post.owner)
        {
            trace!(post = %post.id, %viewer, "post hidden by trust");
            return false;
        }
        if post.time > self.now {
            trace!(post = %post.id, time = post.time, now = self.now, "post hidden: future time");
            return false;
        }
        true
    }

    /// Parent post must resolve and be visible, and the reply must not be
    /// dated in the future.
    pub fn is_reply_visible(&self, reply: &Reply) -> bool {
        if !self.source.is_loaded(&reply.owner) {
            return false;
        }
        let Some(post) = self.source.post(&reply.post) else {
            trace!(reply = %reply.id, "reply hidden: parent post missing");
            return false;
        };
        if !self.is_post_visible(&post) {
            return false;
        }
        reply.time <= self.now
    }

    fn trust_allows(&self, viewer: &IdentityId, owner: &IdentityId) -> bool {
        let trust = self.filter.trust.trust_of(viewer, owner);
        if trust.is_untrusted() {
            return false;
        }
        let trusted = trust.has_path() || trust.explicit.is_some_and(|v| v > 0);
        trusted || !self.filter.policy.hide_trustless
    }
}
