//! Content listings.
//!
//! Every listing pins one [`RegistryView`](crate::RegistryView) and one
//! [`ViewerScope`](tern_visibility::ViewerScope), so all of its items are
//! judged against the same snapshots, viewer and instant.

use std::collections::{HashMap, HashSet};

use tern_types::{IdentityId, Post, PostId, Reply, ReplyId};

use crate::node::TernNode;

fn newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| a.id.cmp(&b.id)));
}

impl TernNode {
    /// Posts of `viewer`, of identities `viewer` follows and posts directed
    /// at `viewer`, newest first.
    pub fn feed(&self, viewer: &IdentityId) -> Vec<Post> {
        let view = self.registry.view();
        let scope = self.filter.scope(Some(*viewer), &view);
        let following = self.view.following(viewer);

        let mut seen = HashSet::new();
        let mut posts: Vec<Post> = view
            .documents()
            .flat_map(|doc| doc.posts.iter())
            .filter(|post| {
                post.owner == *viewer
                    || following.contains(&post.owner)
                    || post.recipient == Some(*viewer)
            })
            .filter(|post| seen.insert(post.id))
            .filter(|post| scope.is_post_visible(post))
            .cloned()
            .collect();
        newest_first(&mut posts);
        posts
    }

    /// Posts by `identity` and posts directed at it, newest first.
    pub fn posts_of(&self, identity: &IdentityId, viewer: Option<IdentityId>) -> Vec<Post> {
        let view = self.registry.view();
        let scope = self.filter.scope(viewer, &view);

        let mut posts: Vec<Post> = view
            .documents()
            .flat_map(|doc| doc.posts.iter())
            .filter(|post| post.owner == *identity || post.recipient == Some(*identity))
            .filter(|post| scope.is_post_visible(post))
            .cloned()
            .collect();
        newest_first(&mut posts);
        posts
    }

    /// Replies to `post` from every loaded document, oldest first.
    pub fn replies_to(&self, post: &PostId, viewer: Option<IdentityId>) -> Vec<Reply> {
        let view = self.registry.view();
        let scope = self.filter.scope(viewer, &view);

        let mut replies: Vec<Reply> = view
            .documents()
            .flat_map(|doc| doc.replies.iter())
            .filter(|reply| reply.post == *post)
            .filter(|reply| scope.is_reply_visible(reply))
            .cloned()
            .collect();
        replies.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
        replies
    }

    /// Posts `identity` replied to without owning or receiving them,
    /// ordered by its newest reply to each, newest first.
    pub fn replied_posts(&self, identity: &IdentityId, viewer: Option<IdentityId>) -> Vec<Post> {
        let view = self.registry.view();
        let scope = self.filter.scope(viewer, &view);
        let Some(document) = view.get(identity).and_then(|s| s.document.as_ref()) else {
            return Vec::new();
        };

        let mut latest: HashMap<PostId, u64> = HashMap::new();
        for reply in &document.replies {
            if !scope.is_reply_visible(reply) {
                continue;
            }
            let time = latest.entry(reply.post).or_insert(reply.time);
            *time = (*time).max(reply.time);
        }

        let mut posts: Vec<(u64, Post)> = latest
            .into_iter()
            .filter_map(|(id, time)| view.find_post(&id).map(|post| (time, post.clone())))
            .filter(|(_, post)| post.owner != *identity && post.recipient != Some(*identity))
            .collect();
        posts.sort_by(|(ta, a), (tb, b)| tb.cmp(ta).then_with(|| a.id.cmp(&b.id)));
        posts.into_iter().map(|(_, post)| post).collect()
    }

    /// Visible posts not yet marked known, newest first.
    pub fn new_posts(&self, viewer: Option<IdentityId>) -> Vec<Post> {
        let view = self.registry.view();
        let scope = self.filter.scope(viewer, &view);

        let mut posts: Vec<Post> = view
            .documents()
            .flat_map(|doc| doc.posts.iter())
            .filter(|post| !self.view.is_post_known(&post.id))
            .filter(|post| scope.is_post_visible(post))
            .cloned()
            .collect();
        newest_first(&mut posts);
        posts
    }

    /// Visible replies not yet marked known, oldest first.
    pub fn new_replies(&self, viewer: Option<IdentityId>) -> Vec<Reply> {
        let view = self.registry.view();
        let scope = self.filter.scope(viewer, &view);

        let mut replies: Vec<Reply> = view
            .documents()
            .flat_map(|doc| doc.replies.iter())
            .filter(|reply| !self.view.is_reply_known(&reply.id))
            .filter(|reply| scope.is_reply_visible(reply))
            .cloned()
            .collect();
        replies.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
        replies
    }

    /// Whether `post` is visible to `viewer` right now.
    pub fn is_post_visible(&self, post: &Post, viewer: Option<IdentityId>) -> bool {
        let view = self.registry.view();
        self.filter.scope(viewer, &view).is_post_visible(post)
    }

    /// Whether `reply` is visible to `viewer` right now.
    pub fn is_reply_visible(&self, reply: &Reply, viewer: Option<IdentityId>) -> bool {
        let view = self.registry.view();
        self.filter.scope(viewer, &view).is_reply_visible(reply)
    }

    pub fn mark_identity_known(&self, identity: IdentityId) {
        self.view.mark_identity_known(identity);
    }

    pub fn mark_post_known(&self, post: PostId) {
        self.view.mark_post_known(post);
    }

    pub fn mark_reply_known(&self, reply: ReplyId) {
        self.view.mark_reply_known(reply);
    }
}
