//! Resolving links and bare IDs to the objects they name.

use tern_types::{Album, AlbumId, IdentityId, Post, PostId, ReplyId};

use crate::node::TernNode;

/// What a query resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    Identity(IdentityId),
    Post(Post),
    Album(Album),
}

impl TernNode {
    /// Resolve `identity://`, `post://`, `reply://` and `album://` links, or
    /// a bare 64-character hex ID.
    ///
    /// A reply resolves to the post it belongs to. A bare ID is tried as an
    /// identity, a post, a reply and an album, in that order.
    pub fn lookup(&self, query: &str) -> Option<LookupResult> {
        let query = query.trim();
        match query.split_once("://") {
            Some(("identity", id)) => self.lookup_identity(IdentityId::from_hex(id)?),
            Some(("post", id)) => self.lookup_post(&PostId::from_hex(id)?),
            Some(("reply", id)) => self.lookup_reply(&ReplyId::from_hex(id)?),
            Some(("album", id)) => self.lookup_album(&AlbumId::from_hex(id)?),
            Some(_) => None,
            None => {
                self.lookup_identity(IdentityId::from_hex(query)?)
                    .or_else(|| self.lookup_post(&PostId::from_hex(query)?))
                    .or_else(|| self.lookup_reply(&ReplyId::from_hex(query)?))
                    .or_else(|| self.lookup_album(&AlbumId::from_hex(query)?))
            }
        }
    }

    fn lookup_identity(&self, identity: IdentityId) -> Option<LookupResult> {
        self.registry
            .contains(&identity)
            .then_some(LookupResult::Identity(identity))
    }

    fn lookup_post(&self, post: &PostId) -> Option<LookupResult> {
        self.registry
            .view()
            .find_post(post)
            .cloned()
            .map(LookupResult::Post)
    }

    fn lookup_reply(&self, reply: &ReplyId) -> Option<LookupResult> {
        let view = self.registry.view();
        let reply = view.find_reply(reply)?;
        view.find_post(&reply.post).cloned().map(LookupResult::Post)
    }

    fn lookup_album(&self, album: &AlbumId) -> Option<LookupResult> {
        self.registry
            .view()
            .documents()
            .find_map(|doc| doc.album(album))
            .cloned()
            .map(LookupResult::Album)
    }
}
