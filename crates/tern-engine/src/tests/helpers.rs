//! Shared test utilities for tern-engine tests.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use tern_codec::{SignedCodec, identity_of};
use tern_store::{DocumentStore, MemoryStore};
use tern_types::{
    Document, DocumentAddress, Edition, IdentityId, Post, PostId, Reply, ReplyId,
};
use tern_visibility::FixedClock;

use crate::node::{TernNode, TernNodeConfig};

/// Clock reading every test node starts at.
pub const T0: u64 = 1_700_000_000_000;

pub struct TestNode {
    pub node: Arc<TernNode>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
}

pub fn test_node() -> TestNode {
    test_node_with(TernNodeConfig::default())
}

pub fn test_node_with(config: TernNodeConfig) -> TestNode {
    let store = Arc::new(MemoryStore::new());
    node_on_store(config, store)
}

/// A node on an existing store, e.g. to simulate a restart.
pub fn node_on_store(config: TernNodeConfig, store: Arc<MemoryStore>) -> TestNode {
    let clock = Arc::new(FixedClock::new(T0));
    let node = Arc::new(TernNode::new(config, store.clone(), clock.clone()));
    TestNode { node, store, clock }
}

pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// A remote identity publishing straight to a store.
pub struct Publisher {
    pub key: SigningKey,
    pub identity: IdentityId,
    pub document: Document,
}

impl Publisher {
    pub fn new(seed: u8) -> Self {
        let key = key(seed);
        let identity = identity_of(&key);
        Self {
            key,
            identity,
            document: Document::empty(identity),
        }
    }

    pub fn post(&mut self, text: &str, time: u64) -> Post {
        self.post_to(None, text, time)
    }

    pub fn post_to(&mut self, recipient: Option<IdentityId>, text: &str, time: u64) -> Post {
        let post = Post {
            id: PostId::from_data(format!("{}/{text}/{time}", self.identity).as_bytes()),
            owner: self.identity,
            recipient,
            time,
            text: text.to_string(),
        };
        self.document.posts.push(post.clone());
        post
    }

    pub fn reply(&mut self, post: PostId, text: &str, time: u64) -> Reply {
        let reply = Reply {
            id: ReplyId::from_data(format!("{}/{post}/{text}/{time}", self.identity).as_bytes()),
            owner: self.identity,
            post,
            time,
            text: text.to_string(),
        };
        self.document.replies.push(reply.clone());
        reply
    }

    /// Sign the current document as `edition` without storing it.
    pub fn sign(&self, edition: Edition) -> Bytes {
        let mut document = self.document.clone();
        document.edition = edition;
        document.time = T0;
        SignedCodec::new().encode(&document, &self.key).unwrap()
    }

    /// Store the current document as the next edition.
    pub async fn publish(&mut self, store: &dyn DocumentStore) -> Edition {
        let edition = self.document.edition + 1;
        self.publish_as(store, edition).await;
        self.document.edition = edition;
        edition
    }

    /// Store the current document as `edition`.
    pub async fn publish_as(&self, store: &dyn DocumentStore, edition: Edition) {
        let address = DocumentAddress::document(self.identity, edition);
        store.put(&address, self.sign(edition)).await.unwrap();
    }

    pub fn address(&self, edition: Edition) -> DocumentAddress {
        DocumentAddress::document(self.identity, edition)
    }
}

/// Poll `cond` until it holds, yielding to spawned tasks in between.
pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
