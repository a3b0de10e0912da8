//! Shared test harness for tern integration tests.
//!
//! Provides [`Network`]: N nodes, each owning one local identity, that
//! publish to and refresh from a single shared document store. The store
//! stands in for the distributed key-value layer; failure injection works
//! by corrupting or deleting stored editions.

use std::sync::Arc;

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use tern_engine::{TernNode, TernNodeConfig};
use tern_store::{DocumentStore, MemoryStore, SlowStore};
use tern_types::{DocumentAddress, Edition, IdentityId, PostId, ReplyId};
use tern_visibility::{Clock, FixedClock};

/// Clock reading every network starts at.
pub const T0: u64 = 1_700_000_000_000;

/// One hour in milliseconds.
pub const HOUR: u64 = 3_600_000;

/// Bytes that never decode as a signed document.
pub const GARBAGE: &[u8] = b"\x00\x01\x02 not a document";

/// One participant: a node and the identity it publishes as.
pub struct Peer {
    pub node: Arc<TernNode>,
    pub identity: IdentityId,
    seed: u8,
}

/// A simulated network of nodes sharing one store and one clock.
pub struct Network {
    memory: Arc<MemoryStore>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<FixedClock>,
    config: TernNodeConfig,
    peers: Vec<Peer>,
}

impl Network {
    /// Create `n` nodes with default config over an in-memory store.
    pub fn new(n: usize) -> Self {
        Self::with_config(n, TernNodeConfig::default())
    }

    pub fn with_config(n: usize, config: TernNodeConfig) -> Self {
        let memory = Arc::new(MemoryStore::new());
        let store = memory.clone() as Arc<dyn DocumentStore>;
        Self::build(n, config, memory, store)
    }

    /// Create `n` nodes whose store reads take `min_ms..=max_ms`.
    pub fn with_read_latency(n: usize, min_ms: u64, max_ms: u64, seed: u64) -> Self {
        let memory = Arc::new(MemoryStore::new());
        let slow = SlowStore::new(memory.clone())
            .read_latency(min_ms, max_ms)
            .seed(seed);
        Self::build(n, TernNodeConfig::default(), memory, Arc::new(slow))
    }

    fn build(
        n: usize,
        config: TernNodeConfig,
        memory: Arc<MemoryStore>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let clock = Arc::new(FixedClock::new(T0));
        let mut network = Self {
            memory,
            store,
            clock,
            config,
            peers: Vec::with_capacity(n),
        };
        for i in 0..n {
            let seed = u8::try_from(i + 1).expect("too many peers");
            let peer = network.spawn_peer(seed);
            network.peers.push(peer);
        }
        network
    }

    fn spawn_peer(&self, seed: u8) -> Peer {
        let node = Arc::new(TernNode::new(
            self.config.clone(),
            self.store.clone(),
            self.clock.clone(),
        ));
        let identity = node.create_local_identity(signing_key(seed));
        Peer {
            node,
            identity,
            seed,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn node(&self, i: usize) -> &Arc<TernNode> {
        &self.peers[i].node
    }

    pub fn identity(&self, i: usize) -> IdentityId {
        self.peers[i].identity
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clock(&self) -> &FixedClock {
        &self.clock
    }

    /// The backing store, bypassing any injected latency.
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    // -----------------------------------------------------------------------
    // Topology
    // -----------------------------------------------------------------------

    /// Make node `i` track every other peer's identity, edition unknown.
    pub fn track_all(&self, i: usize) {
        for (j, peer) in self.peers.iter().enumerate() {
            if j != i {
                self.node(i).add_remote_identity(peer.identity, 0);
            }
        }
    }

    /// Every node tracks every other peer.
    pub fn connect_all(&self) {
        for i in 0..self.len() {
            self.track_all(i);
        }
    }

    /// Node `i` follows peer `j`, tracking it first if needed.
    pub fn follow(&self, i: usize, j: usize) {
        self.node(i).add_remote_identity(self.identity(j), 0);
        self.node(i)
            .follow(&self.identity(i), self.identity(j))
            .unwrap();
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Post as peer `i` and publish the result as a new edition.
    pub async fn post(&self, i: usize, text: &str) -> PostId {
        let id = self.draft_post(i, None, text).await;
        self.insert(i).await;
        id
    }

    /// Post as peer `i`, directed at peer `to`, and publish.
    pub async fn post_to(&self, i: usize, to: usize, text: &str) -> PostId {
        let id = self.draft_post(i, Some(self.identity(to)), text).await;
        self.insert(i).await;
        id
    }

    async fn draft_post(&self, i: usize, recipient: Option<IdentityId>, text: &str) -> PostId {
        self.node(i)
            .create_post(&self.identity(i), recipient, text)
            .await
            .unwrap()
    }

    /// Reply as peer `i` and publish.
    pub async fn reply(&self, i: usize, post: &PostId, text: &str) -> ReplyId {
        let id = self
            .node(i)
            .create_reply(&self.identity(i), post, text)
            .await
            .unwrap();
        self.insert(i).await;
        id
    }

    /// Post as peer `i` with the clock moved `ahead` milliseconds forward.
    pub async fn post_from_future(&self, i: usize, ahead: u64, text: &str) -> PostId {
        let now = self.clock.now_millis();
        self.clock.set(now + ahead);
        let id = self.draft_post(i, None, text).await;
        self.clock.set(now);
        self.insert(i).await;
        id
    }

    /// Publish peer `i`'s current draft and return the new edition.
    pub async fn insert(&self, i: usize) -> Edition {
        self.node(i)
            .insert(&self.identity(i))
            .await
            .unwrap()
            .expect("identity is locked")
    }

    // -----------------------------------------------------------------------
    // Synchronisation
    // -----------------------------------------------------------------------

    /// Refresh everything node `i` tracks.
    pub async fn sync(&self, i: usize) {
        self.node(i).refresh_all().await;
    }

    pub async fn sync_all(&self) {
        for i in 0..self.len() {
            self.sync(i).await;
        }
    }

    /// Loaded edition of peer `j` as seen from node `i`, `None` if unloaded.
    pub fn edition_seen(&self, i: usize, j: usize) -> Option<Edition> {
        let snapshot = self.node(i).identity(&self.identity(j))?;
        snapshot.is_loaded().then_some(snapshot.edition)
    }

    // -----------------------------------------------------------------------
    // Failure injection
    // -----------------------------------------------------------------------

    pub fn address(&self, j: usize, edition: Edition) -> DocumentAddress {
        DocumentAddress::document(self.identity(j), edition)
    }

    /// Replace a stored edition of peer `j` with undecodable bytes.
    pub fn corrupt_edition(&self, j: usize, edition: Edition) {
        self.memory
            .overwrite(&self.address(j, edition), Bytes::from_static(GARBAGE));
    }

    /// Delete a stored edition of peer `j`.
    pub fn drop_edition(&self, j: usize, edition: Edition) -> bool {
        self.memory.remove(&self.address(j, edition))
    }

    /// Make every store operation fail until called with `false`.
    pub fn set_store_down(&self, down: bool) {
        self.memory.set_unavailable(down);
    }

    /// Replace node `i` with a fresh node using the same key and store.
    ///
    /// The old node is shut down. The new node restores its own document
    /// from the store but tracks nothing else.
    pub async fn restart(&mut self, i: usize) {
        self.peers[i].node.shutdown().await;
        let peer = self.spawn_peer(self.peers[i].seed);
        peer.node.refresh(&peer.identity).await.unwrap();
        self.peers[i] = peer;
    }

    pub async fn shutdown(&self) {
        for peer in &self.peers {
            peer.node.shutdown().await;
        }
    }
}

/// Deterministic signing key for a peer seed.
pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}
