//! Latency injection for tests that need fetches to overlap.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tern_types::DocumentAddress;

use crate::error::StoreError;
use crate::traits::DocumentStore;

/// Wraps another store and sleeps a seeded random number of milliseconds
/// before each call reaches it.
///
/// ```ignore
/// let store = SlowStore::new(memory).read_latency(5, 20).seed(42);
/// ```
pub struct SlowStore {
    inner: Arc<dyn DocumentStore>,
    reads: RangeInclusive<u64>,
    writes: RangeInclusive<u64>,
    rng: Mutex<StdRng>,
}

impl SlowStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            reads: 0..=0,
            writes: 0..=0,
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }

    /// Delay `get` and `contains` by `min_ms..=max_ms`.
    pub fn read_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.reads = min_ms..=max_ms.max(min_ms);
        self
    }

    /// Delay `put` by `min_ms..=max_ms`.
    pub fn write_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.writes = min_ms..=max_ms.max(min_ms);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    async fn pause(&self, range: &RangeInclusive<u64>) {
        let ms = if range.start() == range.end() {
            *range.start()
        } else {
            self.rng
                .lock()
                .expect("lock poisoned")
                .random_range(range.clone())
        };
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for SlowStore {
    async fn get(&self, address: &DocumentAddress) -> Result<Option<Bytes>, StoreError> {
        self.pause(&self.reads).await;
        self.inner.get(address).await
    }

    async fn put(&self, address: &DocumentAddress, data: Bytes) -> Result<(), StoreError> {
        self.pause(&self.writes).await;
        self.inner.put(address, data).await
    }

    async fn contains(&self, address: &DocumentAddress) -> Result<bool, StoreError> {
        self.pause(&self.reads).await;
        self.inner.contains(address).await
    }
}
