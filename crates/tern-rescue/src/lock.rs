//! Per-identity exclusive update locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tern_types::IdentityId;
use tokio::sync::OwnedMutexGuard;

use crate::error::RescueError;

/// One async mutex per identity, created on first use.
///
/// Every writer of an identity's snapshot (rescue, refresh, local edits)
/// holds the identity's lock while merging. Readers never take it.
#[derive(Default)]
pub struct UpdateLocks {
    locks: Mutex<HashMap<IdentityId, Arc<tokio::sync::Mutex<()>>>>,
}

/// Proof that the holder owns an identity's update lock.
///
/// Only [`UpdateLocks`] can create one. The lock is released on drop.
pub struct UpdateGuard {
    identity: IdentityId,
    _guard: OwnedMutexGuard<()>,
}

impl UpdateGuard {
    pub fn identity(&self) -> IdentityId {
        self.identity
    }
}

impl std::fmt::Debug for UpdateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateGuard")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl UpdateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, identity: IdentityId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock poisoned");
        locks.entry(identity).or_default().clone()
    }

    /// Wait until the identity's lock is free and take it.
    pub async fn lock(&self, identity: IdentityId) -> UpdateGuard {
        let guard = self.slot(identity).lock_owned().await;
        UpdateGuard {
            identity,
            _guard: guard,
        }
    }

    /// Like [`lock`](Self::lock) but gives up after `timeout`.
    pub async fn lock_timeout(
        &self,
        identity: IdentityId,
        timeout: Duration,
    ) -> Result<UpdateGuard, RescueError> {
        tokio::time::timeout(timeout, self.lock(identity))
            .await
            .map_err(|_| RescueError::LockTimeout { identity })
    }

    /// Take the lock only if it is free right now.
    pub fn try_lock(&self, identity: IdentityId) -> Option<UpdateGuard> {
        let guard = self.slot(identity).try_lock_owned().ok()?;
        Some(UpdateGuard {
            identity,
            _guard: guard,
        })
    }

    /// Whether someone currently holds the identity's lock.
    pub fn is_locked(&self, identity: IdentityId) -> bool {
        self.slot(identity).try_lock().is_err()
    }

    /// Forget the lock of a removed identity.
    pub fn remove(&self, identity: &IdentityId) {
        let mut locks = self.locks.lock().expect("lock poisoned");
        locks.remove(identity);
    }
}
