//! Per-identity status tracking.

use std::collections::HashMap;
use std::sync::RwLock;

use tern_types::events::{EventBus, IdentityStatusChanged};
use tern_types::{IdentityId, IdentityStatus};

/// Current [`IdentityStatus`] of every identity the node deals with.
///
/// Changes are announced as [`IdentityStatusChanged`] events.
pub struct StatusBoard {
    statuses: RwLock<HashMap<IdentityId, IdentityStatus>>,
    bus: EventBus,
}

impl StatusBoard {
    pub fn new(bus: EventBus) -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Status of `identity`, [`IdentityStatus::Unknown`] if never set.
    pub fn get(&self, identity: &IdentityId) -> IdentityStatus {
        let statuses = self.statuses.read().expect("lock poisoned");
        statuses.get(identity).copied().unwrap_or_default()
    }

    /// Set the status, emitting an event if it changed.
    pub fn set(&self, identity: IdentityId, status: IdentityStatus) {
        let previous = {
            let mut statuses = self.statuses.write().expect("lock poisoned");
            statuses.insert(identity, status)
        };
        if previous != Some(status) {
            self.bus.emit(IdentityStatusChanged { identity, status });
        }
    }

    pub fn remove(&self, identity: &IdentityId) {
        let mut statuses = self.statuses.write().expect("lock poisoned");
        statuses.remove(identity);
    }
}

impl std::fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let statuses = self.statuses.read().expect("lock poisoned");
        f.debug_struct("StatusBoard")
            .field("identities", &statuses.len())
            .finish()
    }
}
