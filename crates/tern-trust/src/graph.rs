//! The trust graph.

use std::collections::HashMap;
use std::sync::RwLock;

use tern_types::IdentityId;
use tracing::debug;

use crate::trust::{Trust, TrustValues};

/// Trust edges keyed by `(truster, trustee)`.
///
/// Lookups never fail. Implicit values and distances are not computed here;
/// an external propagation step feeds them in through
/// [`set_implicit`](Self::set_implicit).
pub struct TrustGraph {
    edges: RwLock<HashMap<(IdentityId, IdentityId), Trust>>,
    values: TrustValues,
}

impl TrustGraph {
    pub fn new(values: TrustValues) -> Self {
        Self {
            edges: RwLock::new(HashMap::new()),
            values,
        }
    }

    /// The explicit values used by [`trust`](Self::trust) and
    /// [`distrust`](Self::distrust).
    pub fn values(&self) -> TrustValues {
        self.values
    }

    /// Record or clear a direct opinion. Implicit and distance are kept.
    pub fn set_trust(&self, truster: IdentityId, trustee: IdentityId, explicit: Option<i32>) {
        debug!(%truster, %trustee, ?explicit, "setting explicit trust");
        self.update(truster, trustee, |t| t.explicit = explicit);
    }

    /// Record the propagated score and distance for an edge.
    pub fn set_implicit(
        &self,
        truster: IdentityId,
        trustee: IdentityId,
        implicit: Option<i32>,
        distance: Option<u32>,
    ) {
        self.update(truster, trustee, |t| {
            t.implicit = implicit;
            t.distance = distance;
        });
    }

    /// Current trust of `truster` in `trustee`, [`Trust::NONE`] if unknown.
    pub fn trust_of(&self, truster: &IdentityId, trustee: &IdentityId) -> Trust {
        let edges = self.edges.read().expect("lock poisoned");
        edges
            .get(&(*truster, *trustee))
            .copied()
            .unwrap_or(Trust::NONE)
    }

    /// Set explicit trust to the configured positive value.
    pub fn trust(&self, truster: IdentityId, trustee: IdentityId) {
        self.set_trust(truster, trustee, Some(self.values.positive));
    }

    /// Set explicit trust to the configured negative value.
    pub fn distrust(&self, truster: IdentityId, trustee: IdentityId) {
        self.set_trust(truster, trustee, Some(self.values.negative));
    }

    /// Clear the explicit opinion.
    pub fn untrust(&self, truster: IdentityId, trustee: IdentityId) {
        self.set_trust(truster, trustee, None);
    }

    /// All known edges from `truster`.
    pub fn edges_from(&self, truster: &IdentityId) -> Vec<(IdentityId, Trust)> {
        let edges = self.edges.read().expect("lock poisoned");
        edges
            .iter()
            .filter(|((from, _), _)| from == truster)
            .map(|((_, to), trust)| (*to, *trust))
            .collect()
    }

    /// Drop every edge touching `identity`.
    pub fn remove_identity(&self, identity: &IdentityId) {
        let mut edges = self.edges.write().expect("lock poisoned");
        edges.retain(|(from, to), _| from != identity && to != identity);
    }

    fn update(&self, truster: IdentityId, trustee: IdentityId, f: impl FnOnce(&mut Trust)) {
        let mut edges = self.edges.write().expect("lock poisoned");
        let entry = edges.entry((truster, trustee)).or_default();
        f(entry);
        if entry.is_none() {
            edges.remove(&(truster, trustee));
        }
    }
}

impl Default for TrustGraph {
    fn default() -> Self {
        Self::new(TrustValues::default())
    }
}

impl std::fmt::Debug for TrustGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let edges = self.edges.read().expect("lock poisoned");
        f.debug_struct("TrustGraph")
            .field("edge_count", &edges.len())
            .field("values", &self.values)
            .finish()
    }
}
