//! [`TernNode`]: the node orchestrator that ties all components together.
//!
//! A `TernNode` owns the identity registry, the trust graph, the view state
//! and one rescue controller per identity under rescue. Publishing, refresh,
//! listings and lookup live in sibling modules as further `impl TernNode`
//! blocks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use ed25519_dalek::SigningKey;
use tern_codec::{DocumentCodec, SignedCodec, identity_of};
use tern_rescue::{
    EditionFetcher, RescueConfig, RescueController, RescueError, RescueHandle, StatusBoard,
    UpdateGuard, UpdateLocks,
};
use tern_store::DocumentStore;
use tern_trust::{Trust, TrustGraph, TrustValues};
use tern_types::events::EventBus;
use tern_types::{Edition, IdentityId, IdentityStatus};
use tern_visibility::{Clock, VisibilityFilter, VisibilityPolicy};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::EngineError;
use crate::registry::{IdentitySnapshot, Registry};
use crate::view::ViewState;

/// Configuration of the normal refresh cycle.
#[derive(Debug, Clone, Copy)]
pub struct RefreshConfig {
    /// Maximum number of editions probed past the current one per refresh.
    pub max_probe: u64,
    /// Delay between two passes of the refresh loop.
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_probe: 16,
            interval: Duration::from_secs(60),
        }
    }
}

/// Configuration for creating a [`TernNode`].
#[derive(Debug, Clone, Default)]
pub struct TernNodeConfig {
    pub rescue: RescueConfig,
    pub refresh: RefreshConfig,
    pub visibility: VisibilityPolicy,
    pub trust_values: TrustValues,
}

/// Status line of one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityInfo {
    pub identity: IdentityId,
    pub status: IdentityStatus,
    pub local: bool,
    /// Local identity whose inserts are suspended.
    pub locked: bool,
    /// Local identity with changes not yet inserted.
    pub modified: bool,
    pub loaded: bool,
    pub edition: Edition,
    /// Time of the last merge (ms since the Unix epoch), 0 if never.
    pub last_updated: u64,
}

/// Signing key and draft flags of a local identity.
pub(crate) struct LocalIdentity {
    pub(crate) key: SigningKey,
    pub(crate) locked: bool,
    pub(crate) modified: bool,
}

/// The node orchestrator.
pub struct TernNode {
    pub(crate) config: TernNodeConfig,
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) codec: Arc<SignedCodec>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) bus: EventBus,
    pub(crate) trust: Arc<TrustGraph>,
    pub(crate) filter: VisibilityFilter,
    pub(crate) view: Arc<ViewState>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) status: Arc<StatusBoard>,
    pub(crate) fetcher: Arc<EditionFetcher>,
    pub(crate) locks: Arc<UpdateLocks>,
    pub(crate) locals: RwLock<HashMap<IdentityId, LocalIdentity>>,
    rescuers: Mutex<HashMap<IdentityId, Arc<RescueHandle>>>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) refresh_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TernNode {
    /// Create a node on top of a document store.
    pub fn new(
        config: TernNodeConfig,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bus = EventBus::new();
        let codec = Arc::new(SignedCodec::new());
        let trust = Arc::new(TrustGraph::new(config.trust_values));
        let filter = VisibilityFilter::new(trust.clone(), clock.clone(), config.visibility);
        let view = Arc::new(ViewState::new());
        let registry = Arc::new(Registry::new(view.clone(), bus.clone(), clock.clone()));
        let status = Arc::new(StatusBoard::new(bus.clone()));
        let fetcher = Arc::new(EditionFetcher::new(
            store.clone(),
            codec.clone() as Arc<dyn DocumentCodec>,
            status.clone(),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            store,
            codec,
            clock,
            bus,
            trust,
            filter,
            view,
            registry,
            status,
            fetcher,
            locks: Arc::new(UpdateLocks::new()),
            locals: RwLock::new(HashMap::new()),
            rescuers: Mutex::new(HashMap::new()),
            shutdown_tx,
            refresh_task: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn trust_graph(&self) -> &Arc<TrustGraph> {
        &self.trust
    }

    pub fn view_state(&self) -> &Arc<ViewState> {
        &self.view
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Take the update lock of an identity.
    ///
    /// Every merge into the registry needs the returned guard.
    pub async fn lock_updates(&self, identity: IdentityId) -> UpdateGuard {
        self.locks.lock(identity).await
    }

    // ------------------------------------------------------------------
    // Identities
    // ------------------------------------------------------------------

    /// Start tracking a remote identity.
    ///
    /// `edition` is the newest edition known to exist, 0 if unknown. The
    /// first refresh starts probing there. Returns `false` if the identity
    /// was already tracked.
    pub fn add_remote_identity(&self, identity: IdentityId, edition: Edition) -> bool {
        let added = self.registry.add_remote(identity, edition);
        if added {
            self.view.mark_identity_known(identity);
        }
        added
    }

    /// Register a local identity with an empty draft document.
    pub fn create_local_identity(&self, key: SigningKey) -> IdentityId {
        let identity = identity_of(&key);
        self.registry.add_local(identity);
        self.view.mark_identity_known(identity);
        let mut locals = self.locals.write().expect("lock poisoned");
        locals.insert(
            identity,
            LocalIdentity {
                key,
                locked: false,
                modified: false,
            },
        );
        identity
    }

    /// Forget an identity together with its trust edges, follows and rescuer.
    pub fn remove_identity(&self, identity: &IdentityId) -> Result<(), EngineError> {
        if !self.registry.remove(identity) {
            return Err(EngineError::UnknownIdentity(*identity));
        }
        self.locals.write().expect("lock poisoned").remove(identity);
        self.view.remove_identity(identity);
        self.trust.remove_identity(identity);
        self.status.remove(identity);
        self.locks.remove(identity);
        let rescuer = self.rescuers.lock().expect("lock poisoned").remove(identity);
        if let Some(rescuer) = rescuer {
            rescuer.stop();
        }
        info!(%identity, "identity removed");
        Ok(())
    }

    /// Current snapshot of an identity.
    pub fn identity(&self, identity: &IdentityId) -> Option<Arc<IdentitySnapshot>> {
        self.registry.get(identity)
    }

    pub fn identities(&self) -> Vec<IdentityId> {
        let mut ids = self.registry.ids();
        ids.sort();
        ids
    }

    pub fn is_local(&self, identity: &IdentityId) -> bool {
        self.locals
            .read()
            .expect("lock poisoned")
            .contains_key(identity)
    }

    pub fn local_identities(&self) -> Vec<IdentityId> {
        let locals = self.locals.read().expect("lock poisoned");
        let mut ids: Vec<IdentityId> = locals.keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn require_local(&self, identity: &IdentityId) -> Result<(), EngineError> {
        if self.is_local(identity) {
            Ok(())
        } else if self.registry.contains(identity) {
            Err(EngineError::NotLocal(*identity))
        } else {
            Err(EngineError::UnknownIdentity(*identity))
        }
    }

    /// Suspend inserts of a local identity.
    pub fn lock_identity(&self, identity: &IdentityId) -> Result<(), EngineError> {
        self.set_locked(identity, true)
    }

    pub fn unlock_identity(&self, identity: &IdentityId) -> Result<(), EngineError> {
        self.set_locked(identity, false)
    }

    fn set_locked(&self, identity: &IdentityId, locked: bool) -> Result<(), EngineError> {
        let mut locals = self.locals.write().expect("lock poisoned");
        let local = locals.get_mut(identity).ok_or_else(|| {
            if self.registry.contains(identity) {
                EngineError::NotLocal(*identity)
            } else {
                EngineError::UnknownIdentity(*identity)
            }
        })?;
        local.locked = locked;
        debug!(%identity, locked, "identity lock changed");
        Ok(())
    }

    pub fn is_locked(&self, identity: &IdentityId) -> bool {
        let locals = self.locals.read().expect("lock poisoned");
        locals.get(identity).is_some_and(|l| l.locked)
    }

    pub fn is_modified(&self, identity: &IdentityId) -> bool {
        let locals = self.locals.read().expect("lock poisoned");
        locals.get(identity).is_some_and(|l| l.modified)
    }

    // ------------------------------------------------------------------
    // Follows and trust
    // ------------------------------------------------------------------

    pub fn follow(&self, follower: &IdentityId, followee: IdentityId) -> Result<bool, EngineError> {
        self.require_local(follower)?;
        Ok(self.view.follow(*follower, followee))
    }

    pub fn unfollow(
        &self,
        follower: &IdentityId,
        followee: &IdentityId,
    ) -> Result<bool, EngineError> {
        self.require_local(follower)?;
        Ok(self.view.unfollow(follower, followee))
    }

    pub fn is_following(&self, follower: &IdentityId, followee: &IdentityId) -> bool {
        self.view.is_following(follower, followee)
    }

    /// Give `trustee` the configured positive trust value.
    pub fn trust(&self, truster: &IdentityId, trustee: IdentityId) -> Result<(), EngineError> {
        self.require_local(truster)?;
        self.trust.trust(*truster, trustee);
        Ok(())
    }

    /// Give `trustee` the configured negative trust value.
    pub fn distrust(&self, truster: &IdentityId, trustee: IdentityId) -> Result<(), EngineError> {
        self.require_local(truster)?;
        self.trust.distrust(*truster, trustee);
        Ok(())
    }

    /// Clear the explicit opinion of `truster` about `trustee`.
    pub fn untrust(&self, truster: &IdentityId, trustee: IdentityId) -> Result<(), EngineError> {
        self.require_local(truster)?;
        self.trust.untrust(*truster, trustee);
        Ok(())
    }

    pub fn trust_of(&self, truster: &IdentityId, trustee: &IdentityId) -> Trust {
        self.trust.trust_of(truster, trustee)
    }

    // ------------------------------------------------------------------
    // Rescue
    // ------------------------------------------------------------------

    /// Rescue controller of an identity, created and spawned on first use.
    pub fn rescuer(&self, identity: &IdentityId) -> Result<Arc<RescueHandle>, EngineError> {
        if !self.registry.contains(identity) {
            return Err(EngineError::UnknownIdentity(*identity));
        }

        // Checked under the map lock so shutdown cannot miss a new controller.
        let mut rescuers = self.rescuers.lock().expect("lock poisoned");
        if self.is_shut_down() {
            return Err(RescueError::Stopped.into());
        }
        if let Some(handle) = rescuers.get(identity)
            && !handle.is_stopped()
        {
            return Ok(handle.clone());
        }

        let controller = RescueController::new(
            *identity,
            self.fetcher.clone(),
            self.registry.clone(),
            self.locks.clone(),
            self.bus.clone(),
            self.config.rescue,
        );
        let handle = Arc::new(controller.start());
        rescuers.insert(*identity, handle.clone());
        info!(%identity, edition = handle.current_edition(), "rescue controller started");
        Ok(handle)
    }

    /// Stop every rescue controller and the refresh loop.
    ///
    /// Fetches in flight complete before their workers exit.
    pub async fn shutdown(&self) {
        // Stored even when no refresh loop is subscribed.
        self.shutdown_tx.send_replace(true);

        let rescuers: Vec<Arc<RescueHandle>> = {
            let mut rescuers = self.rescuers.lock().expect("lock poisoned");
            rescuers.drain().map(|(_, handle)| handle).collect()
        };
        for rescuer in rescuers {
            rescuer.shutdown().await;
        }

        let task = self.refresh_task.lock().expect("lock poisoned").take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!(error = %e, "refresh loop panicked");
        }
        info!("node shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn status(&self, identity: &IdentityId) -> Result<IdentityInfo, EngineError> {
        let snapshot = self
            .registry
            .get(identity)
            .ok_or(EngineError::UnknownIdentity(*identity))?;
        let (locked, modified) = {
            let locals = self.locals.read().expect("lock poisoned");
            locals
                .get(identity)
                .map(|l| (l.locked, l.modified))
                .unwrap_or((false, false))
        };
        Ok(IdentityInfo {
            identity: *identity,
            status: self.status.get(identity),
            local: snapshot.local,
            locked,
            modified,
            loaded: snapshot.is_loaded(),
            edition: snapshot.edition,
            last_updated: snapshot.last_updated,
        })
    }

    /// Status of every identity, sorted by ID.
    pub fn statuses(&self) -> Vec<IdentityInfo> {
        self.identities()
            .iter()
            .filter_map(|id| self.status(id).ok())
            .collect()
    }
}

impl std::fmt::Debug for TernNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TernNode")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
