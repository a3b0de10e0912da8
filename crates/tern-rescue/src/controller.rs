//! Rescue state machine for one identity.
//!
//! The controller probes one edition per explicit request. It never picks
//! the next edition itself: the caller moves the target with
//! [`RescueController::set_edition`] (usually to
//! [`RescueController::next_edition`]) and asks for another fetch with
//! [`RescueController::start_next_fetch`].
//!
//! ```text
//!            start_next_fetch
//!   Idle ───────────────────────▶ Fetching ──ok──▶ Succeeded
//!    ▲                              │   │
//!    │ set_edition                  │   └─unusable─▶ Failed
//!    │                              │
//!   Exhausted ◀─unusable at 0, nothing recovered
//! ```
//!
//! Session state is published as an immutable [`RescueSession`] snapshot
//! through a `tokio::sync::watch` channel, so readers never see a
//! half-updated combination of fields.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tern_types::events::{EventBus, RescueFinished};
use tern_types::{Edition, IdentityId};
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use crate::error::{FetchError, RescueError};
use crate::fetcher::EditionFetcher;
use crate::lock::{UpdateGuard, UpdateLocks};
use crate::sink::{DocumentSink, MergeMode};

/// Bounds on how long a rescue step may wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescueConfig {
    /// Give up waiting for the update lock after this long. `None` waits.
    pub lock_timeout: Option<Duration>,
    /// Treat a fetch as not found after this long. `None` waits.
    pub fetch_timeout: Option<Duration>,
}

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RescueState {
    Idle,
    Fetching,
    Succeeded,
    Failed,
    /// Edition 0 was tried without recovering anything.
    Exhausted,
}

/// Immutable snapshot of a rescue session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescueSession {
    pub identity: IdentityId,
    pub state: RescueState,
    /// Edition the next (or current) fetch targets.
    pub target_edition: Edition,
    /// A fetch has been requested and not finished yet.
    pub fetching: bool,
    pub last_fetch_successful: bool,
    /// Newest edition merged by this session, if any.
    pub recovered_edition: Option<Edition>,
    /// Description of the last failure.
    pub last_error: Option<String>,
}

/// Result of a successful [`RescueController::start_next_fetch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRequest {
    /// A fetch of the target edition was queued.
    Started,
    /// A fetch is already requested or running; nothing was queued.
    AlreadyInFlight,
}

/// Drives an [`EditionFetcher`] over caller-chosen editions of one identity.
pub struct RescueController {
    identity: IdentityId,
    fetcher: Arc<EditionFetcher>,
    sink: Arc<dyn DocumentSink>,
    locks: Arc<UpdateLocks>,
    bus: EventBus,
    config: RescueConfig,
    session_tx: watch::Sender<RescueSession>,
    wake: Notify,
    shutdown_tx: watch::Sender<bool>,
}

impl RescueController {
    /// Create a controller targeting the sink's current edition.
    ///
    /// Nothing runs until [`start`](Self::start) spawns the worker.
    pub fn new(
        identity: IdentityId,
        fetcher: Arc<EditionFetcher>,
        sink: Arc<dyn DocumentSink>,
        locks: Arc<UpdateLocks>,
        bus: EventBus,
        config: RescueConfig,
    ) -> Arc<Self> {
        let target_edition = sink.current_edition(&identity).unwrap_or(0);
        let (session_tx, _) = watch::channel(RescueSession {
            identity,
            state: RescueState::Idle,
            target_edition,
            fetching: false,
            last_fetch_successful: true,
            recovered_edition: None,
            last_error: None,
        });
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            identity,
            fetcher,
            sink,
            locks,
            bus,
            config,
            session_tx,
            wake: Notify::new(),
            shutdown_tx,
        })
    }

    /// Spawn the worker task.
    pub fn start(self: &Arc<Self>) -> RescueHandle {
        let controller = self.clone();
        let task = tokio::spawn(async move { controller.run().await });
        RescueHandle {
            controller: self.clone(),
            task: Mutex::new(Some(task)),
        }
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    pub fn identity(&self) -> IdentityId {
        self.identity
    }

    /// Request a fetch of the target edition.
    ///
    /// At most one fetch is requested or running at a time; further calls
    /// while one is pending return [`FetchRequest::AlreadyInFlight`].
    pub fn start_next_fetch(&self) -> Result<FetchRequest, RescueError> {
        if *self.shutdown_tx.borrow() {
            return Err(RescueError::Stopped);
        }

        let mut outcome = Ok(FetchRequest::Started);
        self.session_tx.send_if_modified(|session| {
            if session.state == RescueState::Exhausted {
                outcome = Err(RescueError::Exhausted {
                    identity: self.identity,
                });
                false
            } else if session.fetching {
                outcome = Ok(FetchRequest::AlreadyInFlight);
                false
            } else {
                session.fetching = true;
                true
            }
        });

        if matches!(outcome, Ok(FetchRequest::Started)) {
            debug!(identity = %self.identity, "rescue fetch requested");
            self.wake.notify_one();
        }
        outcome
    }

    /// Move the target edition. Clears an `Exhausted` state.
    ///
    /// A fetch already running keeps the edition it started with.
    pub fn set_edition(&self, edition: Edition) {
        self.session_tx.send_modify(|session| {
            session.target_edition = edition;
            if session.state == RescueState::Exhausted {
                session.state = RescueState::Idle;
            }
        });
        debug!(identity = %self.identity, edition, "rescue target set");
    }

    pub fn is_fetching(&self) -> bool {
        self.session_tx.borrow().fetching
    }

    /// Whether an older edition than the target exists.
    pub fn has_next_edition(&self) -> bool {
        self.session_tx.borrow().target_edition > 0
    }

    /// The edition below the target, `None` at edition 0.
    pub fn next_edition(&self) -> Option<Edition> {
        self.session_tx.borrow().target_edition.checked_sub(1)
    }

    pub fn is_last_fetch_successful(&self) -> bool {
        self.session_tx.borrow().last_fetch_successful
    }

    /// The edition the next fetch targets.
    pub fn current_edition(&self) -> Edition {
        self.session_tx.borrow().target_edition
    }

    pub fn state(&self) -> RescueState {
        self.session_tx.borrow().state
    }

    pub fn session(&self) -> RescueSession {
        self.session_tx.borrow().clone()
    }

    /// Receive every session snapshot from now on.
    pub fn subscribe(&self) -> watch::Receiver<RescueSession> {
        self.session_tx.subscribe()
    }

    /// Wait until no fetch is pending and return the session.
    pub async fn finished(&self) -> RescueSession {
        let mut rx = self.session_tx.subscribe();
        match rx.wait_for(|s| !s.fetching).await {
            Ok(session) => session.clone(),
            Err(_) => self.session(),
        }
    }

    /// Ask the worker to exit once any running fetch has completed.
    pub fn stop(&self) {
        info!(identity = %self.identity, "stopping rescue controller");
        // Stored even before the worker subscribes.
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    // -----------------------------------------------------------------------
    // Worker
    // -----------------------------------------------------------------------

    /// Worker loop. Sleeps until a fetch is requested or stop is called.
    async fn run(&self) {
        info!(identity = %self.identity, "rescue controller started");
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        while !*shutdown_rx.borrow_and_update() {
            if self.is_fetching() {
                // Not raced against shutdown: a running fetch always completes.
                self.fetch_once().await;
                continue;
            }
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        // Drop a request that was queued but never picked up.
        self.session_tx.send_if_modified(|session| {
            let pending = session.fetching;
            session.fetching = false;
            pending
        });
        info!(identity = %self.identity, "rescue controller stopped");
    }

    #[tracing::instrument(skip(self), fields(identity = %self.identity, edition = tracing::field::Empty))]
    async fn fetch_once(&self) {
        let edition = self.current_edition();
        tracing::Span::current().record("edition", edition);

        let guard = match self.acquire_lock().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "rescue fetch not started");
                self.finish(edition, Err(Attempt::Rejected(e)));
                return;
            }
        };
        self.session_tx.send_modify(|s| s.state = RescueState::Fetching);

        let fetched = match self.config.fetch_timeout {
            None => self.fetcher.fetch(self.identity, edition, true).await,
            Some(deadline) => {
                tokio::time::timeout(deadline, self.fetcher.fetch(self.identity, edition, true))
                    .await
                    .unwrap_or(Err(FetchError::TimedOut))
            }
        };

        let outcome = match fetched {
            Ok(document) => self
                .sink
                .merge(&guard, document, MergeMode::Rescue)
                .await
                .map_err(|e| {
                    error!(error = %e, "merging rescued edition failed");
                    Attempt::Rejected(e)
                }),
            Err(e) => {
                if e.is_corrupt() {
                    warn!(error = %e, "rescue found corrupt edition");
                } else {
                    info!(error = %e, "rescue found no usable edition");
                }
                Err(Attempt::Fetch(e))
            }
        };
        drop(guard);

        self.finish(edition, outcome);
    }

    async fn acquire_lock(&self) -> Result<UpdateGuard, RescueError> {
        match self.config.lock_timeout {
            None => Ok(self.locks.lock(self.identity).await),
            Some(timeout) => self.locks.lock_timeout(self.identity, timeout).await,
        }
    }

    /// Publish the outcome of one attempt.
    fn finish(&self, edition: Edition, outcome: Result<(), Attempt>) {
        let success = outcome.is_ok();
        self.session_tx.send_modify(|session| {
            session.fetching = false;
            session.last_fetch_successful = success;
            match outcome {
                Ok(()) => {
                    session.state = RescueState::Succeeded;
                    session.recovered_edition = Some(edition);
                    session.last_error = None;
                }
                Err(failure) => {
                    let exhausted = edition == 0
                        && failure.edition_unusable()
                        && session.recovered_edition.is_none();
                    session.state = if exhausted {
                        RescueState::Exhausted
                    } else {
                        RescueState::Failed
                    };
                    session.last_error = Some(failure.to_string());
                }
            }
            info!(
                identity = %self.identity,
                edition,
                state = ?session.state,
                "rescue fetch finished"
            );
        });

        self.bus.emit(RescueFinished {
            identity: self.identity,
            edition,
            success,
        });
    }
}

/// Why one rescue attempt did not recover its edition.
#[derive(Debug, thiserror::Error)]
enum Attempt {
    /// The store was asked and the edition could not be used.
    #[error(transparent)]
    Fetch(FetchError),
    /// The lock or the merge failed; says nothing about the edition.
    #[error(transparent)]
    Rejected(RescueError),
}

impl Attempt {
    /// Absent or corrupt. Timeouts and store outages leave the edition
    /// worth retrying.
    fn edition_unusable(&self) -> bool {
        matches!(
            self,
            Self::Fetch(FetchError::NotFound { .. } | FetchError::Corrupt { .. })
        )
    }
}

impl std::fmt::Debug for RescueController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RescueController")
            .field("identity", &self.identity)
            .field("session", &*self.session_tx.borrow())
            .finish_non_exhaustive()
    }
}

/// Handle to a running [`RescueController`].
pub struct RescueHandle {
    controller: Arc<RescueController>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RescueHandle {
    pub fn controller(&self) -> &Arc<RescueController> {
        &self.controller
    }

    /// Check whether the worker task is still running.
    pub fn is_running(&self) -> bool {
        let task = self.task.lock().expect("lock poisoned");
        task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the controller and wait for the worker to exit.
    pub async fn shutdown(&self) {
        self.controller.stop();
        let task = self.task.lock().expect("lock poisoned").take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!(identity = %self.controller.identity, error = %e, "rescue worker panicked");
        }
    }
}

impl std::ops::Deref for RescueHandle {
    type Target = RescueController;

    fn deref(&self) -> &RescueController {
        &self.controller
    }
}
