//! Normal refresh: pick up editions newer than the loaded one.

use std::sync::Arc;

use tern_rescue::FetchError;
use tern_types::events::UpdateOrigin;
use tern_types::{Document, Edition, IdentityId};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::node::TernNode;

impl TernNode {
    /// Probe the editions after the loaded one and merge the newest valid one.
    ///
    /// Probing stops at the first absent edition or after
    /// [`RefreshConfig::max_probe`](crate::RefreshConfig) editions. Corrupt
    /// editions are skipped. The store is read without the update lock; the
    /// lock is only held for the merge. Returns the merged edition, or `None`
    /// if nothing newer was found.
    #[tracing::instrument(skip(self), fields(%identity))]
    pub async fn refresh(&self, identity: &IdentityId) -> Result<Option<Edition>, EngineError> {
        let snapshot = self
            .registry
            .get(identity)
            .ok_or(EngineError::UnknownIdentity(*identity))?;
        let start = if snapshot.is_loaded() {
            snapshot.edition + 1
        } else {
            snapshot.edition.max(1)
        };

        let mut newest: Option<Document> = None;
        for edition in start..start.saturating_add(self.config.refresh.max_probe) {
            match self.fetcher.fetch(*identity, edition, false).await {
                Ok(document) => newest = Some(document),
                Err(FetchError::NotFound { .. }) => break,
                Err(e) if e.is_corrupt() => {
                    warn!(%identity, edition, "skipping corrupt edition during refresh");
                }
                Err(e) => {
                    warn!(%identity, edition, error = %e, "refresh probe failed");
                    break;
                }
            }
        }

        let Some(document) = newest else {
            debug!(%identity, start, "no newer edition");
            return Ok(None);
        };

        let edition = document.edition;
        let guard = self.locks.lock(*identity).await;
        let merged = self.registry.apply(&guard, document, UpdateOrigin::Refresh)?;
        drop(guard);

        if merged {
            info!(%identity, edition, "refreshed");
            Ok(Some(edition))
        } else {
            Ok(None)
        }
    }

    /// One pass over every identity: refresh remote identities and insert
    /// modified local ones.
    pub async fn refresh_all(&self) {
        for identity in self.identities() {
            if self.is_local(&identity) {
                if self.is_modified(&identity)
                    && let Err(e) = self.insert(&identity).await
                {
                    warn!(%identity, error = %e, "insert failed");
                }
                continue;
            }
            if let Err(e) = self.refresh(&identity).await {
                warn!(%identity, error = %e, "refresh failed");
            }
        }
    }

    /// Run [`refresh_all`](Self::refresh_all) on the configured interval
    /// until [`shutdown`](Self::shutdown).
    pub async fn run_refresh_loop(self: Arc<Self>) {
        info!(interval = ?self.config.refresh.interval, "refresh loop started");

        let mut interval = tokio::time::interval(self.config.refresh.interval);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return;
        }

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.refresh_all().await;
                }
                _ = shutdown_rx.changed() => {
                    info!("refresh loop shutting down");
                    break;
                }
            }
        }

        info!("refresh loop stopped");
    }

    /// Spawn [`run_refresh_loop`](Self::run_refresh_loop) in the background.
    ///
    /// [`shutdown`](Self::shutdown) waits for it. A second call while the
    /// loop is running does nothing.
    pub fn spawn_refresh_loop(self: &Arc<Self>) {
        let mut task = self.refresh_task.lock().expect("lock poisoned");
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let node = self.clone();
        *task = Some(tokio::spawn(node.run_refresh_loop()));
    }
}
