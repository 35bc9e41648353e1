//! SyncCoordinator: keeps the in-memory permit list for one project in
//! step with local storage and the remote sheet.
//!
//! - `load` prefers the remote (authoritative for reads) and falls back to
//!   local storage on any remote failure.
//! - `create` writes through to local storage first, then publishes to the
//!   remote on a best-effort basis. A permit is never lost because the
//!   remote is down.
//! - Permits whose publish failed are queued under `pending_<project>`.
//!   Every `load` merges the queue into the set, and the queue is retried
//!   after a successful fetch or publish.
//!
//! ## Sequencing
//!
//! Every operation that touches the permit list takes `&mut self`, so two
//! operations can never overlap on one coordinator. Callers that share a
//! coordinator between tasks wrap it in `tokio::sync::Mutex`, which runs
//! operations one after another in arrival order. Nothing is cancelled or
//! superseded once started.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::PermitLogConfig;
use crate::local_store::{LocalStore, LocalStoreError};
use crate::permit::{Permit, PermitDraft, ValidationError};
use crate::remote::{PublishReceipt, RemoteError, RemoteGateway};

/// Last known relationship to the remote (not a per-record state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Working from local storage only.
    #[default]
    Local,
    /// A publish is in flight.
    Syncing,
    /// The last remote interaction succeeded.
    Synced,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Local => "local",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
        }
    }
}

/// Where the current permit list came from.
#[derive(Debug)]
pub enum LoadSource {
    /// Remote not configured; read local storage.
    LocalOnly,
    /// Read from the remote sheet.
    Remote,
    /// Remote failed; read local storage instead.
    LocalFallback(RemoteError),
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub source: LoadSource,
    pub count: usize,
}

/// What happened on the remote side of a create.
#[derive(Debug)]
pub enum RemoteOutcome {
    /// No endpoint configured; nothing was sent.
    NotConfigured,
    /// Request sent; acceptance unknown.
    Dispatched,
    /// Remote acknowledged the write.
    ConfirmedPersisted,
    /// Publish failed; the permit is only stored locally.
    Unreachable(RemoteError),
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub permit: Permit,
    pub remote: RemoteOutcome,
}

impl CreateOutcome {
    /// True when the permit has not reached the remote.
    pub fn is_remote_pending(&self) -> bool {
        matches!(self.remote, RemoteOutcome::Unreachable(_))
    }

    /// One-line notification for the user.
    pub fn summary(&self) -> &'static str {
        match self.remote {
            RemoteOutcome::NotConfigured => "Permit logged successfully!",
            RemoteOutcome::Dispatched => "Permit logged successfully! (sent to remote sheet)",
            RemoteOutcome::ConfirmedPersisted => {
                "Permit logged successfully! (saved to remote sheet)"
            }
            RemoteOutcome::Unreachable(_) => "Permit saved locally. Remote sync pending.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to save permit locally: {0}")]
    Storage(#[from] LocalStoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("unknown project '{project}' (expected one of: {})", .known.join(", "))]
    UnknownProject { project: String, known: Vec<String> },
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("local storage unavailable: {0}")]
    Store(#[from] LocalStoreError),

    #[error("remote client setup failed: {0}")]
    Remote(#[from] RemoteError),
}

/// Coordinates local storage and the remote sheet for the active project.
pub struct SyncCoordinator {
    project: String,
    projects: Vec<String>,
    permits: Vec<Permit>,
    store: LocalStore,
    /// `None` when no endpoint is configured; pins the state to `Local`.
    remote: Option<Arc<dyn RemoteGateway>>,
    state_tx: watch::Sender<SyncState>,
}

impl SyncCoordinator {
    /// Create a coordinator for `project`. Nothing is loaded until
    /// [`load`](Self::load) is called.
    pub fn new(
        store: LocalStore,
        remote: Option<Arc<dyn RemoteGateway>>,
        project: impl Into<String>,
    ) -> Self {
        let project = project.into();
        let (state_tx, _) = watch::channel(SyncState::Local);
        Self {
            projects: vec![project.clone()],
            project,
            permits: Vec::new(),
            store,
            remote,
            state_tx,
        }
    }

    /// Build from resolved configuration: local store, optional HTTP
    /// gateway, project list and default project.
    pub fn from_config(config: &PermitLogConfig) -> Result<Self, SetupError> {
        let store = config.local_store()?;
        let remote = config
            .remote_gateway()?
            .map(|gateway| Arc::new(gateway) as Arc<dyn RemoteGateway>);
        Ok(Self::new(store, remote, config.default_project.clone())
            .with_projects(config.projects.clone()))
    }

    /// Restrict [`switch_project`](Self::switch_project) to `projects`.
    /// The active project is always allowed.
    pub fn with_projects(mut self, projects: Vec<String>) -> Self {
        self.projects = projects;
        if !self.projects.contains(&self.project) {
            self.projects.insert(0, self.project.clone());
        }
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn projects(&self) -> &[String] {
        &self.projects
    }

    /// Permits for the active project, newest first.
    pub fn permits(&self) -> &[Permit] {
        &self.permits
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions, including `Syncing` while a publish is in flight.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: SyncState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(
                "Sync state for '{}': {} -> {}",
                self.project,
                previous.as_str(),
                state.as_str()
            );
        }
    }

    /// Reload the active project, preferring the remote.
    ///
    /// A successful remote read replaces the in-memory set, then the pending
    /// queue is retried and merged on top, newest first. Queued permits stay
    /// in the set even when the retry fails again, so the next `create` saves
    /// them back. Other local-only records are not merged.
    ///
    /// Safe to call repeatedly; an explicit refresh is just another `load`.
    pub async fn load(&mut self) -> LoadOutcome {
        let project = self.project.clone();

        let Some(remote) = self.remote.clone() else {
            self.permits = self.store.load(&project);
            let pending = self.store.load_pending(&project);
            self.merge_pending(pending);
            self.set_state(SyncState::Local);
            return LoadOutcome {
                source: LoadSource::LocalOnly,
                count: self.permits.len(),
            };
        };

        match remote.fetch_all(&project).await {
            Ok(rows) => {
                // Remote is authoritative for reads: full replace.
                self.permits = rows
                    .iter()
                    .enumerate()
                    .map(|(index, row)| Permit::from_remote_row(&project, index, row))
                    .collect();
                let pending = self.flush_pending(remote.as_ref()).await;
                self.merge_pending(pending);
                self.set_state(SyncState::Synced);
                tracing::info!(
                    "Loaded {} permit(s) for '{project}' from remote",
                    self.permits.len()
                );
                LoadOutcome {
                    source: LoadSource::Remote,
                    count: self.permits.len(),
                }
            }
            Err(e) => {
                tracing::warn!("Remote load for '{project}' failed, using local storage: {e}");
                self.permits = self.store.load(&project);
                let pending = self.store.load_pending(&project);
                self.merge_pending(pending);
                self.set_state(SyncState::Local);
                LoadOutcome {
                    source: LoadSource::LocalFallback(e),
                    count: self.permits.len(),
                }
            }
        }
    }

    /// Validate and log a new permit.
    ///
    /// The permit is saved locally before any remote call; the remote
    /// result only changes the reported outcome and the sync state. A failed
    /// publish queues the permit for retry; a successful one flushes the queue.
    pub async fn create(&mut self, draft: PermitDraft) -> Result<CreateOutcome, CreateError> {
        let permit = Permit::new(self.project.clone(), draft)?;

        self.permits.insert(0, permit.clone());
        if let Err(e) = self.store.save(&self.project, &self.permits) {
            self.permits.remove(0);
            return Err(e.into());
        }
        tracing::info!("Logged permit {} for '{}'", permit.id, self.project);

        let Some(remote) = self.remote.clone() else {
            return Ok(CreateOutcome {
                permit,
                remote: RemoteOutcome::NotConfigured,
            });
        };

        self.set_state(SyncState::Syncing);
        let remote = match remote.publish(&permit).await {
            Ok(receipt) => {
                self.flush_pending(remote.as_ref()).await;
                self.set_state(SyncState::Synced);
                match receipt {
                    PublishReceipt::Dispatched => RemoteOutcome::Dispatched,
                    PublishReceipt::ConfirmedPersisted => RemoteOutcome::ConfirmedPersisted,
                }
            }
            Err(e) => {
                tracing::warn!("Publishing permit {} failed: {e}", permit.id);
                self.queue_pending(&permit);
                self.set_state(SyncState::Local);
                RemoteOutcome::Unreachable(e)
            }
        };

        Ok(CreateOutcome { permit, remote })
    }

    /// Put `permits` (newest first) in front of the current set, skipping
    /// any id already present.
    fn merge_pending(&mut self, permits: Vec<Permit>) {
        let mut merged: Vec<Permit> = permits
            .into_iter()
            .filter(|p| !self.permits.iter().any(|q| q.id == p.id))
            .collect();
        merged.append(&mut self.permits);
        self.permits = merged;
    }

    fn queue_pending(&self, permit: &Permit) {
        let mut pending = self.store.load_pending(&self.project);
        pending.insert(0, permit.clone());
        if let Err(e) = self.store.save_pending(&self.project, &pending) {
            tracing::warn!("Could not queue permit {} for retry: {e}", permit.id);
        }
    }

    /// Publish every queued permit, oldest first, and keep only the ones
    /// that fail again. Returns the queue as it was before the retry.
    async fn flush_pending(&self, remote: &dyn RemoteGateway) -> Vec<Permit> {
        let pending = self.store.load_pending(&self.project);
        if pending.is_empty() {
            return pending;
        }

        let mut still_pending = Vec::new();
        for permit in pending.iter().rev() {
            match remote.publish(permit).await {
                Ok(_) => tracing::info!("Published queued permit {}", permit.id),
                Err(e) => {
                    tracing::warn!("Queued permit {} still unpublished: {e}", permit.id);
                    still_pending.push(permit.clone());
                }
            }
        }
        still_pending.reverse();
        if let Err(e) = self.store.save_pending(&self.project, &still_pending) {
            tracing::warn!("Could not update retry queue for '{}': {e}", self.project);
        }
        pending
    }

    /// Make `project` active: drop the current list and load the new
    /// partition. Partitions are never merged.
    pub async fn switch_project(&mut self, project: &str) -> Result<LoadOutcome, SwitchError> {
        if !self.projects.iter().any(|p| p == project) {
            return Err(SwitchError::UnknownProject {
                project: project.to_string(),
                known: self.projects.clone(),
            });
        }
        tracing::info!("Switching project '{}' -> '{project}'", self.project);
        self.project = project.to_string();
        self.permits.clear();
        Ok(self.load().await)
    }
}
