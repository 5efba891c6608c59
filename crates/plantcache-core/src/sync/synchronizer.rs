use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use super::SyncError;
use crate::api::{ApiError, RemoteSource};
use crate::auth::OwnerProvider;
use crate::models::{NewPlant, Snapshot};
use crate::store::PlantStore;

/// Default upper bound on the snapshot fetch.
const DEFAULT_DEADLINE_SECS: u64 = 30;

/// How the local table is rebuilt from a fetched snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplaceStrategy {
    /// Clear, then insert each plant in its own transaction. A failure
    /// partway is reported as [`SyncError::PartialSync`].
    #[default]
    Stepwise,
    /// Clear and insert inside one transaction; a failure leaves the old rows.
    Atomic,
}

/// Where a sync currently is. Terminal phases stay published until the next sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    FetchFailed,
    Fetched,
    Clearing,
    Repopulating { restored: usize, total: usize },
    Done,
    PartialFailure { restored: usize, total: usize },
    /// Aborted after the fetch without changing the local table.
    Failed,
}

/// Summary of a completed sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub owner_id: String,
    pub fetched: usize,
    pub cleared: u64,
    pub restored: usize,
    pub completed_at: DateTime<Utc>,
}

/// Rebuilds the local plant table from the remote snapshot.
///
/// Only one sync runs at a time per synchronizer, and the replace phase
/// holds the store's write lock, so manual inserts and deletes land either
/// before the clear or after the last insert, never in between.
pub struct Synchronizer {
    store: PlantStore,
    remote: Arc<dyn RemoteSource>,
    deadline: Duration,
    strategy: ReplaceStrategy,
    phase: watch::Sender<SyncPhase>,
    in_flight: Mutex<()>,
}

impl Synchronizer {
    pub fn new(store: PlantStore, remote: Arc<dyn RemoteSource>) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            store,
            remote,
            deadline: Duration::from_secs(DEFAULT_DEADLINE_SECS),
            strategy: ReplaceStrategy::default(),
            phase,
            in_flight: Mutex::new(()),
        }
    }

    /// Give up on the snapshot fetch after `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_strategy(mut self, strategy: ReplaceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Watch sync progress.
    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }

    /// Sync for whoever `owner` says is signed in.
    pub async fn sync_current(&self, owner: &dyn OwnerProvider) -> Result<SyncReport, SyncError> {
        let owner_id = owner.owner_id().ok_or(SyncError::MissingOwner)?;
        self.sync_all(&owner_id).await
    }

    /// Replace the local table with the remote snapshot for `owner_id`.
    ///
    /// If the fetch fails or times out, nothing local is touched and the
    /// error is returned as [`SyncError::RemoteFetch`].
    pub async fn sync_all(&self, owner_id: &str) -> Result<SyncReport, SyncError> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            warn!("Sync requested without an owner");
            return Err(SyncError::MissingOwner);
        }

        let _in_flight = self.in_flight.lock().await;
        info!(owner = owner_id, strategy = ?self.strategy, "Starting plant sync");

        self.set_phase(SyncPhase::Fetching);
        let snapshot = match self.fetch(owner_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(owner = owner_id, error = %e, "Snapshot fetch failed, keeping local cache");
                self.set_phase(SyncPhase::FetchFailed);
                return Err(e.into());
            }
        };
        self.set_phase(SyncPhase::Fetched);

        let fetched = snapshot.len();
        let plants = snapshot.into_new_plants();
        let replaced = match self.strategy {
            ReplaceStrategy::Stepwise => self.replace_stepwise(&plants).await,
            ReplaceStrategy::Atomic => self.replace_atomic(&plants).await,
        };

        match replaced {
            Ok((cleared, restored)) => {
                self.set_phase(SyncPhase::Done);
                info!(owner = owner_id, fetched, cleared, restored, "Plant sync complete");
                Ok(SyncReport {
                    owner_id: owner_id.to_string(),
                    fetched,
                    cleared,
                    restored,
                    completed_at: Utc::now(),
                })
            }
            Err(e) => {
                let phase = match e {
                    SyncError::PartialSync { restored, expected, .. } => SyncPhase::PartialFailure {
                        restored,
                        total: expected,
                    },
                    _ => SyncPhase::Failed,
                };
                self.set_phase(phase);
                Err(e)
            }
        }
    }

    async fn fetch(&self, owner_id: &str) -> Result<Snapshot, ApiError> {
        match tokio::time::timeout(self.deadline, self.remote.fetch_snapshot(owner_id)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.deadline)),
        }
    }

    async fn replace_stepwise(&self, plants: &[NewPlant]) -> Result<(u64, usize), SyncError> {
        // Reject a bad set before anything is cleared.
        PlantStore::validate_batch(plants).map_err(SyncError::Store)?;
        let mut writer = self.store.lock().await;

        self.set_phase(SyncPhase::Clearing);
        let cleared = writer.clear().await.map_err(SyncError::Store)?;

        let total = plants.len();
        for (restored, plant) in plants.iter().enumerate() {
            self.set_phase(SyncPhase::Repopulating { restored, total });
            if let Err(source) = writer.insert(plant).await {
                error!(
                    remote_id = %plant.remote_id,
                    restored,
                    total,
                    error = %source,
                    "Repopulation failed after clear"
                );
                return Err(SyncError::PartialSync {
                    restored,
                    expected: total,
                    source,
                });
            }
        }

        Ok((cleared, total))
    }

    async fn replace_atomic(&self, plants: &[NewPlant]) -> Result<(u64, usize), SyncError> {
        self.set_phase(SyncPhase::Repopulating {
            restored: 0,
            total: plants.len(),
        });
        let outcome = self
            .store
            .replace_all(plants)
            .await
            .map_err(SyncError::Store)?;
        Ok((outcome.cleared, outcome.inserted as usize))
    }
}

// ============================================================================
// Tests
// ============================================================================
