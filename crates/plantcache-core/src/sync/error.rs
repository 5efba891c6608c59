use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No owner signed in - cannot sync")]
    MissingOwner,

    #[error("Failed to fetch remote plants: {0}")]
    RemoteFetch(#[from] ApiError),

    #[error("Local store error: {0}")]
    Store(#[source] StoreError),

    /// The table was cleared but repopulation stopped early.
    #[error("Sync stopped after restoring {restored} of {expected} plants: {source}")]
    PartialSync {
        restored: usize,
        expected: usize,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    /// Returns `true` if the local cache still holds what it held before the sync.
    pub fn cache_preserved(&self) -> bool {
        !matches!(self, SyncError::PartialSync { .. })
    }
}
