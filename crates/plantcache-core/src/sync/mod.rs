//! Full-replace synchronization between the remote store and the local cache.
//!
//! A sync always fetches first and replaces second. If the fetch fails the
//! local cache is left untouched, since it is still the best data available.
//! Only a successfully fetched snapshot (even an empty one) replaces it.

pub mod error;
pub mod synchronizer;

pub use error::SyncError;
pub use synchronizer::{ReplaceStrategy, SyncPhase, SyncReport, Synchronizer};
