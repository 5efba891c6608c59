//! Local plant store for offline access.
//!
//! This module provides the `PlantStore`, a single SQLite table of plant
//! rows mirrored from the remote store. Every mutation runs in its own
//! transaction and is serialized by a per-store write lock, so a sync's
//! clear-then-repopulate never interleaves with a manual insert or delete.

pub mod error;
pub mod plants;

pub use error::StoreError;
pub use plants::{InsertOutcome, PlantStore, ReplaceOutcome, StoreWriter};
