//! Core library for plantcache.
//!
//! Keeps a local SQLite mirror of a user's plants so they stay readable
//! offline, and refreshes it from the remote store with a full-replace sync.
//!
//! - [`store::PlantStore`]: transactional local table of plant rows
//! - [`api::ApiClient`]: fetches the remote snapshot for an owner
//! - [`sync::Synchronizer`]: fetch-then-replace orchestration
//! - [`auth::Session`]: persisted owner identifier and token

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod store;
pub mod sync;

pub use api::{ApiClient, ApiError, RemoteSource};
pub use auth::{OwnerProvider, Session, SessionData};
pub use config::Config;
pub use models::{NewPlant, Plant, RemotePlant, Snapshot};
pub use store::{InsertOutcome, PlantStore, ReplaceOutcome, StoreError};
pub use sync::{ReplaceStrategy, SyncError, SyncPhase, SyncReport, Synchronizer};
