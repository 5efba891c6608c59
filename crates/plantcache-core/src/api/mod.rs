//! Remote source module for the authoritative plant data.
//!
//! This module provides the `RemoteSource` trait the synchronizer reads
//! snapshots through, and `ApiClient`, its HTTP implementation against the
//! realtime database REST endpoint (`/Users/{owner}/Plants.json`).
//!
//! The remote side is read-only from the cache's point of view.

pub mod client;
pub mod error;

pub use client::{ApiClient, RemoteSource};
pub use error::ApiError;
