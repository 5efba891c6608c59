//! Data models for cached plant records.
//!
//! - `Plant`: a row as stored locally, with its store-assigned id
//! - `NewPlant`: insert input, validated before it reaches the store
//! - `RemotePlant`, `Snapshot`: the remote document for one owner

pub mod plant;

pub use plant::{NewPlant, Plant, RemotePlant, Snapshot};
