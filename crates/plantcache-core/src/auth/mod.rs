//! Owner identity for addressing the remote plant store.
//!
//! This module provides:
//! - `OwnerProvider`: anything that can name the current owner
//! - `Session`: the signed-in owner id and ID token, persisted to disk
//!
//! The owner id survives until logout; tokens expire after 60 minutes.

pub mod session;

pub use session::{OwnerProvider, Session, SessionData};
