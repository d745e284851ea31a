//! Synchronizes an edited talent profile with its REST backend.
//!
//! The backend has no bulk-diff endpoint, so each save classifies every
//! collection against the last confirmed state, uploads pending attachments,
//! issues the minimal set of creates/updates/replacements concurrently and
//! folds server identifiers back into the draft so the next save of the same
//! draft is a no-op for id-keyed collections.

pub mod backend;
pub mod config;
pub mod errors;
pub mod models;
pub mod sync;

pub use errors::SyncError;
