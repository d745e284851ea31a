use thiserror::Error;

use crate::models::attachment::AttachmentKind;
use crate::models::profile::Collection;
use crate::sync::report::{OperationFailure, UploadStep};
use crate::sync::validation::ValidationReport;

/// Error type shared by the backend seam and the sync pipeline.
///
/// Backend calls return the transport-level variants (`Http`, `Api`, `Json`);
/// the pipeline wraps them per operation and only surfaces the aggregate
/// (`SaveFailed`) to callers.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    #[error("Invalid draft: {0}")]
    InvalidDraft(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Response for {collection} does not correlate: sent {sent} items, received {received}")]
    Correlation {
        collection: Collection,
        sent: usize,
        received: usize,
    },

    #[error("Upload of {kind} failed at {step}: {message}")]
    Upload {
        kind: AttachmentKind,
        step: UploadStep,
        message: String,
    },

    #[error("Save failed: {} of {attempted} operations failed", failures.len())]
    SaveFailed {
        failures: Vec<OperationFailure>,
        attempted: usize,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SyncError {
    /// True for errors raised before any network call was made.
    pub fn is_pre_flight(&self) -> bool {
        matches!(self, SyncError::Validation(_) | SyncError::InvalidDraft(_))
    }
}
