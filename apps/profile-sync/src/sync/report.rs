//! Structured outcome of a save cycle.
//!
//! Each pipeline stage appends `SyncEvent`s instead of printing diagnostics;
//! callers decide what to show.

use std::fmt;

use serde::Serialize;

use crate::models::attachment::AttachmentKind;
use crate::models::profile::{Collection, ProfileId, ProfileStatus};
use crate::models::records::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    SaveDraft,
    Finalize,
}

impl SaveMode {
    pub fn status(&self) -> ProfileStatus {
        match self {
            SaveMode::SaveDraft => ProfileStatus::Draft,
            SaveMode::Finalize => ProfileStatus::Complete,
        }
    }
}

/// Steps of the attachment upload chain, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStep {
    Presign,
    Transfer,
    Commit,
    LinkAttach,
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStep::Presign => "presign",
            UploadStep::Transfer => "transfer",
            UploadStep::Commit => "commit",
            UploadStep::LinkAttach => "link-attach",
        };
        f.write_str(name)
    }
}

/// A single network operation issued by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Header,
    CreateBatch { collection: Collection, count: usize },
    Update { collection: Collection, id: ItemId },
    ReplaceSet { collection: Collection, count: usize },
    UpsertLink { link_type: String },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Header => f.write_str("header write"),
            Operation::CreateBatch { collection, count } => {
                write!(f, "create {count} {collection}")
            }
            Operation::Update { collection, id } => write!(f, "update {collection}/{id}"),
            Operation::ReplaceSet { collection, count } => {
                write!(f, "replace {collection} ({count} values)")
            }
            Operation::UpsertLink { link_type } => write!(f, "upsert link {link_type}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationFailure {
    pub operation: Operation,
    pub message: String,
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Classified {
        collection: Collection,
        to_create: usize,
        to_update: usize,
        unchanged: usize,
        removed_locally: Vec<ItemId>,
    },
    AttachmentUploaded {
        kind: AttachmentKind,
        url: String,
    },
    AttachmentFailed {
        kind: AttachmentKind,
        step: UploadStep,
        message: String,
    },
    HeaderWritten {
        profile_id: ProfileId,
        status: ProfileStatus,
    },
    /// Header not written because collection writes failed.
    HeaderSkipped,
    Created {
        collection: Collection,
        ids: Vec<ItemId>,
    },
    Updated {
        collection: Collection,
        id: ItemId,
    },
    SetReplaced {
        collection: Collection,
        count: usize,
    },
    LinkUpserted {
        link_type: String,
    },
    OperationFailed(OperationFailure),
    Merged {
        partial: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReport {
    pub mode: SaveMode,
    pub events: Vec<SyncEvent>,
    pub failures: Vec<OperationFailure>,
    /// Number of operations dispatched, attachment chains excluded.
    pub attempted: usize,
    pub merged: bool,
}

impl SaveReport {
    pub fn new(mode: SaveMode) -> Self {
        Self {
            mode,
            events: Vec::new(),
            failures: Vec::new(),
            attempted: 0,
            merged: false,
        }
    }

    pub fn push(&mut self, event: SyncEvent) {
        self.events.push(event);
    }

    pub fn fail(&mut self, failure: OperationFailure) {
        self.events.push(SyncEvent::OperationFailed(failure.clone()));
        self.failures.push(failure);
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attachment_failures(&self) -> impl Iterator<Item = &SyncEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, SyncEvent::AttachmentFailed { .. }))
    }

    /// Identifiers assigned by batched creates during this cycle.
    pub fn created_ids(&self, collection: Collection) -> Vec<ItemId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::Created { collection: c, ids } if *c == collection => {
                    Some(ids.clone())
                }
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        let op = Operation::CreateBatch {
            collection: Collection::Educations,
            count: 3,
        };
        assert_eq!(op.to_string(), "create 3 educations");
        let op = Operation::Update {
            collection: Collection::JobTags,
            id: 4,
        };
        assert_eq!(op.to_string(), "update job-tags/4");
    }

    #[test]
    fn test_failure_recorded_as_event_and_failure() {
        let mut report = SaveReport::new(SaveMode::SaveDraft);
        report.fail(OperationFailure {
            operation: Operation::Header,
            message: "boom".to_string(),
        });
        assert!(!report.is_success());
        assert_eq!(report.events.len(), 1);
    }
}
