//! Deployment-dependent behaviour of the save pipeline.
//!
//! The two backend deployments disagree on when the profile header may be
//! written, whether uploads need a commit call, and where attachment
//! references live. All of that is selected here; the pipeline itself has a
//! single implementation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of the header write relative to the collection writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderWrite {
    /// Collections cannot be created before the profile exists.
    #[default]
    BeforeCollections,
    /// The backend rejects collection writes against a profile mid-update.
    AfterCollections,
}

/// Where an uploaded attachment's reference is recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStorage {
    /// A link record keyed by the attachment's type tag.
    #[default]
    LinkMap,
    /// A URL field on the profile header.
    HeaderUrl,
}

/// What a save does with the successes of a partially failed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Merge nothing; the draft stays exactly as the user left it.
    #[default]
    RollBack,
    /// Merge every operation that succeeded and report the rest.
    RollForward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub header_write: HeaderWrite,
    pub commit_uploads: bool,
    pub attachment_storage: AttachmentStorage,
    pub failure: FailurePolicy,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            header_write: HeaderWrite::default(),
            commit_uploads: true,
            attachment_storage: AttachmentStorage::default(),
            failure: FailurePolicy::default(),
        }
    }
}

impl SyncPolicy {
    pub fn with_header_write(mut self, header_write: HeaderWrite) -> Self {
        self.header_write = header_write;
        self
    }

    pub fn with_commit_uploads(mut self, commit_uploads: bool) -> Self {
        self.commit_uploads = commit_uploads;
        self
    }

    pub fn with_attachment_storage(mut self, storage: AttachmentStorage) -> Self {
        self.attachment_storage = storage;
        self
    }

    pub fn with_failure(mut self, failure: FailurePolicy) -> Self {
        self.failure = failure;
        self
    }

    /// Attachments must finish before the header is written.
    pub fn header_waits_for_attachments(&self) -> bool {
        self.attachment_storage == AttachmentStorage::HeaderUrl
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {setting} value '{value}'")]
pub struct UnknownVariant {
    pub setting: &'static str,
    pub value: String,
}

/// `Roll-Forward`, `roll_forward` and `roll-forward` all name the same value.
fn normalize_setting(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace('-', "_")
}

impl FromStr for HeaderWrite {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_setting(s).as_str() {
            "before" | "before_collections" | "first" => Ok(HeaderWrite::BeforeCollections),
            "after" | "after_collections" | "last" => Ok(HeaderWrite::AfterCollections),
            other => Err(UnknownVariant {
                setting: "header write",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for AttachmentStorage {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_setting(s).as_str() {
            "link_map" | "links" => Ok(AttachmentStorage::LinkMap),
            "header_url" | "header" => Ok(AttachmentStorage::HeaderUrl),
            other => Err(UnknownVariant {
                setting: "attachment storage",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_setting(s).as_str() {
            "roll_back" | "rollback" => Ok(FailurePolicy::RollBack),
            "roll_forward" | "rollforward" => Ok(FailurePolicy::RollForward),
            other => Err(UnknownVariant {
                setting: "failure policy",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = SyncPolicy::default();
        assert_eq!(policy.header_write, HeaderWrite::BeforeCollections);
        assert!(policy.commit_uploads);
        assert_eq!(policy.attachment_storage, AttachmentStorage::LinkMap);
        assert_eq!(policy.failure, FailurePolicy::RollBack);
        assert!(!policy.header_waits_for_attachments());
    }

    #[test]
    fn test_parse_settings() {
        assert_eq!("After".parse::<HeaderWrite>(), Ok(HeaderWrite::AfterCollections));
        assert_eq!(
            "header_url".parse::<AttachmentStorage>(),
            Ok(AttachmentStorage::HeaderUrl)
        );
        assert_eq!(
            "roll_forward".parse::<FailurePolicy>(),
            Ok(FailurePolicy::RollForward)
        );
    }

    #[test]
    fn test_parse_hyphenated_settings() {
        assert_eq!(
            "roll-forward".parse::<FailurePolicy>(),
            Ok(FailurePolicy::RollForward)
        );
        assert_eq!(
            "Roll-Back".parse::<FailurePolicy>(),
            Ok(FailurePolicy::RollBack)
        );
        assert_eq!(
            "header-url".parse::<AttachmentStorage>(),
            Ok(AttachmentStorage::HeaderUrl)
        );
        assert_eq!(
            "after-collections".parse::<HeaderWrite>(),
            Ok(HeaderWrite::AfterCollections)
        );
    }

    #[test]
    fn test_parse_unknown_value() {
        let err = "sideways".parse::<HeaderWrite>().unwrap_err();
        assert_eq!(err.to_string(), "unknown header write value 'sideways'");
    }
}
