//! Editing sessions and the two submission modes.
//!
//! A session owns the Draft and the Baseline it was loaded with; nothing else
//! holds profile state. Saves borrow the session mutably for their whole
//! duration, so no edit can land in the middle of a cycle, and the pipeline
//! still plans from a snapshot taken at save start.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::ProfileBackend;
use crate::errors::SyncError;
use crate::models::profile::{Baseline, ProfileDraft, ProfileId};
use crate::models::records::Record;
use crate::sync::coordinator;
use crate::sync::merger::merge;
use crate::sync::policy::{AttachmentStorage, SyncPolicy};
use crate::sync::report::{SaveMode, SaveReport, SyncEvent};
use crate::sync::validation::{check_draft, validate_for_finalize};

#[derive(Debug, Clone, PartialEq)]
pub struct EditorSession {
    draft: ProfileDraft,
    baseline: Baseline,
}

impl EditorSession {
    /// Starts editing from a server-confirmed profile.
    pub fn new(profile: ProfileDraft) -> Self {
        let baseline = Baseline::new(profile);
        Self {
            draft: baseline.profile().clone(),
            baseline,
        }
    }

    pub fn draft(&self) -> &ProfileDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut ProfileDraft {
        &mut self.draft
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    /// Swaps in a draft edited elsewhere. A draft without a profile id keeps
    /// the loaded one, so the next save updates the profile instead of
    /// creating a second one.
    pub fn replace_draft(&mut self, mut draft: ProfileDraft) {
        if draft.id.is_none() {
            draft.id = self.baseline.profile().id;
        }
        self.draft = draft;
    }
}

/// Result of a successful finalize. The session is consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedProfile {
    pub profile_id: Option<ProfileId>,
    pub report: SaveReport,
}

/// A failed finalize hands the session back for another attempt. It carries
/// whatever the failed cycle merged under the failure policy.
#[derive(Debug, Error)]
#[error("Finalize failed: {error}")]
pub struct FinalizeError {
    pub session: Box<EditorSession>,
    #[source]
    pub error: SyncError,
}

/// Runs save cycles against one backend under one deployment policy.
#[derive(Clone)]
pub struct SyncEngine {
    backend: Arc<dyn ProfileBackend>,
    policy: SyncPolicy,
}

impl SyncEngine {
    pub fn new(backend: Arc<dyn ProfileBackend>, policy: SyncPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Fetches the full profile once and opens a session on it.
    pub async fn load_session(&self) -> Result<EditorSession, SyncError> {
        let mut profile = self.backend.fetch_profile().await?;
        if self.policy.attachment_storage == AttachmentStorage::LinkMap {
            profile.lift_attachment_links();
        }
        info!(profile_id = ?profile.id, "Baseline loaded");
        Ok(EditorSession::new(profile))
    }

    /// Lenient save: no mandatory-field validation, status stays DRAFT, and
    /// the session keeps editing the merged draft.
    pub async fn save_draft(&self, session: &mut EditorSession) -> Result<SaveReport, SyncError> {
        self.run(session, SaveMode::SaveDraft).await
    }

    /// Strict save: validates first, writes status COMPLETE and ends the
    /// session. Any failure, attachment chains included, returns the session
    /// and leaves the server-side status unchanged.
    pub async fn finalize(
        &self,
        mut session: EditorSession,
    ) -> Result<FinalizedProfile, FinalizeError> {
        let validation = validate_for_finalize(&session.draft);
        if !validation.passed() {
            return Err(FinalizeError {
                session: Box::new(session),
                error: SyncError::Validation(validation),
            });
        }

        let report = match self.run(&mut session, SaveMode::Finalize).await {
            Ok(report) => report,
            Err(error) => {
                return Err(FinalizeError {
                    session: Box::new(session),
                    error,
                })
            }
        };

        let attachment_failure = report.attachment_failures().find_map(|e| match e {
            SyncEvent::AttachmentFailed {
                kind,
                step,
                message,
            } => Some(SyncError::Upload {
                kind: *kind,
                step: *step,
                message: message.clone(),
            }),
            _ => None,
        });
        if let Some(error) = attachment_failure {
            return Err(FinalizeError {
                session: Box::new(session),
                error,
            });
        }
        if !report.is_success() {
            let error = SyncError::SaveFailed {
                failures: report.failures.clone(),
                attempted: report.attempted,
            };
            return Err(FinalizeError {
                session: Box::new(session),
                error,
            });
        }

        info!(profile_id = ?session.draft.id, "Profile finalized");
        Ok(FinalizedProfile {
            profile_id: session.draft.id,
            report,
        })
    }

    /// Deletes a row right away, outside any save cycle. Rows the backend
    /// has an id for are deleted remotely first; on failure nothing changes.
    pub async fn delete_item<T: Record>(
        &self,
        session: &mut EditorSession,
        index: usize,
    ) -> Result<(), SyncError> {
        let id = T::entries(&session.draft)
            .get(index)
            .ok_or_else(|| SyncError::NotFound(format!("{} row {index}", T::COLLECTION)))?
            .id;

        if let Some(id) = id {
            self.backend.delete_item(T::COLLECTION, id).await?;
            T::entries_mut(session.baseline.patch()).retain(|e| e.id != Some(id));
            info!(collection = %T::COLLECTION, id, "Row deleted");
        }
        T::entries_mut(&mut session.draft).remove(index);
        Ok(())
    }

    async fn run(
        &self,
        session: &mut EditorSession,
        mode: SaveMode,
    ) -> Result<SaveReport, SyncError> {
        check_draft(&session.draft, &self.policy)?;

        let snapshot = session.draft.clone();
        let plan = coordinator::plan(&snapshot, &session.baseline)?;

        let mut report = SaveReport::new(mode);
        for (collection, classification) in &plan.classifications {
            report.push(SyncEvent::Classified {
                collection: *collection,
                to_create: classification.to_create.len(),
                to_update: classification.to_update.len(),
                unchanged: classification.unchanged.len(),
                removed_locally: classification.removed_locally.clone(),
            });
        }

        info!(?mode, writes = plan.writes.len(), "Starting save cycle");
        let execution = coordinator::execute(
            self.backend.as_ref(),
            &self.policy,
            &snapshot,
            plan,
            mode.status(),
        )
        .await;

        match merge(
            &snapshot,
            &session.baseline,
            execution,
            &self.policy,
            &mut report,
        ) {
            Some(merged) => {
                session.draft = merged.draft;
                session.baseline = merged.baseline;
                Ok(report)
            }
            None => {
                warn!(failures = report.failures.len(), "Save cycle failed");
                Err(SyncError::SaveFailed {
                    failures: report.failures,
                    attempted: report.attempted,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_draft_keeps_loaded_profile_id() {
        let mut session = EditorSession::new(ProfileDraft {
            id: Some(7),
            ..Default::default()
        });
        let mut edited = ProfileDraft::default();
        edited.header.headline = Some("Engineer".to_string());

        session.replace_draft(edited);
        assert_eq!(session.draft().id, Some(7));
        assert_eq!(session.draft().header.headline.as_deref(), Some("Engineer"));

        session.replace_draft(ProfileDraft {
            id: Some(9),
            ..Default::default()
        });
        assert_eq!(session.draft().id, Some(9));
    }
}
