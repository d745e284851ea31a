//! Upload chain for pending attachments.
//!
//! presign → transfer → commit → link-attach, strictly in that order. A failed
//! step ends the chain for that attachment only; no later step runs with a
//! stale or missing URL. Chains for different attachments run concurrently.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::backend::{ProfileBackend, UploadCommit};
use crate::errors::SyncError;
use crate::models::attachment::{AttachmentKind, PendingFile, RemoteFile};
use crate::models::profile::LinkItem;
use crate::sync::policy::{AttachmentStorage, SyncPolicy};
use crate::sync::report::UploadStep;

/// Result of one attachment chain.
#[derive(Debug)]
pub struct UploadOutcome {
    pub kind: AttachmentKind,
    pub result: Result<RemoteFile, SyncError>,
}

fn step_error(kind: AttachmentKind, step: UploadStep) -> impl FnOnce(SyncError) -> SyncError {
    move |e| SyncError::Upload {
        kind,
        step,
        message: e.to_string(),
    }
}

/// Runs the full chain for one pending file and returns the canonical
/// reference. With header-URL storage the link-attach step is the header
/// write itself, so the chain ends at the canonical URL.
pub async fn upload_attachment(
    backend: &dyn ProfileBackend,
    policy: &SyncPolicy,
    kind: AttachmentKind,
    file: &PendingFile,
) -> Result<RemoteFile, SyncError> {
    debug!(%kind, file = %file.file_name, size = file.size(), "Presigning upload");
    let presigned = backend
        .presign(&file.file_name, &file.content_type)
        .await
        .map_err(step_error(kind, UploadStep::Presign))?;

    backend
        .transfer(&presigned.upload_url, &file.content_type, file.bytes.clone())
        .await
        .map_err(step_error(kind, UploadStep::Transfer))?;

    let remote = if policy.commit_uploads {
        let object_key = presigned.object_key.ok_or_else(|| SyncError::Upload {
            kind,
            step: UploadStep::Commit,
            message: "presign response carried no object key".to_string(),
        })?;
        backend
            .commit_upload(&UploadCommit {
                object_key,
                file_name: file.file_name.clone(),
                content_type: file.content_type.clone(),
                size: file.size(),
            })
            .await
            .map_err(step_error(kind, UploadStep::Commit))?
    } else {
        RemoteFile {
            url: presigned.file_url,
            file_name: Some(file.file_name.clone()),
            content_type: Some(file.content_type.clone()),
            size: Some(file.size()),
        }
    };

    if policy.attachment_storage == AttachmentStorage::LinkMap {
        let link = LinkItem {
            link_type: kind.link_type().to_string(),
            url: Some(remote.url.clone()),
            file_name: remote.file_name.clone(),
            content_type: remote.content_type.clone(),
            size: remote.size,
        };
        backend
            .upsert_link(link)
            .await
            .map_err(step_error(kind, UploadStep::LinkAttach))?;
    }

    info!(%kind, url = %remote.url, "Attachment uploaded");
    Ok(remote)
}

/// Runs every chain concurrently. Outcomes come back in input order.
pub async fn upload_all(
    backend: &dyn ProfileBackend,
    policy: &SyncPolicy,
    pending: Vec<(AttachmentKind, PendingFile)>,
) -> Vec<UploadOutcome> {
    let chains = pending.iter().map(|(kind, file)| async move {
        let result = upload_attachment(backend, policy, *kind, file).await;
        if let Err(e) = &result {
            warn!(%kind, "Attachment chain aborted: {e}");
        }
        UploadOutcome { kind: *kind, result }
    });
    join_all(chains).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{Call, FailPoint, InMemoryBackend};

    fn pdf() -> PendingFile {
        PendingFile::new("cv.pdf", "application/pdf", b"%PDF".to_vec())
    }

    #[tokio::test]
    async fn test_chain_runs_all_steps_in_order() {
        let backend = InMemoryBackend::new();
        let policy = SyncPolicy::default();
        let remote = upload_attachment(&backend, &policy, AttachmentKind::Portfolio, &pdf())
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[0], Call::Presign { .. }));
        assert!(matches!(
            &calls[1],
            Call::Transfer { content_type, size: 4, .. } if content_type == "application/pdf"
        ));
        assert!(matches!(&calls[2], Call::Commit(c) if c.size == 4 && c.file_name == "cv.pdf"));
        assert!(matches!(
            &calls[3],
            Call::UpsertLink(link) if link.link_type == "portfolio"
                && link.url.as_deref() == Some(remote.url.as_str())
        ));
        assert!(remote.url.starts_with("https://cdn.example/uploads/"));
    }

    #[tokio::test]
    async fn test_without_commit_uses_presigned_file_url() {
        let backend = InMemoryBackend::new().without_object_keys();
        let policy = SyncPolicy::default().with_commit_uploads(false);
        let remote = upload_attachment(&backend, &policy, AttachmentKind::Portfolio, &pdf())
            .await
            .unwrap();
        assert!(remote.url.starts_with("https://uploads.example/files/"));
        assert!(!backend.calls().iter().any(|c| matches!(c, Call::Commit(_))));
    }

    #[tokio::test]
    async fn test_commit_without_object_key_fails_at_commit() {
        let backend = InMemoryBackend::new().without_object_keys();
        let err = upload_attachment(
            &backend,
            &SyncPolicy::default(),
            AttachmentKind::Portfolio,
            &pdf(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Upload {
                step: UploadStep::Commit,
                ..
            }
        ));
        assert!(!backend.calls().iter().any(|c| matches!(c, Call::UpsertLink(_))));
    }

    #[tokio::test]
    async fn test_transfer_failure_never_reaches_link_attach() {
        let backend = InMemoryBackend::new();
        backend.fail(FailPoint::Transfer);
        let err = upload_attachment(
            &backend,
            &SyncPolicy::default(),
            AttachmentKind::ProfileImage,
            &pdf(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Upload {
                kind: AttachmentKind::ProfileImage,
                step: UploadStep::Transfer,
                ..
            }
        ));
        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_header_url_storage_skips_link_upsert() {
        let backend = InMemoryBackend::new();
        let policy =
            SyncPolicy::default().with_attachment_storage(AttachmentStorage::HeaderUrl);
        upload_attachment(&backend, &policy, AttachmentKind::ProfileImage, &pdf())
            .await
            .unwrap();
        assert!(!backend.calls().iter().any(|c| matches!(c, Call::UpsertLink(_))));
    }

    #[tokio::test]
    async fn test_upload_all_isolates_failures() {
        let backend = InMemoryBackend::new();
        backend.fail(FailPoint::Link("profile-image".to_string()));
        let outcomes = upload_all(
            &backend,
            &SyncPolicy::default(),
            vec![
                (
                    AttachmentKind::ProfileImage,
                    PendingFile::new("me.png", "image/png", vec![0u8; 3]),
                ),
                (AttachmentKind::Portfolio, pdf()),
            ],
        )
        .await;
        assert_eq!(outcomes[0].kind, AttachmentKind::ProfileImage);
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
    }
}
