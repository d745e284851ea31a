//! Turns a Draft/Baseline pair into network operations and runs them.
//!
//! Ordering rules:
//! - attachment chains run before any collection write;
//! - batched creates, per-item updates, set replacements and link upserts
//!   are independent and dispatched together as one join;
//! - the header write is placed by `SyncPolicy::header_write`, except that a
//!   profile the backend has never seen is always written first.

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{HeaderPayload, PersistedHeader, ProfileBackend};
use crate::errors::SyncError;
use crate::models::attachment::{AttachmentKind, PendingFile};
use crate::models::profile::{
    Baseline, Collection, FlatSet, FlatSetValues, LinkItem, ProfileDraft, ProfileStatus,
};
use crate::models::records::{Award, Career, Certification, Education, ItemId, Language, Record};
use crate::sync::classifier::{classify, Classification};
use crate::sync::policy::{HeaderWrite, SyncPolicy};
use crate::sync::report::Operation;
use crate::sync::upload::{upload_all, UploadOutcome};

/// A write that belongs to the concurrent join.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedWrite {
    /// One array POST per collection; `indices` are the Draft rows in request order.
    Create {
        collection: Collection,
        indices: Vec<usize>,
        items: Vec<Value>,
    },
    Update {
        collection: Collection,
        index: usize,
        id: ItemId,
        item: Value,
    },
    ReplaceSet {
        set: FlatSet,
        values: FlatSetValues,
    },
    UpsertLink(LinkItem),
}

impl PlannedWrite {
    pub fn operation(&self) -> Operation {
        match self {
            PlannedWrite::Create {
                collection, items, ..
            } => Operation::CreateBatch {
                collection: *collection,
                count: items.len(),
            },
            PlannedWrite::Update { collection, id, .. } => Operation::Update {
                collection: *collection,
                id: *id,
            },
            PlannedWrite::ReplaceSet { set, values } => Operation::ReplaceSet {
                collection: set.collection(),
                count: values.len(),
            },
            PlannedWrite::UpsertLink(link) => Operation::UpsertLink {
                link_type: link.link_type.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteResponse {
    Created(Vec<Value>),
    Updated(Value),
    Replaced(FlatSetValues),
    Linked(LinkItem),
}

#[derive(Debug)]
pub struct WriteResult {
    pub write: PlannedWrite,
    pub outcome: Result<WriteResponse, SyncError>,
}

#[derive(Debug, Default)]
pub struct SavePlan {
    pub classifications: Vec<(Collection, Classification)>,
    pub attachments: Vec<(AttachmentKind, PendingFile)>,
    pub writes: Vec<PlannedWrite>,
}

/// Everything the backend answered during one cycle.
#[derive(Debug, Default)]
pub struct Execution {
    pub uploads: Vec<UploadOutcome>,
    /// `None` when the header write was never attempted.
    pub header: Option<Result<PersistedHeader, SyncError>>,
    pub writes: Vec<WriteResult>,
}

impl Execution {
    pub fn attempted(&self) -> usize {
        self.writes.len() + usize::from(self.header.is_some())
    }
}

pub fn plan(draft: &ProfileDraft, baseline: &Baseline) -> Result<SavePlan, SyncError> {
    let base = baseline.profile();
    let mut plan = SavePlan::default();

    plan_records::<Education>(draft, base, &mut plan)?;
    plan_records::<Career>(draft, base, &mut plan)?;
    plan_records::<Language>(draft, base, &mut plan)?;
    plan_records::<Certification>(draft, base, &mut plan)?;
    plan_records::<Award>(draft, base, &mut plan)?;

    // Flat sets are always sent whole. Skills go out even when empty so the
    // user can clear them; tag lists only when they have members.
    if let Some(skills) = &draft.skills {
        plan.writes.push(PlannedWrite::ReplaceSet {
            set: FlatSet::Skills,
            values: FlatSetValues::Names(skills.clone()),
        });
    }
    for (set, tags) in [
        (FlatSet::JobTags, &draft.job_tags),
        (FlatSet::ExperienceTags, &draft.experience_tags),
    ] {
        if let Some(tags) = tags.as_ref().filter(|t| !t.is_empty()) {
            plan.writes.push(PlannedWrite::ReplaceSet {
                set,
                values: FlatSetValues::Ids(tags.clone()),
            });
        }
    }

    plan.writes.extend(
        draft
            .links
            .iter()
            .filter(|l| !l.is_blank())
            .cloned()
            .map(PlannedWrite::UpsertLink),
    );

    for kind in AttachmentKind::ALL {
        if let Some(pending) = &draft.attachment(kind).pending {
            plan.attachments.push((kind, pending.clone()));
        }
    }

    debug!(
        writes = plan.writes.len(),
        attachments = plan.attachments.len(),
        "Save plan built"
    );
    Ok(plan)
}

fn plan_records<T: Record>(
    draft: &ProfileDraft,
    baseline: &ProfileDraft,
    plan: &mut SavePlan,
) -> Result<(), SyncError> {
    let entries = T::entries(draft);
    let classification = classify(entries, T::entries(baseline));

    if !classification.to_create.is_empty() {
        let items = classification
            .to_create
            .iter()
            .map(|&i| serde_json::to_value(&entries[i].fields))
            .collect::<Result<Vec<_>, _>>()?;
        plan.writes.push(PlannedWrite::Create {
            collection: T::COLLECTION,
            indices: classification.to_create.clone(),
            items,
        });
    }

    for &index in &classification.to_update {
        let entry = &entries[index];
        if let Some(id) = entry.id {
            plan.writes.push(PlannedWrite::Update {
                collection: T::COLLECTION,
                index,
                id,
                item: serde_json::to_value(&entry.fields)?,
            });
        }
    }

    plan.classifications.push((T::COLLECTION, classification));
    Ok(())
}

/// Builds the header body. URL fields are only filled under header-URL
/// storage: a fresh upload wins, otherwise the already persisted reference.
pub fn header_payload(
    draft: &ProfileDraft,
    policy: &SyncPolicy,
    status: ProfileStatus,
    uploads: &[UploadOutcome],
) -> HeaderPayload {
    let mut header = draft.header.clone();
    header.status = status;

    let mut payload = HeaderPayload {
        header,
        profile_image_url: None,
        portfolio_url: None,
    };
    if !policy.header_waits_for_attachments() {
        return payload;
    }

    let url_for = |kind: AttachmentKind| {
        let uploaded = uploads
            .iter()
            .find(|u| u.kind == kind)
            .and_then(|u| u.result.as_ref().ok())
            .map(|r| r.url.clone());
        uploaded.or_else(|| draft.attachment(kind).url().map(String::from))
    };
    payload.profile_image_url = url_for(AttachmentKind::ProfileImage);
    payload.portfolio_url = url_for(AttachmentKind::Portfolio);
    payload
}

async fn write_header(
    backend: &dyn ProfileBackend,
    draft: &ProfileDraft,
    payload: &HeaderPayload,
) -> Result<PersistedHeader, SyncError> {
    match draft.id {
        Some(id) => backend.update_header(id, payload).await,
        None => backend.create_header(payload).await,
    }
}

async fn run_write(
    backend: &dyn ProfileBackend,
    write: &PlannedWrite,
) -> Result<WriteResponse, SyncError> {
    match write {
        PlannedWrite::Create {
            collection, items, ..
        } => {
            let created = backend.create_items(*collection, items.clone()).await?;
            if created.len() != items.len() {
                return Err(SyncError::Correlation {
                    collection: *collection,
                    sent: items.len(),
                    received: created.len(),
                });
            }
            Ok(WriteResponse::Created(created))
        }
        PlannedWrite::Update {
            collection,
            id,
            item,
            ..
        } => Ok(WriteResponse::Updated(
            backend.update_item(*collection, *id, item.clone()).await?,
        )),
        PlannedWrite::ReplaceSet { set, values } => Ok(WriteResponse::Replaced(
            backend.replace_set(*set, values.clone()).await?,
        )),
        PlannedWrite::UpsertLink(link) => {
            Ok(WriteResponse::Linked(backend.upsert_link(link.clone()).await?))
        }
    }
}

/// Dispatches every write concurrently and waits for all of them to settle.
/// Each result is kept so the merger can tell which ones failed.
pub async fn dispatch(backend: &dyn ProfileBackend, writes: Vec<PlannedWrite>) -> Vec<WriteResult> {
    let futures = writes.into_iter().map(|write| async move {
        let outcome = run_write(backend, &write).await;
        if let Err(e) = &outcome {
            warn!(operation = %write.operation(), "Write failed: {e}");
        }
        WriteResult { write, outcome }
    });
    join_all(futures).await
}

/// Runs a plan against the backend in the order the policy dictates.
///
/// A finalize writes status COMPLETE, so it runs every attachment chain
/// first and dispatches nothing if one of them failed. For a profile that
/// already exists the COMPLETE header is also written last, and only when
/// every collection write succeeded.
pub async fn execute(
    backend: &dyn ProfileBackend,
    policy: &SyncPolicy,
    draft: &ProfileDraft,
    plan: SavePlan,
    status: ProfileStatus,
) -> Execution {
    let mut execution = Execution::default();
    let finalizing = status == ProfileStatus::Complete;
    let header_first = draft.id.is_none()
        || (policy.header_write == HeaderWrite::BeforeCollections && !finalizing);
    let uploads_first = finalizing || !header_first || policy.header_waits_for_attachments();

    let mut attachments = plan.attachments;
    if uploads_first {
        execution.uploads = upload_all(backend, policy, std::mem::take(&mut attachments)).await;
        if finalizing && execution.uploads.iter().any(|u| u.result.is_err()) {
            warn!("Attachment upload failed; finalize writes not dispatched");
            return execution;
        }
    }

    if header_first {
        let payload = header_payload(draft, policy, status, &execution.uploads);
        execution.header = Some(write_header(backend, draft, &payload).await);

        match &execution.header {
            Some(Ok(persisted)) => {
                info!(profile_id = persisted.id, "Header written before collections");
                if !uploads_first {
                    execution.uploads = upload_all(backend, policy, attachments).await;
                }
                execution.writes = dispatch(backend, plan.writes).await;
            }
            _ => warn!("Header write failed; collection writes not dispatched"),
        }
    } else {
        execution.writes = dispatch(backend, plan.writes).await;

        if execution.writes.iter().all(|w| w.outcome.is_ok()) {
            let payload = header_payload(draft, policy, status, &execution.uploads);
            execution.header = Some(write_header(backend, draft, &payload).await);
            if let Some(Ok(persisted)) = &execution.header {
                info!(profile_id = persisted.id, "Header written after collections");
            }
        } else {
            warn!("Collection writes failed; header write skipped");
        }
    }

    execution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::LinkItem;
    use crate::models::records::Entry;
    use crate::sync::policy::AttachmentStorage;

    fn education(school: &str) -> Entry<Education> {
        Entry::new(Education {
            school: Some(school.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_plan_batches_creates_per_collection() {
        let draft = ProfileDraft {
            educations: vec![education("A"), education("B"), Entry::new(Education::default())],
            ..Default::default()
        };
        let plan = plan(&draft, &Baseline::default()).unwrap();
        assert_eq!(plan.writes.len(), 1);
        match &plan.writes[0] {
            PlannedWrite::Create {
                collection,
                indices,
                items,
            } => {
                assert_eq!(*collection, Collection::Educations);
                assert_eq!(indices, &vec![0, 1]);
                assert_eq!(items[0], serde_json::json!({ "school": "A" }));
            }
            other => panic!("unexpected write {other:?}"),
        }
    }

    #[test]
    fn test_plan_flat_sets_and_links() {
        let draft = ProfileDraft {
            skills: Some(Vec::new()),
            job_tags: Some(Vec::new()),
            experience_tags: Some(vec![3, 4]),
            links: vec![
                LinkItem::new("primary-link", "https://a.example"),
                LinkItem {
                    link_type: "secondary-link".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let ops: Vec<Operation> = plan(&draft, &Baseline::default())
            .unwrap()
            .writes
            .iter()
            .map(PlannedWrite::operation)
            .collect();
        assert_eq!(
            ops,
            vec![
                Operation::ReplaceSet {
                    collection: Collection::Skills,
                    count: 0
                },
                Operation::ReplaceSet {
                    collection: Collection::ExperienceTags,
                    count: 2
                },
                Operation::UpsertLink {
                    link_type: "primary-link".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_header_payload_urls_only_for_header_storage() {
        let mut draft = ProfileDraft::default();
        draft.profile_image.remote = Some(crate::models::attachment::RemoteFile {
            url: "https://cdn.example/old.png".to_string(),
            file_name: None,
            content_type: None,
            size: None,
        });

        let links = header_payload(&draft, &SyncPolicy::default(), ProfileStatus::Draft, &[]);
        assert_eq!(links.profile_image_url, None);

        let policy =
            SyncPolicy::default().with_attachment_storage(AttachmentStorage::HeaderUrl);
        let header = header_payload(&draft, &policy, ProfileStatus::Complete, &[]);
        assert_eq!(
            header.profile_image_url.as_deref(),
            Some("https://cdn.example/old.png")
        );
        assert_eq!(header.header.status, ProfileStatus::Complete);
    }
}
