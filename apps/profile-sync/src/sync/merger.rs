//! Folds backend responses into the Draft and the Baseline.
//!
//! Merging works on copies. Created rows receive their identifier and
//! canonical fields at the position they occupied in the request; updated rows
//! receive canonical fields; nothing else is touched, and the touched-field
//! sets are never written. Whether the copies replace the session state is
//! decided by the failure policy.

use serde_json::Value;
use tracing::{info, warn};

use crate::errors::SyncError;
use crate::models::attachment::{AttachmentKind, RemoteFile};
use crate::models::profile::{
    Baseline, Collection, FlatSet, FlatSetValues, LinkItem, ProfileDraft,
};
use crate::models::records::{
    Award, Career, Certification, Education, Entry, ItemId, Language, Record,
};
use crate::sync::coordinator::{Execution, PlannedWrite, WriteResponse};
use crate::sync::policy::{FailurePolicy, SyncPolicy};
use crate::sync::report::{Operation, OperationFailure, SaveReport, SyncEvent, UploadStep};

#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub draft: ProfileDraft,
    pub baseline: Baseline,
}

/// Records every outcome in `report` and returns the merged state, or `None`
/// when the policy says nothing may be merged.
pub fn merge(
    snapshot: &ProfileDraft,
    baseline: &Baseline,
    execution: Execution,
    policy: &SyncPolicy,
    report: &mut SaveReport,
) -> Option<Merged> {
    let mut draft = snapshot.clone();
    let mut base = baseline.clone();
    report.attempted = execution.attempted();

    for upload in execution.uploads {
        match upload.result {
            Ok(remote) => {
                report.push(SyncEvent::AttachmentUploaded {
                    kind: upload.kind,
                    url: remote.url.clone(),
                });
                apply_attachment(&mut draft, upload.kind, remote.clone());
                apply_attachment(base.patch(), upload.kind, remote);
            }
            Err(SyncError::Upload {
                kind,
                step,
                message,
            }) => report.push(SyncEvent::AttachmentFailed {
                kind,
                step,
                message,
            }),
            Err(other) => report.push(SyncEvent::AttachmentFailed {
                kind: upload.kind,
                step: UploadStep::Presign,
                message: other.to_string(),
            }),
        }
    }

    match execution.header {
        Some(Ok(persisted)) => {
            report.push(SyncEvent::HeaderWritten {
                profile_id: persisted.id,
                status: persisted.header.status,
            });
            for target in [&mut draft, base.patch()] {
                target.id = Some(persisted.id);
                target.header = persisted.header.clone();
            }
        }
        Some(Err(e)) => report.fail(OperationFailure {
            operation: Operation::Header,
            message: e.to_string(),
        }),
        None => report.push(SyncEvent::HeaderSkipped),
    }

    for result in execution.writes {
        let operation = result.write.operation();
        let applied = result
            .outcome
            .and_then(|response| apply_write(&mut draft, base.patch(), &result.write, response));
        match applied {
            Ok(event) => report.push(event),
            Err(e) => report.fail(OperationFailure {
                operation,
                message: e.to_string(),
            }),
        }
    }

    let failed = !report.is_success();
    if failed && policy.failure == FailurePolicy::RollBack {
        warn!(
            failures = report.failures.len(),
            "Save failed; draft left unchanged"
        );
        return None;
    }

    // On full success the merged draft is the new baseline; after a partial
    // roll-forward only the confirmed pieces were patched into it.
    let baseline = if failed {
        base
    } else {
        Baseline::new(draft.clone())
    };
    report.merged = true;
    report.push(SyncEvent::Merged { partial: failed });
    info!(partial = failed, "Save results merged into draft");
    Some(Merged { draft, baseline })
}

fn apply_attachment(target: &mut ProfileDraft, kind: AttachmentKind, remote: RemoteFile) {
    let slot = target.attachment_mut(kind);
    slot.remote = Some(remote);
    slot.pending = None;
}

fn apply_write(
    draft: &mut ProfileDraft,
    base: &mut ProfileDraft,
    write: &PlannedWrite,
    response: WriteResponse,
) -> Result<SyncEvent, SyncError> {
    match (write, response) {
        (
            PlannedWrite::Create {
                collection,
                indices,
                ..
            },
            WriteResponse::Created(values),
        ) => {
            let ids = match collection {
                Collection::Educations => apply_created::<Education>(draft, base, indices, values),
                Collection::Careers => apply_created::<Career>(draft, base, indices, values),
                Collection::Languages => apply_created::<Language>(draft, base, indices, values),
                Collection::Certifications => {
                    apply_created::<Certification>(draft, base, indices, values)
                }
                Collection::Awards => apply_created::<Award>(draft, base, indices, values),
                other => Err(not_id_keyed(*other)),
            }?;
            Ok(SyncEvent::Created {
                collection: *collection,
                ids,
            })
        }
        (
            PlannedWrite::Update {
                collection,
                index,
                id,
                ..
            },
            WriteResponse::Updated(value),
        ) => {
            match collection {
                Collection::Educations => apply_updated::<Education>(draft, base, *index, value),
                Collection::Careers => apply_updated::<Career>(draft, base, *index, value),
                Collection::Languages => apply_updated::<Language>(draft, base, *index, value),
                Collection::Certifications => {
                    apply_updated::<Certification>(draft, base, *index, value)
                }
                Collection::Awards => apply_updated::<Award>(draft, base, *index, value),
                other => Err(not_id_keyed(*other)),
            }?;
            Ok(SyncEvent::Updated {
                collection: *collection,
                id: *id,
            })
        }
        (PlannedWrite::ReplaceSet { set, .. }, WriteResponse::Replaced(values)) => {
            let count = values.len();
            apply_set(draft, *set, values.clone())?;
            apply_set(base, *set, values)?;
            Ok(SyncEvent::SetReplaced {
                collection: set.collection(),
                count,
            })
        }
        (PlannedWrite::UpsertLink(_), WriteResponse::Linked(link)) => {
            let link_type = link.link_type.clone();
            apply_link(draft, link.clone());
            apply_link(base, link);
            Ok(SyncEvent::LinkUpserted { link_type })
        }
        (write, _) => Err(SyncError::MalformedResponse(format!(
            "response does not match {}",
            write.operation()
        ))),
    }
}

fn not_id_keyed(collection: Collection) -> SyncError {
    SyncError::InvalidDraft(format!("{collection} is not an id-keyed collection"))
}

/// Response item `i` belongs to Draft row `indices[i]`; values are never
/// matched by content.
fn apply_created<T: Record>(
    draft: &mut ProfileDraft,
    base: &mut ProfileDraft,
    indices: &[usize],
    values: Vec<Value>,
) -> Result<Vec<ItemId>, SyncError> {
    if values.len() != indices.len() {
        return Err(SyncError::Correlation {
            collection: T::COLLECTION,
            sent: indices.len(),
            received: values.len(),
        });
    }
    let created = values
        .into_iter()
        .map(parse_persisted::<T>)
        .collect::<Result<Vec<_>, _>>()?;

    let entries = T::entries_mut(draft);
    let mut ids = Vec::with_capacity(created.len());
    for (&index, (id, fields)) in indices.iter().zip(created) {
        let entry = entries.get_mut(index).ok_or_else(|| {
            SyncError::NotFound(format!("{} row {index}", T::COLLECTION))
        })?;
        entry.id = Some(id);
        entry.fields = fields.clone();
        upsert_by_id(T::entries_mut(base), id, fields);
        ids.push(id);
    }
    Ok(ids)
}

fn apply_updated<T: Record>(
    draft: &mut ProfileDraft,
    base: &mut ProfileDraft,
    index: usize,
    value: Value,
) -> Result<(), SyncError> {
    let (id, fields) = parse_persisted::<T>(value)?;
    let entry = T::entries_mut(draft)
        .get_mut(index)
        .ok_or_else(|| SyncError::NotFound(format!("{} row {index}", T::COLLECTION)))?;
    entry.fields = fields.clone();
    upsert_by_id(T::entries_mut(base), id, fields);
    Ok(())
}

fn parse_persisted<T: Record>(value: Value) -> Result<(ItemId, T), SyncError> {
    let entry: Entry<T> = serde_json::from_value(value)?;
    let id = entry.id.ok_or_else(|| {
        SyncError::MalformedResponse(format!("{} response item has no id", T::COLLECTION))
    })?;
    Ok((id, entry.fields))
}

fn upsert_by_id<T>(entries: &mut Vec<Entry<T>>, id: ItemId, fields: T) {
    match entries.iter_mut().find(|e| e.id == Some(id)) {
        Some(existing) => existing.fields = fields,
        None => entries.push(Entry::persisted(id, fields)),
    }
}

fn apply_set(
    target: &mut ProfileDraft,
    set: FlatSet,
    values: FlatSetValues,
) -> Result<(), SyncError> {
    let mismatch = || {
        SyncError::MalformedResponse(format!(
            "{} response has the wrong value kind",
            set.collection()
        ))
    };
    match set {
        FlatSet::Skills => target.skills = Some(values.into_names().ok_or_else(mismatch)?),
        FlatSet::JobTags => target.job_tags = Some(values.into_ids().ok_or_else(mismatch)?),
        FlatSet::ExperienceTags => {
            target.experience_tags = Some(values.into_ids().ok_or_else(mismatch)?)
        }
    }
    Ok(())
}

fn apply_link(target: &mut ProfileDraft, link: LinkItem) {
    target.upsert_link(link);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PersistedHeader;
    use crate::models::profile::ProfileHeader;
    use crate::sync::coordinator::WriteResult;
    use crate::sync::report::SaveMode;
    use serde_json::json;

    fn education(school: &str) -> Entry<Education> {
        Entry::new(Education {
            school: Some(school.to_string()),
            ..Default::default()
        })
    }

    fn create_write(indices: Vec<usize>) -> PlannedWrite {
        PlannedWrite::Create {
            collection: Collection::Educations,
            items: indices.iter().map(|_| json!({})).collect(),
            indices,
        }
    }

    fn header_ok(id: i64) -> Option<Result<PersistedHeader, SyncError>> {
        Some(Ok(PersistedHeader {
            id,
            header: ProfileHeader::default(),
            profile_image_url: None,
            portfolio_url: None,
        }))
    }

    #[test]
    fn test_created_ids_assigned_by_position() {
        let mut snapshot = ProfileDraft {
            educations: vec![
                education("A"),
                Entry::persisted(1, Education::default()),
                education("B"),
                education("C"),
            ],
            ..Default::default()
        };
        snapshot.educations[2].touch("school");

        // response values deliberately identical so only position can match
        let execution = Execution {
            header: header_ok(9),
            writes: vec![WriteResult {
                write: create_write(vec![0, 2, 3]),
                outcome: Ok(WriteResponse::Created(vec![
                    json!({ "id": 10, "school": "same" }),
                    json!({ "id": 11, "school": "same" }),
                    json!({ "id": 12, "school": "same" }),
                ])),
            }],
            ..Default::default()
        };
        let mut report = SaveReport::new(SaveMode::SaveDraft);
        let merged = merge(
            &snapshot,
            &Baseline::default(),
            execution,
            &SyncPolicy::default(),
            &mut report,
        )
        .unwrap();

        let ids: Vec<_> = merged.draft.educations.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![Some(10), Some(1), Some(11), Some(12)]);
        assert!(merged.draft.educations[2].is_touched("school"));
        assert_eq!(report.created_ids(Collection::Educations), vec![10, 11, 12]);
    }

    #[test]
    fn test_rollback_merges_nothing() {
        let snapshot = ProfileDraft {
            educations: vec![education("A")],
            ..Default::default()
        };
        let execution = Execution {
            header: header_ok(9),
            writes: vec![
                WriteResult {
                    write: create_write(vec![0]),
                    outcome: Ok(WriteResponse::Created(vec![json!({ "id": 10 })])),
                },
                WriteResult {
                    write: PlannedWrite::ReplaceSet {
                        set: FlatSet::Skills,
                        values: FlatSetValues::Names(vec![]),
                    },
                    outcome: Err(SyncError::Api {
                        status: 500,
                        message: "down".to_string(),
                    }),
                },
            ],
            ..Default::default()
        };
        let mut report = SaveReport::new(SaveMode::SaveDraft);
        let merged = merge(
            &snapshot,
            &Baseline::default(),
            execution,
            &SyncPolicy::default(),
            &mut report,
        );
        assert!(merged.is_none());
        assert!(!report.merged);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.attempted, 3);
    }

    #[test]
    fn test_roll_forward_patches_baseline_with_successes_only() {
        let snapshot = ProfileDraft {
            educations: vec![education("A")],
            skills: Some(vec!["rust".to_string()]),
            ..Default::default()
        };
        let execution = Execution {
            header: header_ok(9),
            writes: vec![
                WriteResult {
                    write: create_write(vec![0]),
                    outcome: Ok(WriteResponse::Created(vec![json!({ "id": 10, "school": "A" })])),
                },
                WriteResult {
                    write: PlannedWrite::ReplaceSet {
                        set: FlatSet::Skills,
                        values: FlatSetValues::Names(vec!["rust".to_string()]),
                    },
                    outcome: Err(SyncError::Api {
                        status: 500,
                        message: "down".to_string(),
                    }),
                },
            ],
            ..Default::default()
        };
        let policy = SyncPolicy::default().with_failure(FailurePolicy::RollForward);
        let mut report = SaveReport::new(SaveMode::SaveDraft);
        let merged = merge(
            &snapshot,
            &Baseline::default(),
            execution,
            &policy,
            &mut report,
        )
        .unwrap();

        assert_eq!(merged.draft.educations[0].id, Some(10));
        assert_eq!(merged.baseline.profile().educations[0].id, Some(10));
        assert_eq!(merged.baseline.profile().skills, None);
        assert_eq!(merged.draft.skills, Some(vec!["rust".to_string()]));
        assert!(report.events.contains(&SyncEvent::Merged { partial: true }));
    }

    #[test]
    fn test_response_without_id_is_a_failure() {
        let snapshot = ProfileDraft {
            educations: vec![education("A")],
            ..Default::default()
        };
        let execution = Execution {
            header: header_ok(9),
            writes: vec![WriteResult {
                write: create_write(vec![0]),
                outcome: Ok(WriteResponse::Created(vec![json!({ "school": "A" })])),
            }],
            ..Default::default()
        };
        let mut report = SaveReport::new(SaveMode::SaveDraft);
        let merged = merge(
            &snapshot,
            &Baseline::default(),
            execution,
            &SyncPolicy::default(),
            &mut report,
        );
        assert!(merged.is_none());
        assert!(report.failures[0].message.contains("has no id"));
    }
}
