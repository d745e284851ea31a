//! In-process stand-in for the profile REST backend.
//!
//! Keeps server state in memory, records every call in order and can be told
//! to fail specific operations. Returned items have their string values
//! trimmed, mimicking the real backend's normalization.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Map, Value};

use crate::backend::{
    HeaderPayload, PersistedHeader, PresignedUpload, ProfileBackend, UploadCommit,
};
use crate::errors::SyncError;
use crate::models::attachment::{AttachmentKind, RemoteFile};
use crate::models::profile::{
    Collection, FlatSet, FlatSetValues, LinkItem, ProfileDraft, ProfileId,
};
use crate::models::records::ItemId;

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchProfile,
    CreateHeader(HeaderPayload),
    UpdateHeader(ProfileId, HeaderPayload),
    CreateItems(Collection, Vec<Value>),
    UpdateItem(Collection, ItemId, Value),
    DeleteItem(Collection, ItemId),
    ReplaceSet(FlatSet, FlatSetValues),
    UpsertLink(LinkItem),
    Presign { file_name: String, content_type: String },
    Transfer { upload_url: String, content_type: String, size: usize },
    Commit(UploadCommit),
}

impl Call {
    pub fn is_header_write(&self) -> bool {
        matches!(self, Call::CreateHeader(_) | Call::UpdateHeader(..))
    }

    /// Create or update of an id-keyed collection item.
    pub fn is_item_write(&self) -> bool {
        matches!(self, Call::CreateItems(..) | Call::UpdateItem(..))
    }
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, PartialEq)]
pub enum FailPoint {
    Header,
    Create(Collection),
    Update(Collection),
    Delete(Collection),
    ReplaceSet(FlatSet),
    Link(String),
    Presign,
    Transfer,
    Commit,
    /// Create responses for this collection drop their last item.
    ShortCreateResponse(Collection),
}

#[derive(Debug, Default)]
struct State {
    header: Option<PersistedHeader>,
    items: BTreeMap<Collection, Vec<Value>>,
    sets: BTreeMap<Collection, FlatSetValues>,
    links: BTreeMap<String, LinkItem>,
    calls: Vec<Call>,
    fail: Vec<FailPoint>,
}

pub struct InMemoryBackend {
    state: Mutex<State>,
    next_id: AtomicI64,
    object_keys: bool,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_id: AtomicI64::new(1000),
            object_keys: true,
        }
    }

    /// Presign responses carry no object key, like the deployment without a
    /// commit endpoint.
    pub fn without_object_keys(mut self) -> Self {
        self.object_keys = false;
        self
    }

    /// Seeds server state from a profile, as if it had been saved before.
    pub fn seeded(self, profile: &ProfileDraft) -> Self {
        {
            let mut state = self.lock();
            if let Some(id) = profile.id {
                state.header = Some(PersistedHeader {
                    id,
                    header: profile.header.clone(),
                    profile_image_url: profile.profile_image.url().map(String::from),
                    portfolio_url: profile.portfolio.url().map(String::from),
                });
            }
            let collections = [
                (Collection::Educations, to_values(&profile.educations)),
                (Collection::Careers, to_values(&profile.careers)),
                (Collection::Languages, to_values(&profile.languages)),
                (Collection::Certifications, to_values(&profile.certifications)),
                (Collection::Awards, to_values(&profile.awards)),
            ];
            for (collection, values) in collections {
                state.items.insert(collection, values);
            }
            if let Some(skills) = &profile.skills {
                state
                    .sets
                    .insert(Collection::Skills, FlatSetValues::Names(skills.clone()));
            }
            if let Some(tags) = &profile.job_tags {
                state
                    .sets
                    .insert(Collection::JobTags, FlatSetValues::Ids(tags.clone()));
            }
            if let Some(tags) = &profile.experience_tags {
                state
                    .sets
                    .insert(Collection::ExperienceTags, FlatSetValues::Ids(tags.clone()));
            }
            for link in &profile.links {
                state.links.insert(link.link_type.clone(), link.clone());
            }
        }
        self
    }

    pub fn fail(&self, point: FailPoint) {
        self.lock().fail.push(point);
    }

    pub fn clear_failures(&self) {
        self.lock().fail.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Current server-side items of an id-keyed collection.
    pub fn items(&self, collection: Collection) -> Vec<Value> {
        self.lock()
            .items
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Records the call, then fails it if a matching fail point is set.
    fn record(&self, call: Call, point: Option<FailPoint>) -> Result<(), SyncError> {
        let mut state = self.lock();
        state.calls.push(call);
        match point {
            Some(point) if state.fail.contains(&point) => Err(SyncError::Api {
                status: 500,
                message: format!("injected failure: {point:?}"),
            }),
            _ => Ok(()),
        }
    }
}

fn to_values<T: serde::Serialize>(items: &[T]) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .filter(|v| v.get("id").is_some())
        .collect()
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}

fn with_id(value: Value, id: ItemId) -> Value {
    let mut value = canonicalize(value);
    if let Value::Object(map) = &mut value {
        map.insert("id".to_string(), json!(id));
    }
    value
}

#[async_trait]
impl ProfileBackend for InMemoryBackend {
    async fn fetch_profile(&self) -> Result<ProfileDraft, SyncError> {
        self.record(Call::FetchProfile, None)?;
        let state = self.lock();

        let mut body = Map::new();
        if let Some(persisted) = &state.header {
            if let Value::Object(header) = serde_json::to_value(persisted)? {
                body.extend(header);
            }
        }
        for (collection, items) in &state.items {
            body.insert(collection.resource().to_string(), Value::Array(items.clone()));
        }
        let links: Vec<&LinkItem> = state.links.values().collect();
        body.insert("links".to_string(), serde_json::to_value(links)?);
        for (collection, key) in [
            (Collection::Skills, "skills"),
            (Collection::JobTags, "jobTags"),
            (Collection::ExperienceTags, "experienceTags"),
        ] {
            if let Some(values) = state.sets.get(&collection) {
                body.insert(key.to_string(), serde_json::to_value(values)?);
            }
        }
        for (kind, key) in [
            (AttachmentKind::ProfileImage, "profileImage"),
            (AttachmentKind::Portfolio, "portfolio"),
        ] {
            let header_url = state.header.as_ref().and_then(|h| match kind {
                AttachmentKind::ProfileImage => h.profile_image_url.clone(),
                AttachmentKind::Portfolio => h.portfolio_url.clone(),
            });
            let remote = match header_url {
                Some(url) => Some(RemoteFile {
                    url,
                    file_name: None,
                    content_type: None,
                    size: None,
                }),
                None => state.links.get(kind.link_type()).and_then(|l| {
                    l.url.clone().map(|url| RemoteFile {
                        url,
                        file_name: l.file_name.clone(),
                        content_type: l.content_type.clone(),
                        size: l.size,
                    })
                }),
            };
            if let Some(remote) = remote {
                body.insert(key.to_string(), json!({ "remote": remote }));
            }
        }
        Ok(serde_json::from_value(Value::Object(body))?)
    }

    async fn create_header(&self, payload: &HeaderPayload) -> Result<PersistedHeader, SyncError> {
        self.record(Call::CreateHeader(payload.clone()), Some(FailPoint::Header))?;
        let persisted = PersistedHeader {
            id: self.next_id(),
            header: payload.header.clone(),
            profile_image_url: payload.profile_image_url.clone(),
            portfolio_url: payload.portfolio_url.clone(),
        };
        self.lock().header = Some(persisted.clone());
        Ok(persisted)
    }

    async fn update_header(
        &self,
        id: ProfileId,
        payload: &HeaderPayload,
    ) -> Result<PersistedHeader, SyncError> {
        self.record(
            Call::UpdateHeader(id, payload.clone()),
            Some(FailPoint::Header),
        )?;
        let mut state = self.lock();
        let previous = state.header.take();
        let persisted = PersistedHeader {
            id,
            header: payload.header.clone(),
            profile_image_url: payload
                .profile_image_url
                .clone()
                .or_else(|| previous.as_ref().and_then(|h| h.profile_image_url.clone())),
            portfolio_url: payload
                .portfolio_url
                .clone()
                .or_else(|| previous.as_ref().and_then(|h| h.portfolio_url.clone())),
        };
        state.header = Some(persisted.clone());
        Ok(persisted)
    }

    async fn create_items(
        &self,
        collection: Collection,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, SyncError> {
        self.record(
            Call::CreateItems(collection, items.clone()),
            Some(FailPoint::Create(collection)),
        )?;
        let mut created: Vec<Value> = items
            .into_iter()
            .map(|item| with_id(item, self.next_id()))
            .collect();
        let mut state = self.lock();
        state
            .items
            .entry(collection)
            .or_default()
            .extend(created.iter().cloned());
        if state
            .fail
            .contains(&FailPoint::ShortCreateResponse(collection))
        {
            created.pop();
        }
        Ok(created)
    }

    async fn update_item(
        &self,
        collection: Collection,
        id: ItemId,
        item: Value,
    ) -> Result<Value, SyncError> {
        self.record(
            Call::UpdateItem(collection, id, item.clone()),
            Some(FailPoint::Update(collection)),
        )?;
        let updated = with_id(item, id);
        let mut state = self.lock();
        let items = state.items.entry(collection).or_default();
        match items.iter_mut().find(|v| v.get("id") == Some(&json!(id))) {
            Some(existing) => *existing = updated.clone(),
            None => {
                return Err(SyncError::Api {
                    status: 404,
                    message: format!("{collection} {id} not found"),
                })
            }
        }
        Ok(updated)
    }

    async fn delete_item(&self, collection: Collection, id: ItemId) -> Result<(), SyncError> {
        self.record(
            Call::DeleteItem(collection, id),
            Some(FailPoint::Delete(collection)),
        )?;
        if let Some(items) = self.lock().items.get_mut(&collection) {
            items.retain(|v| v.get("id") != Some(&json!(id)));
        }
        Ok(())
    }

    async fn replace_set(
        &self,
        set: FlatSet,
        values: FlatSetValues,
    ) -> Result<FlatSetValues, SyncError> {
        self.record(
            Call::ReplaceSet(set, values.clone()),
            Some(FailPoint::ReplaceSet(set)),
        )?;
        let canonical = match values {
            FlatSetValues::Names(names) => FlatSetValues::Names(
                names.into_iter().map(|n| n.trim().to_string()).collect(),
            ),
            ids => ids,
        };
        self.lock().sets.insert(set.collection(), canonical.clone());
        Ok(canonical)
    }

    async fn upsert_link(&self, link: LinkItem) -> Result<LinkItem, SyncError> {
        let point = FailPoint::Link(link.link_type.clone());
        self.record(Call::UpsertLink(link.clone()), Some(point))?;
        self.lock().links.insert(link.link_type.clone(), link.clone());
        Ok(link)
    }

    async fn presign(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<PresignedUpload, SyncError> {
        self.record(
            Call::Presign {
                file_name: file_name.to_string(),
                content_type: content_type.to_string(),
            },
            Some(FailPoint::Presign),
        )?;
        let n = self.next_id();
        Ok(PresignedUpload {
            upload_url: format!("https://uploads.example/put/{n}?signature=abc"),
            file_url: format!("https://uploads.example/files/{n}/{file_name}"),
            object_key: self.object_keys.then(|| format!("uploads/{n}/{file_name}")),
        })
    }

    async fn transfer(
        &self,
        upload_url: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), SyncError> {
        self.record(
            Call::Transfer {
                upload_url: upload_url.to_string(),
                content_type: content_type.to_string(),
                size: body.len(),
            },
            Some(FailPoint::Transfer),
        )
    }

    async fn commit_upload(&self, commit: &UploadCommit) -> Result<RemoteFile, SyncError> {
        self.record(Call::Commit(commit.clone()), Some(FailPoint::Commit))?;
        Ok(RemoteFile {
            url: format!("https://cdn.example/{}", commit.object_key),
            file_name: Some(commit.file_name.clone()),
            content_type: Some(commit.content_type.clone()),
            size: Some(commit.size),
        })
    }
}
