//! The REST collaborators the sync pipeline talks to.
//!
//! `ProfileBackend` is the only way the pipeline reaches the network. It is
//! object-safe so callers hold an `Arc<dyn ProfileBackend>`: `HttpBackend`
//! in production, `InMemoryBackend` in tests and dry runs. Collection items
//! cross the seam as JSON values; typed (de)serialization stays on the
//! pipeline side.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SyncError;
use crate::models::attachment::RemoteFile;
use crate::models::profile::{
    Collection, FlatSet, FlatSetValues, LinkItem, ProfileDraft, ProfileHeader, ProfileId,
};
use crate::models::records::ItemId;

pub mod http;
pub mod memory;

/// Body of a header write. The URL fields are only populated when the
/// deployment stores attachment references on the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderPayload {
    #[serde(flatten)]
    pub header: ProfileHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_url: Option<String>,
}

/// Canonical header returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedHeader {
    pub id: ProfileId,
    #[serde(flatten)]
    pub header: ProfileHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_url: Option<String>,
}

/// One-time write location for a binary upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub upload_url: String,
    pub file_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
}

/// Completion notice sent after the bytes have been transferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCommit {
    pub object_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

#[async_trait]
pub trait ProfileBackend: Send + Sync {
    /// Full profile with every sub-collection; becomes the Baseline.
    async fn fetch_profile(&self) -> Result<ProfileDraft, SyncError>;

    async fn create_header(&self, payload: &HeaderPayload) -> Result<PersistedHeader, SyncError>;

    async fn update_header(
        &self,
        id: ProfileId,
        payload: &HeaderPayload,
    ) -> Result<PersistedHeader, SyncError>;

    /// Array create. The response must be positionally correlated with `items`.
    async fn create_items(
        &self,
        collection: Collection,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, SyncError>;

    async fn update_item(
        &self,
        collection: Collection,
        id: ItemId,
        item: Value,
    ) -> Result<Value, SyncError>;

    async fn delete_item(&self, collection: Collection, id: ItemId) -> Result<(), SyncError>;

    /// Full replacement of a flat set; returns the canonical membership.
    async fn replace_set(
        &self,
        set: FlatSet,
        values: FlatSetValues,
    ) -> Result<FlatSetValues, SyncError>;

    async fn upsert_link(&self, link: LinkItem) -> Result<LinkItem, SyncError>;

    async fn presign(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<PresignedUpload, SyncError>;

    /// Raw PUT of the bytes to the presigned location. The location is the
    /// credential: only the content type header may be sent.
    async fn transfer(
        &self,
        upload_url: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), SyncError>;

    async fn commit_upload(&self, commit: &UploadCommit) -> Result<RemoteFile, SyncError>;
}
