//! reqwest implementation of the profile REST collaborators.
//!
//! No retries happen here: a failed call is reported to the pipeline, and the
//! user retries the whole save, which is safe because of classification.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{
    HeaderPayload, PersistedHeader, PresignedUpload, ProfileBackend, UploadCommit,
};
use crate::errors::SyncError;
use crate::models::attachment::RemoteFile;
use crate::models::profile::{
    Collection, FlatSet, FlatSetValues, LinkItem, ProfileDraft, ProfileId,
};
use crate::models::records::ItemId;

#[derive(Debug, Serialize, Deserialize)]
struct SetBody {
    ids: FlatSetValues,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignRequest<'a> {
    file_name: &'a str,
    content_type: &'a str,
}

/// Error bodies come as `{"error": {"message": ..}}` or `{"message": ..}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorBody {
    Nested { error: ApiErrorMessage },
    Flat(ApiErrorMessage),
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    message: String,
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| SyncError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn collection_url(&self, collection: Collection) -> String {
        self.url(&format!("/profile/{}", collection.resource()))
    }

    /// `profile/links/{type}` with the type tag percent-encoded as one segment.
    fn link_url(&self, link_type: &str) -> Result<Url, SyncError> {
        let base = self.collection_url(Collection::Links);
        let mut url =
            Url::parse(&base).map_err(|e| SyncError::InvalidUrl(format!("{base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(format!("{base} cannot carry a path")))?
            .push(link_type);
        Ok(url)
    }

    /// Adds the bearer token. Never used for the presigned transfer.
    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SyncError> {
        let response = check_status(self.authed(request).send().await?).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(ApiErrorBody::Nested { error }) => error.message,
        Ok(ApiErrorBody::Flat(error)) => error.message,
        Err(_) => body,
    };
    Err(SyncError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ProfileBackend for HttpBackend {
    async fn fetch_profile(&self) -> Result<ProfileDraft, SyncError> {
        self.send_json(self.client.get(self.url("/profile"))).await
    }

    async fn create_header(&self, payload: &HeaderPayload) -> Result<PersistedHeader, SyncError> {
        self.send_json(self.client.post(self.url("/profile")).json(payload))
            .await
    }

    async fn update_header(
        &self,
        id: ProfileId,
        payload: &HeaderPayload,
    ) -> Result<PersistedHeader, SyncError> {
        self.send_json(
            self.client
                .put(self.url(&format!("/profile/{id}")))
                .json(payload),
        )
        .await
    }

    async fn create_items(
        &self,
        collection: Collection,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, SyncError> {
        debug!(%collection, count = items.len(), "POST batch");
        self.send_json(self.client.post(self.collection_url(collection)).json(&items))
            .await
    }

    async fn update_item(
        &self,
        collection: Collection,
        id: ItemId,
        item: Value,
    ) -> Result<Value, SyncError> {
        let url = format!("{}/{id}", self.collection_url(collection));
        self.send_json(self.client.put(url).json(&item)).await
    }

    async fn delete_item(&self, collection: Collection, id: ItemId) -> Result<(), SyncError> {
        let url = format!("{}/{id}", self.collection_url(collection));
        check_status(self.authed(self.client.delete(url)).send().await?).await?;
        Ok(())
    }

    async fn replace_set(
        &self,
        set: FlatSet,
        values: FlatSetValues,
    ) -> Result<FlatSetValues, SyncError> {
        let body: SetBody = self
            .send_json(
                self.client
                    .put(self.collection_url(set.collection()))
                    .json(&SetBody { ids: values }),
            )
            .await?;
        Ok(body.ids)
    }

    async fn upsert_link(&self, link: LinkItem) -> Result<LinkItem, SyncError> {
        let url = self.link_url(&link.link_type)?;
        self.send_json(self.client.put(url).json(&link)).await
    }

    async fn presign(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<PresignedUpload, SyncError> {
        self.send_json(
            self.client
                .post(self.url("/uploads/presign"))
                .json(&PresignRequest {
                    file_name,
                    content_type,
                }),
        )
        .await
    }

    async fn transfer(
        &self,
        upload_url: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), SyncError> {
        let response = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn commit_upload(&self, commit: &UploadCommit) -> Result<RemoteFile, SyncError> {
        self.send_json(self.client.post(self.url("/uploads/commit")).json(commit))
            .await
    }
}
