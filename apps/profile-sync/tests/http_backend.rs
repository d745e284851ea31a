//! Wire shapes of `HttpBackend`, checked against a local axum server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use profile_sync::backend::http::HttpBackend;
use profile_sync::backend::ProfileBackend;
use profile_sync::models::attachment::{AttachmentKind, PendingFile};
use profile_sync::models::profile::{Collection, FlatSet, FlatSetValues, LinkItem};
use profile_sync::sync::policy::SyncPolicy;
use profile_sync::sync::upload::upload_attachment;
use profile_sync::SyncError;

#[derive(Debug, Clone)]
struct Recorded {
    method: &'static str,
    path: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body_len: usize,
}

#[derive(Clone)]
struct MockState {
    base: String,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockState {
    fn record(&self, method: &'static str, path: &str, headers: &HeaderMap, body_len: usize) {
        let header_str = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        self.log.lock().unwrap().push(Recorded {
            method,
            path: path.to_string(),
            authorization: header_str(header::AUTHORIZATION),
            content_type: header_str(header::CONTENT_TYPE),
            body_len,
        });
    }
}

async fn fetch_profile(State(state): State<MockState>, headers: HeaderMap) -> Json<Value> {
    state.record("GET", "/profile", &headers, 0);
    Json(json!({
        "id": 7,
        "displayName": "Ada",
        "status": "DRAFT",
        "careers": [{ "id": 5, "company": "Y", "isCurrent": true }],
        "skills": ["rust", "sql"],
        "jobTags": [3, 4],
        "links": [{ "type": "primary-link", "url": "https://ada.dev" }]
    }))
}

async fn create_educations(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(items): Json<Vec<Value>>,
) -> Json<Vec<Value>> {
    state.record("POST", "/profile/educations", &headers, items.len());
    let created = items
        .into_iter()
        .enumerate()
        .map(|(i, mut item)| {
            item["id"] = json!(100 + i as i64);
            item
        })
        .collect();
    Json(created)
}

async fn update_education(
    State(state): State<MockState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.record("PUT", &format!("/profile/educations/{id}"), &headers, 0);
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": { "code": "INVALID", "message": "startDate must be a date" } })),
    )
}

async fn delete_education(
    State(state): State<MockState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> StatusCode {
    state.record("DELETE", &format!("/profile/educations/{id}"), &headers, 0);
    StatusCode::NO_CONTENT
}

async fn replace_skills(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("PUT", "/profile/skills", &headers, 0);
    Json(body)
}

async fn upsert_link(
    State(state): State<MockState>,
    Path(link_type): Path<String>,
    headers: HeaderMap,
    Json(link): Json<Value>,
) -> Json<Value> {
    state.record("PUT", &format!("/profile/links/{link_type}"), &headers, 0);
    Json(link)
}

async fn presign(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", "/uploads/presign", &headers, 0);
    let name = body["fileName"].as_str().unwrap_or_default().to_string();
    Json(json!({
        "uploadUrl": format!("{}/put/1?signature=abc", state.base),
        "fileUrl": format!("{}/files/1/{name}", state.base),
        "objectKey": format!("uploads/1/{name}")
    }))
}

async fn transfer(
    State(state): State<MockState>,
    Path(n): Path<u32>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.record("PUT", &format!("/put/{n}"), &headers, body.len());
    StatusCode::OK
}

async fn commit(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", "/uploads/commit", &headers, 0);
    Json(json!({
        "url": format!("https://cdn.example/{}", body["objectKey"].as_str().unwrap_or_default()),
        "fileName": body["fileName"],
        "contentType": body["contentType"],
        "size": body["size"]
    }))
}

async fn serve() -> (HttpBackend, MockState) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let state = MockState {
        base: base.clone(),
        log: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/profile", get(fetch_profile))
        .route("/profile/educations", post(create_educations))
        .route(
            "/profile/educations/:id",
            put(update_education).delete(delete_education),
        )
        .route("/profile/skills", put(replace_skills))
        .route("/profile/links/:link_type", put(upsert_link))
        .route("/uploads/presign", post(presign))
        .route("/uploads/commit", post(commit))
        .route("/put/:n", put(transfer))
        .with_state(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let backend =
        HttpBackend::new(base, Some("secret".to_string()), Duration::from_secs(5)).unwrap();
    (backend, state)
}

fn recorded(state: &MockState) -> Vec<Recorded> {
    state.log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_fetch_profile_decodes_wire_shape() {
    let (backend, state) = serve().await;
    let profile = backend.fetch_profile().await.unwrap();

    assert_eq!(profile.id, Some(7));
    assert_eq!(profile.header.display_name.as_deref(), Some("Ada"));
    assert_eq!(profile.careers[0].id, Some(5));
    assert_eq!(profile.careers[0].fields.is_current, Some(true));
    assert_eq!(profile.skills, Some(vec!["rust".to_string(), "sql".to_string()]));
    assert_eq!(profile.job_tags, Some(vec![3, 4]));
    assert_eq!(profile.link("primary-link").unwrap().url.as_deref(), Some("https://ada.dev"));
    assert_eq!(
        recorded(&state)[0].authorization.as_deref(),
        Some("Bearer secret")
    );
}

#[tokio::test]
async fn test_create_items_is_one_array_post() {
    let (backend, state) = serve().await;
    let created = backend
        .create_items(
            Collection::Educations,
            vec![json!({ "school": "A" }), json!({ "school": "B" })],
        )
        .await
        .unwrap();

    assert_eq!(created[0], json!({ "school": "A", "id": 100 }));
    assert_eq!(created[1], json!({ "school": "B", "id": 101 }));

    let log = recorded(&state);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].method, "POST");
    assert_eq!(log[0].body_len, 2);
    assert_eq!(log[0].authorization.as_deref(), Some("Bearer secret"));
}

#[tokio::test]
async fn test_error_body_becomes_api_error() {
    let (backend, _state) = serve().await;
    let err = backend
        .update_item(Collection::Educations, 9, json!({ "startDate": "soon" }))
        .await
        .unwrap_err();
    match err {
        SyncError::Api { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "startDate must be a date");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_accepts_empty_response() {
    let (backend, state) = serve().await;
    backend
        .delete_item(Collection::Educations, 12)
        .await
        .unwrap();
    assert_eq!(recorded(&state)[0].path, "/profile/educations/12");
}

#[tokio::test]
async fn test_replace_set_wraps_values() {
    let (backend, _state) = serve().await;
    let values = backend
        .replace_set(
            FlatSet::Skills,
            FlatSetValues::Names(vec!["rust".to_string()]),
        )
        .await
        .unwrap();
    assert_eq!(values, FlatSetValues::Names(vec!["rust".to_string()]));
}

#[tokio::test]
async fn test_upsert_link_keyed_by_type() {
    let (backend, state) = serve().await;
    let link = backend
        .upsert_link(LinkItem::new("primary-link", "https://ada.dev"))
        .await
        .unwrap();
    assert_eq!(link.url.as_deref(), Some("https://ada.dev"));
    assert_eq!(recorded(&state)[0].path, "/profile/links/primary-link");
}

#[tokio::test]
async fn test_upload_chain_over_http() {
    let (backend, state) = serve().await;
    let file = PendingFile::new("cv.pdf", "application/pdf", b"%PDF-1.7".to_vec());
    let remote = upload_attachment(
        &backend,
        &SyncPolicy::default(),
        AttachmentKind::Portfolio,
        &file,
    )
    .await
    .unwrap();

    assert_eq!(remote.url, "https://cdn.example/uploads/1/cv.pdf");
    assert_eq!(remote.size, Some(8));

    let log = recorded(&state);
    let paths: Vec<&str> = log.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/uploads/presign",
            "/put/1",
            "/uploads/commit",
            "/profile/links/portfolio"
        ]
    );

    let transfer = &log[1];
    assert_eq!(transfer.authorization, None);
    assert_eq!(transfer.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(transfer.body_len, 8);
    assert!(log
        .iter()
        .filter(|r| r.path != "/put/1")
        .all(|r| r.authorization.as_deref() == Some("Bearer secret")));
}
