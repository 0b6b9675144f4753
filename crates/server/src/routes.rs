//! API route definitions

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use blockport::storage::remote::{ResolveRequest, ResolveResponse};
use blockport::storage::{AssetLookup, ContentStore};
use blockport::sync::{ContentSaveHook, SaveKind, SyncReport};

/// Shared application state
pub struct AppState {
    /// Answers the control endpoint
    pub assets: Arc<dyn AssetLookup>,
    /// Content store wrapped by the import trigger
    pub hook: Arc<ContentSaveHook<Arc<dyn ContentStore>>>,
    /// Bearer token required for edit operations; open when `None`
    pub edit_token: Option<String>,
}

pub type SharedState = Arc<AppState>;

/// Create API routes
pub fn create_routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/resolve-attachments", post(resolve_attachments))
        .route("/v1/content/:id", get(get_content).put(save_content))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "blockport",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

type Failure = (StatusCode, Json<ResolveResponse>);

fn failure(status: StatusCode, message: impl Into<String>) -> Failure {
    (
        status,
        Json(ResolveResponse {
            success: false,
            urls: BTreeMap::new(),
            message: Some(message.into()),
        }),
    )
}

/// Check the edit capability.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Failure> {
    let Some(expected) = &state.edit_token else {
        return Ok(());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        None => Err(failure(StatusCode::UNAUTHORIZED, "Missing bearer token")),
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(failure(StatusCode::FORBIDDEN, "Token does not grant edit access")),
    }
}

/// Resolve attachment IDs to URLs.
///
/// Unresolvable IDs are absent from `urls`. An empty, missing or malformed
/// ID list is a 400.
async fn resolve_attachments(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ResolveResponse>, Failure> {
    authorize(&state, &headers)?;

    let Json(request) = payload.map_err(|rejection| {
        failure(
            StatusCode::BAD_REQUEST,
            format!("Invalid request body: {}", rejection.body_text()),
        )
    })?;

    if request.attachment_ids.is_empty() {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "attachment_ids must be a non-empty array of IDs",
        ));
    }
    if request.attachment_ids.contains(&0) {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "attachment_ids must contain positive integers only",
        ));
    }

    let ids = request.attachment_ids.into_iter().collect();
    let assets = Arc::clone(&state.assets);
    let urls = tokio::task::spawn_blocking(move || assets.urls_for_ids(&ids))
        .await
        .map_err(|e| {
            tracing::error!("Lookup task failed: {:?}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Lookup task failed")
        })?
        .map_err(|e| {
            tracing::error!("Asset store lookup failed: {:#}", e);
            failure(StatusCode::BAD_GATEWAY, format!("Asset store unavailable: {:#}", e))
        })?;

    tracing::debug!(resolved = urls.len(), "resolved attachment IDs");
    Ok(Json(ResolveResponse {
        success: true,
        urls: urls
            .into_iter()
            .map(|(id, url)| (id.to_string(), url))
            .collect(),
        message: None,
    }))
}

/// Body of a content save
#[derive(Debug, Serialize, Deserialize)]
pub struct SaveRequest {
    pub content: String,
    #[serde(default)]
    pub kind: SaveKind,
}

/// Result of a content save
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    pub id: String,
    /// Import report, absent when the save did not trigger an import
    pub sync: Option<SyncReport>,
}

/// Stored content
#[derive(Debug, Serialize, Deserialize)]
pub struct ContentResponse {
    pub id: String,
    pub content: String,
}

/// Store content and fire the import trigger
async fn save_content(
    Path(id): Path<String>,
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<SaveRequest>, JsonRejection>,
) -> Result<Json<SaveResponse>, Failure> {
    authorize(&state, &headers)?;

    let Json(request) = payload.map_err(|rejection| {
        failure(
            StatusCode::BAD_REQUEST,
            format!("Invalid request body: {}", rejection.body_text()),
        )
    })?;

    let hook = Arc::clone(&state.hook);
    let content_id = id.clone();
    let report = tokio::task::spawn_blocking(move || {
        hook.save(&content_id, &request.content, request.kind)
    })
    .await
    .map_err(|e| {
        tracing::error!("Save task failed: {:?}", e);
        failure(StatusCode::INTERNAL_SERVER_ERROR, "Save task failed")
    })?
    .map_err(|e| {
        tracing::error!("Failed to save content {}: {:#}", id, e);
        let status = if e.to_string().contains("Invalid content ID") {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        failure(status, format!("{:#}", e))
    })?;

    Ok(Json(SaveResponse {
        success: true,
        id,
        sync: report,
    }))
}

/// Read stored content
///
/// Guarded like saves: stored documents may hold unpublished drafts.
async fn get_content(
    Path(id): Path<String>,
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ContentResponse>, Failure> {
    authorize(&state, &headers)?;

    let hook = Arc::clone(&state.hook);
    let content_id = id.clone();
    let content = tokio::task::spawn_blocking(move || hook.store().load(&content_id))
        .await
        .map_err(|e| {
            tracing::error!("Load task failed: {:?}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Load task failed")
        })?
        .map_err(|e| {
            tracing::debug!("Content {} not available: {:#}", id, e);
            failure(StatusCode::NOT_FOUND, format!("Content not found: {}", id))
        })?;

    Ok(Json(ContentResponse { id, content }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum_test::TestServer;
    use blockport::storage::{InMemoryAssetStore, InMemoryContentStore, InMemoryFetcher};
    use blockport::sync::{AssetSyncPipeline, ResolutionCache};
    use serde_json::{json, Value};

    fn create_test_app(assets: InMemoryAssetStore, edit_token: Option<&str>) -> TestServer {
        let pipeline = AssetSyncPipeline::new(
            Arc::new(InMemoryFetcher::new()),
            Arc::new(assets.clone()),
            ResolutionCache::default(),
        );
        let store: Arc<dyn ContentStore> = Arc::new(InMemoryContentStore::new());
        let state = Arc::new(AppState {
            assets: Arc::new(assets),
            hook: Arc::new(ContentSaveHook::new(store, Arc::new(pipeline))),
            edit_token: edit_token.map(str::to_string),
        });
        TestServer::new(create_routes(state)).unwrap()
    }

    fn seeded() -> InMemoryAssetStore {
        InMemoryAssetStore::new("https://src.test")
            .with_asset(7, "https://src.test/uploads/a.jpg")
            .with_asset(9, "https://src.test/uploads/b.png")
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = create_test_app(seeded(), None);
        let response = server.get("/health").await;
        response.assert_status_ok();
        response.assert_json(&json!({
            "status": "ok",
            "service": "blockport",
            "version": env!("CARGO_PKG_VERSION")
        }));
    }

    #[tokio::test]
    async fn test_resolve_returns_known_ids_only() {
        let server = create_test_app(seeded(), None);
        let response = server
            .post("/v1/resolve-attachments")
            .json(&json!({ "attachment_ids": [7, 9, 11] }))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({
            "success": true,
            "urls": {
                "7": "https://src.test/uploads/a.jpg",
                "9": "https://src.test/uploads/b.png"
            }
        }));
    }

    #[tokio::test]
    async fn test_resolve_rejects_empty_list() {
        let server = create_test_app(seeded(), None);
        let response = server
            .post("/v1/resolve-attachments")
            .json(&json!({ "attachment_ids": [] }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["urls"], json!({}));
    }

    #[tokio::test]
    async fn test_resolve_rejects_malformed_bodies() {
        let server = create_test_app(seeded(), None);

        for body in [
            json!({}),
            json!({ "attachment_ids": "7" }),
            json!({ "attachment_ids": [-1] }),
            json!({ "attachment_ids": [0] }),
            json!({ "attachment_ids": [1.5] }),
        ] {
            let response = server.post("/v1/resolve-attachments").json(&body).await;
            response.assert_status(StatusCode::BAD_REQUEST);
        }

        let response = server.post("/v1/resolve-attachments").text("not json").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_failure_is_bad_gateway() {
        let assets = seeded();
        let server = create_test_app(assets.clone(), None);
        assets.set_offline(true);

        let response = server
            .post("/v1/resolve-attachments")
            .json(&json!({ "attachment_ids": [7] }))
            .await;
        response.assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_edit_token_required_when_configured() {
        let server = create_test_app(seeded(), Some("secret"));
        let body = json!({ "attachment_ids": [7] });

        server
            .post("/v1/resolve-attachments")
            .json(&body)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .post("/v1/resolve-attachments")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
            .json(&body)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        server
            .post("/v1/resolve-attachments")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"))
            .json(&body)
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_save_and_read_content() {
        let server = create_test_app(seeded(), None);
        let content = r#"{"data": {"image": 7}, "mode": "edit"}"#;

        let response = server
            .put("/v1/content/post-1")
            .json(&json!({ "content": content }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["sync"]["outcome"]["status"], "skipped");

        let response = server.get("/v1/content/post-1").await;
        response.assert_status_ok();
        let stored: ContentResponse = response.json();
        assert_eq!(stored.content, content);
    }

    #[tokio::test]
    async fn test_autosave_does_not_sync() {
        let server = create_test_app(seeded(), None);
        let response = server
            .put("/v1/content/post-1")
            .json(&json!({ "content": "draft", "kind": "autosave" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["sync"], Value::Null);
    }

    #[tokio::test]
    async fn test_content_read_requires_edit_token() {
        let server = create_test_app(seeded(), Some("secret"));
        server
            .put("/v1/content/post-1")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"))
            .json(&json!({ "content": "draft", "kind": "autosave" }))
            .await
            .assert_status_ok();

        server
            .get("/v1/content/post-1")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/v1/content/post-1")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = server
            .get("/v1/content/post-1")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"))
            .await;
        response.assert_status_ok();
        let stored: ContentResponse = response.json();
        assert_eq!(stored.content, "draft");
    }

    #[tokio::test]
    async fn test_missing_content_is_not_found() {
        let server = create_test_app(seeded(), None);
        server
            .get("/v1/content/nope")
            .await
            .assert_status_not_found();
    }
}
