//! HTTP server exposing the same contract as [`crate::MemoryBackend`]
//! (spec §4.C "HTTP server backend"), built on `axum` — the idiomatic
//! `tokio`-ecosystem counterpart to the original FastAPI server.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::MemoryBackend;

#[derive(Clone)]
struct ServerState {
    backend: Arc<dyn MemoryBackend>,
    api_key: Option<String>,
}

/// Build the router. `api_key`, if set, is required as
/// `Authorization: Bearer <key>` on every route except `/api/health`
/// (spec §4.C: "A health endpoint is always open").
#[must_use]
pub fn router(backend: Arc<dyn MemoryBackend>, api_key: Option<String>) -> Router {
    let state = ServerState { backend, api_key };
    Router::new()
        .route("/api/memory/tree", get(get_tree))
        .route("/api/memory/entry/*path", get(read_entry).put(write_entry).delete(delete_entry))
        .route("/api/memory/search", get(search))
        .route("/api/health", get(health))
        .with_state(state)
        // placeholder routes kept as documented stubs until an S3 manager is wired in
        .route("/api/memory/backup", put(backup_stub))
        .route("/api/memory/restore", put(restore_stub))
}

fn authorize(state: &ServerState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.api_key else { return Ok(()) };
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err((StatusCode::UNAUTHORIZED, Json(json!({ "success": false, "error": "invalid or missing bearer token" }))).into_response()),
    }
}

#[derive(Deserialize)]
struct TreeQuery {
    prefix: Option<String>,
    #[serde(default = "default_depth")]
    depth: i64,
}

fn default_depth() -> i64 {
    -1
}

async fn get_tree(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(q): Query<TreeQuery>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let result = state.backend.get_tree(q.prefix.as_deref(), q.depth).await;
    Json(result).into_response()
}

async fn read_entry(State(state): State<ServerState>, headers: HeaderMap, AxumPath(path): AxumPath<String>) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    Json(state.backend.read(&path).await).into_response()
}

#[derive(Deserialize)]
struct WriteBody {
    content: String,
    metadata: Option<Value>,
}

async fn write_entry(
    State(state): State<ServerState>,
    headers: HeaderMap,
    AxumPath(path): AxumPath<String>,
    Json(body): Json<WriteBody>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    Json(state.backend.write(&path, &body.content, body.metadata).await).into_response()
}

async fn delete_entry(State(state): State<ServerState>, headers: HeaderMap, AxumPath(path): AxumPath<String>) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    Json(state.backend.delete(&path).await).into_response()
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    prefix: Option<String>,
}

async fn search(State(state): State<ServerState>, headers: HeaderMap, Query(q): Query<SearchQuery>) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let results = state.backend.search(&q.q, q.prefix.as_deref()).await;
    Json(json!({ "results": results })).into_response()
}

async fn health(State(state): State<ServerState>) -> Response {
    Json(state.backend.health_check().await).into_response()
}

async fn backup_stub(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({ "success": false, "error": "backup requires an S3 manager; none configured on this server" })),
    )
        .into_response()
}

async fn restore_stub(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({ "success": false, "error": "restore requires an S3 manager; none configured on this server" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::FilesystemMemoryBackend;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_is_open_without_bearer_token() {
        let tmp = tempfile::tempdir().unwrap();
        let backend: Arc<dyn MemoryBackend> = Arc::new(FilesystemMemoryBackend::new(tmp.path()).await.unwrap());
        let app = router(backend, Some("secret".to_string()));

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn other_routes_require_bearer_token() {
        let tmp = tempfile::tempdir().unwrap();
        let backend: Arc<dyn MemoryBackend> = Arc::new(FilesystemMemoryBackend::new(tmp.path()).await.unwrap());
        let app = router(backend, Some("secret".to_string()));

        let response = app
            .oneshot(Request::builder().uri("/api/memory/tree").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
