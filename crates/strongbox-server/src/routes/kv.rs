//! Namespaced KV routes. Every operation authorizes the bearer token's
//! ACLs against the target path, then scopes the operation to the
//! token's namespace.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use strongbox_core::acl::Permission;
use strongbox_core::barrier::Item;

use crate::auth::can_token;
use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/kv` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/list", post(list))
        .route("/get", post(get))
        .route("/put", post(put))
        .route("/delete", post(delete))
}

// ── Request / response messages ──────────────────────────────────────

/// Request body for `POST /v1/kv/list`, `/get`, and `/delete`.
#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

/// Response body for `POST /v1/kv/list`.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub paths: Vec<String>,
}

/// Response body for `POST /v1/kv/get`.
#[derive(Debug, Serialize)]
pub struct GetResponse {
    pub item: Item,
}

/// Request body for `POST /v1/kv/put`.
#[derive(Debug, Deserialize)]
pub struct PutRequest {
    pub item: Item,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// List the next path segments under a path.
async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PathRequest>,
) -> Result<Json<ListResponse>, AppError> {
    let token = can_token(&state, &headers, Permission::List, &body.path).await?;

    let paths = state
        .gatekeeper
        .kv()
        .list(&token.namespace, &body.path)
        .await?;
    Ok(Json(ListResponse { paths }))
}

/// Read an item.
async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PathRequest>,
) -> Result<Json<GetResponse>, AppError> {
    let token = can_token(&state, &headers, Permission::Read, &body.path).await?;

    let item = state
        .gatekeeper
        .kv()
        .get(&token.namespace, &body.path)
        .await?;
    Ok(Json(GetResponse { item }))
}

/// Write an item.
async fn put(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PutRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = can_token(&state, &headers, Permission::Update, &body.item.key).await?;

    state
        .gatekeeper
        .kv()
        .put(&token.namespace, &body.item)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// Delete an item.
async fn delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PathRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = can_token(&state, &headers, Permission::Delete, &body.path).await?;

    state
        .gatekeeper
        .kv()
        .delete(&token.namespace, &body.path)
        .await?;
    Ok(Json(serde_json::json!({})))
}
