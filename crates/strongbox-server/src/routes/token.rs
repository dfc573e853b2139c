//! Access-token lifecycle routes: lookup, renew, revoke.
//!
//! Each accepts a token id or reference id in the body, falling back to
//! the request's bearer token when neither is given.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use strongbox_core::token::{AccessToken, TOKEN_DEFAULT_TTL_SECS};

use crate::auth::bearer_token_id;
use crate::error::AppError;
use crate::state::AppState;
use crate::ttl::parse_ttl;

/// Build the `/v1/auth/token` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lookup", post(lookup))
        .route("/renew", post(renew))
        .route("/revoke", post(revoke))
}

// ── Request / response messages ──────────────────────────────────────

/// Token selector shared by the lookup and revoke requests.
#[derive(Debug, Default, Deserialize)]
pub struct TokenSelector {
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub token_reference_id: String,
}

/// Request body for `POST /v1/auth/token/renew`.
#[derive(Debug, Default, Deserialize)]
pub struct RenewRequest {
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub token_reference_id: String,
    /// TTL string such as `"1h"`, `"5m"`, or `"300"`; defaults to one
    /// hour.
    #[serde(default)]
    pub ttl: String,
}

/// Response carrying a token.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: AccessToken,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Look up a token by id, reference id, or the bearer credential.
async fn lookup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TokenSelector>,
) -> Result<Json<TokenResponse>, AppError> {
    let manager = state.gatekeeper.token_manager();

    let token = if !body.token_id.is_empty() {
        manager.get(&body.token_id).await?
    } else if !body.token_reference_id.is_empty() {
        manager.get_by_reference_id(&body.token_reference_id).await?
    } else {
        manager.get(&bearer_token_id(&headers)?).await?
    };

    Ok(Json(TokenResponse { token }))
}

/// Renew a token, extending its expiry by the requested TTL.
async fn renew(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RenewRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let ttl_secs = if body.ttl.is_empty() {
        TOKEN_DEFAULT_TTL_SECS
    } else {
        parse_ttl(&body.ttl)?
    };

    let manager = state.gatekeeper.token_manager();

    let token = if !body.token_id.is_empty() {
        manager.renew(&body.token_id, ttl_secs).await?
    } else if !body.token_reference_id.is_empty() {
        manager
            .renew_by_reference_id(&body.token_reference_id, ttl_secs)
            .await?
    } else {
        manager.renew(&bearer_token_id(&headers)?, ttl_secs).await?
    };

    Ok(Json(TokenResponse { token }))
}

/// Revoke a token immediately.
async fn revoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TokenSelector>,
) -> Result<Json<serde_json::Value>, AppError> {
    let manager = state.gatekeeper.token_manager();

    if !body.token_id.is_empty() {
        manager.revoke(&body.token_id).await?;
    } else if !body.token_reference_id.is_empty() {
        manager
            .revoke_by_reference_id(&body.token_reference_id)
            .await?;
    } else {
        manager.revoke(&bearer_token_id(&headers)?).await?;
    }

    Ok(Json(serde_json::json!({})))
}
