//! System routes: initialization, seal lifecycle, rotations, and
//! maintenance. Every handler is a thin mapping onto the gatekeeper.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use strongbox_core::acl::Acl;
use strongbox_core::token::AccessToken;

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/sys` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/init", post(init))
        .route("/seal", post(seal))
        .route("/unseal", post(unseal))
        .route("/status", get(status))
        .route("/generate-gatekeeper-token", post(generate_gatekeeper_token))
        .route("/generate-access-token", post(generate_access_token))
        .route("/revoke-gatekeeper-token", post(revoke_gatekeeper_token))
        .route("/rotate-encryption-key", post(rotate_encryption_key))
        .route("/rotate-gatekeeper-token", post(rotate_gatekeeper_token))
        .route("/rotate-unseal-keys", post(rotate_unseal_keys))
        .route("/rotate-access-key", post(rotate_access_key))
        .route("/prune-tokens", post(prune_tokens))
}

// ── Request / response messages ──────────────────────────────────────

/// Request body for `POST /v1/sys/init`.
#[derive(Debug, Default, Deserialize)]
pub struct InitRequest {
    /// Number of unseal key shares to generate.
    #[serde(default)]
    pub num_unseal_keys: usize,
    /// Shares required to reconstruct the gatekeeper key.
    #[serde(default)]
    pub unseal_key_threshold: usize,
    /// Also mint a gatekeeper token from the fresh shares.
    #[serde(default)]
    pub generate_gatekeeper_token: bool,
}

/// Response body for `POST /v1/sys/init`.
#[derive(Debug, Serialize)]
pub struct InitResponse {
    /// Base64url unseal key shares — shown once, never stored.
    pub unseal_keys: Vec<String>,
    /// The initial access key — shown once, stored only inside the
    /// barrier.
    pub access_key: String,
    /// Optional gatekeeper token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gatekeeper_token: Option<String>,
}

/// Request body for `POST /v1/sys/seal`.
#[derive(Debug, Deserialize)]
pub struct SealRequest {
    pub gatekeeper_token: String,
    #[serde(default)]
    pub renew: bool,
}

/// Request body for `POST /v1/sys/unseal`.
#[derive(Debug, Default, Deserialize)]
pub struct UnsealRequest {
    #[serde(default)]
    pub gatekeeper_token: String,
    #[serde(default)]
    pub renew_gatekeeper_token: bool,
    #[serde(default)]
    pub unseal_keys: Vec<String>,
}

/// Response body for seal/unseal.
#[derive(Debug, Serialize)]
pub struct SealStateResponse {
    pub sealed: bool,
}

/// Response body for `GET /v1/sys/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub initialized: bool,
    pub sealed: bool,
    pub server_timestamp: i64,
}

/// Request body for `POST /v1/sys/generate-gatekeeper-token`.
#[derive(Debug, Deserialize)]
pub struct GenerateGatekeeperTokenRequest {
    pub unseal_keys: Vec<String>,
}

/// Response carrying a gatekeeper token.
#[derive(Debug, Serialize)]
pub struct GatekeeperTokenResponse {
    pub gatekeeper_token: String,
}

/// Request body for `POST /v1/sys/generate-access-token`.
#[derive(Debug, Deserialize)]
pub struct GenerateAccessTokenRequest {
    pub access_key: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub enabled_at: i64,
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub acls: Vec<Acl>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Response carrying an access token.
#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub token: AccessToken,
}

/// Request body for `POST /v1/sys/revoke-gatekeeper-token`.
#[derive(Debug, Deserialize)]
pub struct RevokeGatekeeperTokenRequest {
    pub gatekeeper_token: String,
}

/// Request body for `POST /v1/sys/rotate-encryption-key`.
#[derive(Debug, Deserialize)]
pub struct RotateEncryptionKeyRequest {
    pub gatekeeper_token: String,
    #[serde(default)]
    pub renew: bool,
}

/// Request body for `POST /v1/sys/rotate-gatekeeper-token`.
#[derive(Debug, Deserialize)]
pub struct RotateGatekeeperTokenRequest {
    pub gatekeeper_token: String,
}

/// Request body for `POST /v1/sys/rotate-unseal-keys`.
#[derive(Debug, Deserialize)]
pub struct RotateUnsealKeysRequest {
    pub unseal_keys: Vec<String>,
    pub num_unseal_keys: usize,
    pub unseal_key_threshold: usize,
}

/// Response body for `POST /v1/sys/rotate-unseal-keys`.
#[derive(Debug, Serialize)]
pub struct RotateUnsealKeysResponse {
    pub unseal_keys: Vec<String>,
}

/// Request body for `POST /v1/sys/rotate-access-key`.
#[derive(Debug, Deserialize)]
pub struct RotateAccessKeyRequest {
    pub access_key: String,
}

/// Response body for `POST /v1/sys/rotate-access-key`.
#[derive(Debug, Serialize)]
pub struct RotateAccessKeyResponse {
    pub access_key: String,
}

/// Request body for `POST /v1/sys/prune-tokens`.
#[derive(Debug, Deserialize)]
pub struct PruneTokensRequest {
    pub access_key: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Initialize the barrier. Defaults to 5 shares with a threshold of 3
/// when both parameters are zero.
async fn init(
    State(state): State<Arc<AppState>>,
    Json(mut body): Json<InitRequest>,
) -> Result<Json<InitResponse>, AppError> {
    if body.num_unseal_keys == 0 && body.unseal_key_threshold == 0 {
        body.num_unseal_keys = 5;
        body.unseal_key_threshold = 3;
    }

    let (unseal_keys, access_key) = state
        .gatekeeper
        .initialize_barrier(body.num_unseal_keys, body.unseal_key_threshold)
        .await?;

    let gatekeeper_token = if body.generate_gatekeeper_token {
        Some(
            state
                .gatekeeper
                .generate_gatekeeper_token_from_unseal_keys(&unseal_keys)
                .await?,
        )
    } else {
        None
    };

    Ok(Json(InitResponse {
        unseal_keys,
        access_key,
        gatekeeper_token,
    }))
}

/// Seal the barrier with a gatekeeper token.
async fn seal(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SealRequest>,
) -> Result<Json<SealStateResponse>, AppError> {
    state
        .gatekeeper
        .seal_with_gatekeeper_token(&body.gatekeeper_token, body.renew)
        .await?;
    Ok(Json(SealStateResponse { sealed: true }))
}

/// Unseal the barrier with either a gatekeeper token or a set of unseal
/// keys.
async fn unseal(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UnsealRequest>,
) -> Result<Json<SealStateResponse>, AppError> {
    if !body.gatekeeper_token.is_empty() {
        state
            .gatekeeper
            .unseal_with_gatekeeper_token(&body.gatekeeper_token, body.renew_gatekeeper_token)
            .await?;
    } else {
        if body.unseal_keys.len() < 2 || body.unseal_keys.len() > 255 {
            return Err(AppError::bad_request("must provide at least 2 unseal keys"));
        }
        state
            .gatekeeper
            .unseal_with_unseal_keys(&body.unseal_keys)
            .await?;
    }

    Ok(Json(SealStateResponse { sealed: false }))
}

/// Report initialization and seal state.
async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let initialized = state.gatekeeper.barrier().is_initialized().await?;
    let sealed = if initialized {
        state.gatekeeper.barrier().is_sealed().await?
    } else {
        true
    };

    Ok(Json(StatusResponse {
        initialized,
        sealed,
        server_timestamp: now_unix(),
    }))
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// Mint a gatekeeper token from a valid unseal key set.
async fn generate_gatekeeper_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateGatekeeperTokenRequest>,
) -> Result<Json<GatekeeperTokenResponse>, AppError> {
    let gatekeeper_token = state
        .gatekeeper
        .generate_gatekeeper_token_from_unseal_keys(&body.unseal_keys)
        .await?;
    Ok(Json(GatekeeperTokenResponse { gatekeeper_token }))
}

/// Mint and persist an access token, authorized by the access key.
async fn generate_access_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateAccessTokenRequest>,
) -> Result<Json<AccessTokenResponse>, AppError> {
    let mut token = state.gatekeeper.new_token();
    token.namespace = body.namespace;
    token.enabled_at = body.enabled_at;
    token.expires_at = body.expires_at;
    token.acls = body.acls;
    token.metadata = body.metadata;

    state
        .gatekeeper
        .save_access_token_with_access_key(&body.access_key, &mut token)
        .await?;

    Ok(Json(AccessTokenResponse { token }))
}

/// Revoke a gatekeeper token.
async fn revoke_gatekeeper_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RevokeGatekeeperTokenRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .gatekeeper
        .revoke_gatekeeper_token(&body.gatekeeper_token)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// Rotate the barrier's active encryption key.
async fn rotate_encryption_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RotateEncryptionKeyRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .gatekeeper
        .rotate_encryption_key_with_gatekeeper_token(&body.gatekeeper_token, body.renew)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// Exchange a gatekeeper token for a fresh one.
async fn rotate_gatekeeper_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RotateGatekeeperTokenRequest>,
) -> Result<Json<GatekeeperTokenResponse>, AppError> {
    let gatekeeper_token = state
        .gatekeeper
        .rotate_gatekeeper_token(&body.gatekeeper_token)
        .await?;
    Ok(Json(GatekeeperTokenResponse { gatekeeper_token }))
}

/// Replace the unseal key set.
async fn rotate_unseal_keys(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RotateUnsealKeysRequest>,
) -> Result<Json<RotateUnsealKeysResponse>, AppError> {
    let unseal_keys = state
        .gatekeeper
        .rotate_unseal_keys(
            &body.unseal_keys,
            body.num_unseal_keys,
            body.unseal_key_threshold,
        )
        .await?;
    Ok(Json(RotateUnsealKeysResponse { unseal_keys }))
}

/// Rotate the access key, authorized by the current one.
async fn rotate_access_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RotateAccessKeyRequest>,
) -> Result<Json<RotateAccessKeyResponse>, AppError> {
    let access_key = state.gatekeeper.rotate_access_key(&body.access_key).await?;
    Ok(Json(RotateAccessKeyResponse { access_key }))
}

/// Remove expired access tokens, authorized by the access key.
async fn prune_tokens(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PruneTokensRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.gatekeeper.compare_access_key(&body.access_key).await?;
    state.gatekeeper.token_manager().prune_expired().await?;
    Ok(Json(serde_json::json!({})))
}
