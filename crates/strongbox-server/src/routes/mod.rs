//! Route construction.

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub mod kv;
pub mod sys;
pub mod token;

/// Build the full `/v1` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/v1/sys", sys::router())
        .nest("/v1/kv", kv::router())
        .nest("/v1/auth/token", token::router())
}
