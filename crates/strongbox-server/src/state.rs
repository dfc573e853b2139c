//! Shared application state.

use std::sync::Arc;

use strongbox_core::gatekeeper::Gatekeeper;

/// State shared across all HTTP handlers via `Arc`.
pub struct AppState {
    /// The security kernel's orchestration layer.
    pub gatekeeper: Arc<Gatekeeper>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
