//! Access tokens: bearer credentials for tenant clients.
//!
//! Tokens live at `auth/tokens/<reference_id>` inside the barrier. Both
//! ids are 20-character strings: the id (`kt…`) carries 13 random bytes
//! base64url-encoded, the reference id (`kr…`) is an FNV-1a digest of
//! those bytes rendered in decimal. Because the reference id derives
//! deterministically from the id, lookup by either resolves the same
//! storage row, and the bearer credential itself is never a storage key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::acl::Acl;
use crate::barrier::{Barrier, Item};
use crate::crypto::{self, CipherKind};
use crate::error::{AuthError, BarrierError, CryptoError};
use crate::hash::Hash;

/// Fixed length of token ids and reference ids.
pub const TOKEN_LENGTH: usize = 20;

/// Default validity window applied when a saved token has no expiry.
pub const TOKEN_DEFAULT_TTL_SECS: i64 = 3600;

const TOKEN_ID_PREFIX: &str = "kt";
const TOKEN_REFERENCE_ID_PREFIX: &str = "kr";
const AUTH_TOKENS_PREFIX: &str = "auth/tokens/";

/// A bearer token bound to ACLs and a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AccessToken {
    /// 20-character bearer id, prefix `kt`.
    pub id: String,
    /// 20-character storage id, prefix `kr`; derived from `id`.
    pub reference_id: String,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Start of the validity window, unix seconds; 0 = immediately.
    pub enabled_at: i64,
    /// End of the validity window, unix seconds; 0 = defaulted on save.
    pub expires_at: i64,
    /// Paths and permissions this token grants.
    pub acls: Vec<Acl>,
    /// Tenant namespace all KV operations are scoped to.
    pub namespace: String,
    /// Free-form annotations.
    pub metadata: HashMap<String, String>,
}

/// Issues, persists, validates, renews, and revokes access tokens.
pub struct TokenManager {
    barrier: Arc<Barrier>,
}

impl TokenManager {
    /// Create a token manager over the given barrier.
    #[must_use]
    pub fn new(barrier: Arc<Barrier>) -> Self {
        Self { barrier }
    }

    /// Create a token with fresh ids and empty grants. Nothing is
    /// persisted until [`save`](TokenManager::save).
    #[must_use]
    pub fn new_token(&self) -> AccessToken {
        let random = crypto::generate_key(CipherKind::Aes256Gcm);
        let hash = Hash::from_bytes(&random[..13]);

        AccessToken {
            id: format!("{TOKEN_ID_PREFIX}{}", hash.base64url()),
            reference_id: reference_id_for(&hash),
            created_at: Utc::now().timestamp(),
            ..AccessToken::default()
        }
    }

    /// Check the token's validity window.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenNotActiveYet`] before `enabled_at`.
    /// - [`AuthError::TokenNotFound`] after `expires_at`; expired tokens
    ///   are indistinguishable from missing ones.
    pub fn is_token_valid(&self, token: &AccessToken) -> Result<(), AuthError> {
        let now = Utc::now().timestamp();

        if now < token.enabled_at {
            return Err(AuthError::TokenNotActiveYet);
        }
        if now > token.expires_at {
            return Err(AuthError::TokenNotFound);
        }

        Ok(())
    }

    /// Persist a token through the barrier, defaulting its expiry to one
    /// hour from now when unset.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenInvalid`] for malformed ids.
    pub async fn save(&self, token: &mut AccessToken) -> Result<(), AuthError> {
        if token.id.len() != TOKEN_LENGTH || token.reference_id.len() != TOKEN_LENGTH {
            return Err(AuthError::TokenInvalid);
        }

        if token.expires_at <= 0 {
            token.expires_at = Utc::now().timestamp() + TOKEN_DEFAULT_TTL_SECS;
        }

        let raw = serde_json::to_vec(&token).map_err(|e| {
            AuthError::Barrier(BarrierError::Crypto(CryptoError::Serialization {
                reason: e.to_string(),
            }))
        })?;

        let item = Item {
            key: format!("{AUTH_TOKENS_PREFIX}{}", token.reference_id),
            raw: Some(raw),
            ..Item::default()
        };

        self.barrier.put(&item).await?;
        Ok(())
    }

    /// Look up a token by its bearer id and validate it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenInvalid`] for a malformed id.
    /// - [`AuthError::TokenNotFound`] for missing or expired tokens.
    pub async fn get(&self, id: &str) -> Result<AccessToken, AuthError> {
        if id.len() != TOKEN_LENGTH {
            return Err(AuthError::TokenInvalid);
        }

        self.get_by_reference_id(&reference_id_from_id(id)).await
    }

    /// Look up a token by its reference id and validate it.
    ///
    /// # Errors
    ///
    /// Same as [`get`](TokenManager::get).
    pub async fn get_by_reference_id(&self, reference_id: &str) -> Result<AccessToken, AuthError> {
        if reference_id.len() != TOKEN_LENGTH {
            return Err(AuthError::TokenInvalid);
        }

        let item = match self
            .barrier
            .get(&format!("{AUTH_TOKENS_PREFIX}{reference_id}"))
            .await
        {
            Ok(item) => item,
            Err(BarrierError::NotFound { .. }) => return Err(AuthError::TokenNotFound),
            Err(e) => return Err(e.into()),
        };

        let raw = item.raw.ok_or(AuthError::TokenInvalid)?;
        let token: AccessToken =
            serde_json::from_slice(&raw).map_err(|_| AuthError::TokenInvalid)?;

        self.is_token_valid(&token)?;
        Ok(token)
    }

    /// Delete a token by its bearer id.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenInvalid`] for a malformed id.
    pub async fn revoke(&self, id: &str) -> Result<(), AuthError> {
        if id.len() != TOKEN_LENGTH {
            return Err(AuthError::TokenInvalid);
        }

        self.revoke_by_reference_id(&reference_id_from_id(id)).await
    }

    /// Delete a token by its reference id. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenInvalid`] for a malformed id.
    pub async fn revoke_by_reference_id(&self, reference_id: &str) -> Result<(), AuthError> {
        if reference_id.len() != TOKEN_LENGTH {
            return Err(AuthError::TokenInvalid);
        }

        self.barrier
            .delete(&format!("{AUTH_TOKENS_PREFIX}{reference_id}"))
            .await?;
        Ok(())
    }

    /// Extend a token's expiry to `new_ttl_secs` from now, by bearer id.
    ///
    /// # Errors
    ///
    /// Same as [`renew_by_reference_id`](TokenManager::renew_by_reference_id).
    pub async fn renew(&self, id: &str, new_ttl_secs: i64) -> Result<AccessToken, AuthError> {
        if id.len() != TOKEN_LENGTH {
            return Err(AuthError::TokenInvalid);
        }

        self.renew_by_reference_id(&reference_id_from_id(id), new_ttl_secs)
            .await
    }

    /// Extend a token's expiry to `new_ttl_secs` from now.
    ///
    /// When the backend advertises distributed locking the read-modify-
    /// write runs under a per-key lock, released on every exit path.
    /// Without it, renewal is last-writer-wins.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenInvalid`] for a malformed id.
    /// - [`AuthError::TokenNotFound`] for missing or expired tokens.
    pub async fn renew_by_reference_id(
        &self,
        reference_id: &str,
        new_ttl_secs: i64,
    ) -> Result<AccessToken, AuthError> {
        if reference_id.len() != TOKEN_LENGTH {
            return Err(AuthError::TokenInvalid);
        }

        let lock = self
            .barrier
            .lock_key(&format!("{AUTH_TOKENS_PREFIX}{reference_id}"))
            .await?;

        if let Some(lock) = &lock {
            lock.lock().await.map_err(BarrierError::Backend)?;
        }

        let result = self.renew_locked(reference_id, new_ttl_secs).await;

        if let Some(lock) = &lock {
            let _ = lock.unlock().await;
        }

        result
    }

    async fn renew_locked(
        &self,
        reference_id: &str,
        new_ttl_secs: i64,
    ) -> Result<AccessToken, AuthError> {
        let mut token = self.get_by_reference_id(reference_id).await?;
        token.expires_at = Utc::now().timestamp() + new_ttl_secs;
        self.save(&mut token).await?;
        Ok(token)
    }

    /// Delete every expired token under the token prefix.
    ///
    /// Per-entry failures do not abort the walk.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Barrier`] only when the initial listing fails.
    pub async fn prune_expired(&self) -> Result<(), AuthError> {
        let references = self.barrier.list(AUTH_TOKENS_PREFIX).await?;

        for reference_id in references {
            match self.get_by_reference_id(&reference_id).await {
                Err(AuthError::TokenNotFound) => {
                    debug!(reference_id = %reference_id, "pruning expired token");
                    let _ = self.revoke_by_reference_id(&reference_id).await;
                }
                // Still valid, not yet active, or transiently unreadable —
                // leave it alone and keep walking.
                _ => {}
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager").finish_non_exhaustive()
    }
}

/// Derive the reference id from a bearer id by decoding its base64url
/// tail and rehashing. A malformed tail decodes to an empty hash, whose
/// reference id matches no stored token.
fn reference_id_from_id(id: &str) -> String {
    let hash = Hash::from_base64url(&id[TOKEN_ID_PREFIX.len()..]);
    reference_id_for(&hash)
}

fn reference_id_for(hash: &Hash) -> String {
    let digits = TOKEN_LENGTH - TOKEN_REFERENCE_ID_PREFIX.len();
    let mut decimal = format!("{:0>width$}", hash.uint64_string(), width = digits);
    decimal.truncate(digits);
    format!("{TOKEN_REFERENCE_ID_PREFIX}{decimal}")
}
