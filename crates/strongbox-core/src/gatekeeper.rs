//! Custody of the gatekeeper key and the credentials that stand in for it.
//!
//! The gatekeeper is the only component that handles the gatekeeper
//! (master) key in plaintext outside an unseal call, and it never holds
//! it longer than one operation. The key reaches the process three ways:
//!
//! - **Unseal key shares** — T-of-N shards handed to operators at
//!   initialization; combined on demand.
//! - **Gatekeeper tokens** — short-lived bearer credentials wrapping the
//!   key, derived from a random nonce and the barrier identity. Single
//!   use unless explicitly renewed.
//! - **The access key** — a long-lived administrative secret stored
//!   inside the barrier, authorizing token issuance and maintenance, not
//!   unsealing.
//!
//! Gatekeeper token records live *outside* the barrier (they must be
//! readable while sealed); everything else the gatekeeper persists goes
//! through the barrier.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use subtle::ConstantTimeEq;
use tracing::info;
use zeroize::Zeroizing;

use strongbox_storage::{BackendRecord, Storage};

use crate::acl::AclManager;
use crate::barrier::{Barrier, Item};
use crate::crypto::{self, CipherKind};
use crate::error::{BarrierError, GatekeeperError};
use crate::hash::{self, Hash};
use crate::kv::Kv;
use crate::shamir;
use crate::token::{AccessToken, TokenManager};

const GATEKEEPER_TOKENS_PREFIX: &str = "gatekeeper/tokens/";
const ACCESS_KEY_HASH_KEY: &str = "gatekeeper/accessKeyHash";

/// Length of a gatekeeper token with separators stripped.
const GATEKEEPER_TOKEN_LENGTH: usize = 32;

/// Length of the storage id derived from a token's KDF key.
const TOKEN_RECORD_ID_LENGTH: usize = 10;

/// Unseal key shares are base64url of a 33-byte share; tolerate a little
/// slack on either side.
const UNSEAL_KEY_MIN_LENGTH: usize = 42;
const UNSEAL_KEY_MAX_LENGTH: usize = 46;

/// Orchestrates initialization, unsealing, and credential lifecycles
/// around a [`Barrier`].
pub struct Gatekeeper {
    storage: Arc<dyn Storage>,
    barrier: Arc<Barrier>,
    tokens: TokenManager,
    acls: AclManager,
    kv: Kv,
}

impl Gatekeeper {
    /// Create a gatekeeper over the given backend and barrier.
    ///
    /// The backend must be the same one the barrier wraps: gatekeeper
    /// token records are written to it directly, outside the barrier.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, barrier: Arc<Barrier>) -> Self {
        let tokens = TokenManager::new(Arc::clone(&barrier));
        let kv = Kv::new(Arc::clone(&barrier));
        Self {
            storage,
            barrier,
            tokens,
            acls: AclManager::new(),
            kv,
        }
    }

    /// The underlying barrier.
    #[must_use]
    pub fn barrier(&self) -> &Arc<Barrier> {
        &self.barrier
    }

    /// The access-token manager.
    #[must_use]
    pub fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    /// The ACL evaluator.
    #[must_use]
    pub fn acl_manager(&self) -> &AclManager {
        &self.acls
    }

    /// The namespaced KV facade.
    #[must_use]
    pub fn kv(&self) -> &Kv {
        &self.kv
    }

    // ── Initialization ceremony ──────────────────────────────────────

    /// Initialize the barrier: generate a gatekeeper key, shard it into
    /// `parts` unseal keys with reconstruction threshold `threshold`,
    /// and persist the initial access key inside the barrier before it
    /// reseals.
    ///
    /// Returns `(unseal_keys, access_key)`. The barrier is left SEALED
    /// and the gatekeeper key is dropped before returning.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::AlreadyInitialized`] when already initialized.
    /// - [`GatekeeperError::Shamir`] for out-of-range parts/threshold.
    pub async fn initialize_barrier(
        &self,
        parts: usize,
        threshold: usize,
    ) -> Result<(Vec<String>, String), GatekeeperError> {
        if self.barrier.is_initialized().await? {
            return Err(BarrierError::AlreadyInitialized.into());
        }

        let gatekeeper_key = crypto::generate_key(CipherKind::Aes256Gcm);
        let unseal_keys = generate_unseal_keys(&gatekeeper_key, parts, threshold)?;

        let access_key = self
            .barrier
            .initialize(&gatekeeper_key, |writer| async move {
                let secret = crypto::generate_key(CipherKind::Aes256Gcm);
                let access_key = Hash::from_bytes(&secret[..]).base64url();

                let item = Item {
                    key: ACCESS_KEY_HASH_KEY.to_owned(),
                    raw: Some(access_key.clone().into_bytes()),
                    ..Item::default()
                };
                writer.put_item(&item).await?;

                Ok(access_key)
            })
            .await?;

        info!(parts, threshold, "barrier initialized by gatekeeper");
        Ok((unseal_keys, access_key))
    }

    // ── Unseal keys ──────────────────────────────────────────────────

    /// Shard `gatekeeper_key` into `parts` base64url shares.
    ///
    /// # Errors
    ///
    /// Returns [`GatekeeperError::Shamir`] for out-of-range arguments.
    pub fn generate_unseal_keys(
        &self,
        gatekeeper_key: &[u8],
        parts: usize,
        threshold: usize,
    ) -> Result<Vec<String>, GatekeeperError> {
        generate_unseal_keys(gatekeeper_key, parts, threshold)
    }

    /// Combine unseal keys and unseal the barrier.
    ///
    /// # Errors
    ///
    /// - [`GatekeeperError::InvalidUnsealKey`] for malformed shares.
    /// - [`BarrierError::InvalidGatekeeperKey`] when the reconstructed
    ///   key fails to authenticate the keychain (for example a
    ///   below-threshold share set).
    pub async fn unseal_with_unseal_keys(&self, keys: &[String]) -> Result<(), GatekeeperError> {
        let gatekeeper_key = master_key_from_unseal_keys(keys)?;
        Ok(self.barrier.unseal(&gatekeeper_key).await?)
    }

    /// Replace the unseal key set: validate the current shares, generate
    /// a fresh gatekeeper key and shares, re-encrypt the keychain, and
    /// revoke every outstanding gatekeeper token.
    ///
    /// # Errors
    ///
    /// - [`GatekeeperError::InvalidUnsealKey`] when the current shares do
    ///   not reconstruct the gatekeeper key.
    /// - [`BarrierError::Sealed`] unless the barrier is unsealed.
    pub async fn rotate_unseal_keys(
        &self,
        keys: &[String],
        parts: usize,
        threshold: usize,
    ) -> Result<Vec<String>, GatekeeperError> {
        let current = master_key_from_unseal_keys(keys)?;
        if self.barrier.validate_gatekeeper_key(&current).await.is_err() {
            return Err(GatekeeperError::InvalidUnsealKey);
        }

        let new_key = crypto::generate_key(CipherKind::Aes256Gcm);
        let new_shares = generate_unseal_keys(&new_key, parts, threshold)?;

        self.barrier.change_gatekeeper_key(&new_key).await?;
        self.revoke_all_gatekeeper_tokens().await?;

        info!(parts, threshold, "unseal keys rotated");
        Ok(new_shares)
    }

    // ── Gatekeeper tokens ────────────────────────────────────────────

    /// Generate a gatekeeper token wrapping the given gatekeeper key.
    ///
    /// The token is the only copy of the credential; the stored record
    /// holds the gatekeeper key encrypted under a key derived from the
    /// token and the barrier identity.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::NotInitialized`] before initialization.
    pub async fn generate_gatekeeper_token(
        &self,
        gatekeeper_key: &[u8],
    ) -> Result<String, GatekeeperError> {
        if !self.barrier.is_initialized().await? {
            return Err(BarrierError::NotInitialized.into());
        }

        let random = crypto::generate_key(CipherKind::Aes256Gcm);
        let mut token = Hash::from_bytes(&random[..]).base32();
        token.truncate(GATEKEEPER_TOKEN_LENGTH);

        let key_hash = self.key_hash_from_token(&token).await?;
        let encrypted = crypto::encrypt(CipherKind::Aes256Gcm, &key_hash, gatekeeper_key)?;

        self.storage
            .put(BackendRecord {
                key: token_record_key(&key_hash),
                encryption_key_id: 0,
                val: encrypted,
            })
            .await?;

        Ok(format_token(&token))
    }

    /// Generate a gatekeeper token from a valid unseal key set.
    ///
    /// # Errors
    ///
    /// Same as [`generate_gatekeeper_token`](Gatekeeper::generate_gatekeeper_token),
    /// plus [`GatekeeperError::InvalidUnsealKey`].
    pub async fn generate_gatekeeper_token_from_unseal_keys(
        &self,
        keys: &[String],
    ) -> Result<String, GatekeeperError> {
        let gatekeeper_key = master_key_from_unseal_keys(keys)?;
        self.generate_gatekeeper_token(&gatekeeper_key).await
    }

    /// Unseal the barrier with a gatekeeper token.
    ///
    /// Unless `renew` is set, the token record is deleted once the inner
    /// operation completes, success or failure. A validated token is
    /// spent by its use.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::Unsealed`] when already unsealed.
    /// - [`GatekeeperError::InvalidGatekeeperToken`] for malformed,
    ///   unknown, or undecryptable tokens.
    pub async fn unseal_with_gatekeeper_token(
        &self,
        gatekeeper_token: &str,
        renew: bool,
    ) -> Result<(), GatekeeperError> {
        if !self.barrier.is_sealed().await? {
            return Err(BarrierError::Unsealed.into());
        }

        let gatekeeper_key = self.master_key_from_token(gatekeeper_token).await?;
        let result = self
            .barrier
            .unseal(&gatekeeper_key)
            .await
            .map_err(GatekeeperError::from);

        if !renew {
            let _ = self.revoke_gatekeeper_token(gatekeeper_token).await;
        }
        result
    }

    /// Seal the barrier after validating a gatekeeper token.
    ///
    /// # Errors
    ///
    /// Returns [`GatekeeperError::InvalidGatekeeperToken`] for a bad
    /// token; sealing itself cannot fail.
    pub async fn seal_with_gatekeeper_token(
        &self,
        gatekeeper_token: &str,
        renew: bool,
    ) -> Result<(), GatekeeperError> {
        self.master_key_from_token(gatekeeper_token).await?;

        self.barrier.seal().await;

        if !renew {
            let _ = self.revoke_gatekeeper_token(gatekeeper_token).await;
        }
        Ok(())
    }

    /// Rotate the barrier's active encryption key with a gatekeeper
    /// token.
    ///
    /// # Errors
    ///
    /// - [`GatekeeperError::InvalidGatekeeperToken`] for a bad token.
    /// - [`BarrierError::Sealed`] unless the barrier is unsealed.
    pub async fn rotate_encryption_key_with_gatekeeper_token(
        &self,
        gatekeeper_token: &str,
        renew: bool,
    ) -> Result<(), GatekeeperError> {
        let gatekeeper_key = self.master_key_from_token(gatekeeper_token).await?;
        let result = self
            .barrier
            .rotate_encryption_key(&gatekeeper_key)
            .await
            .map_err(GatekeeperError::from);

        if !renew {
            let _ = self.revoke_gatekeeper_token(gatekeeper_token).await;
        }
        result
    }

    /// Exchange a valid gatekeeper token for a fresh one, revoking the
    /// old token regardless of outcome.
    ///
    /// # Errors
    ///
    /// Returns [`GatekeeperError::InvalidGatekeeperToken`] for a bad
    /// token.
    pub async fn rotate_gatekeeper_token(
        &self,
        gatekeeper_token: &str,
    ) -> Result<String, GatekeeperError> {
        let gatekeeper_key = self.master_key_from_token(gatekeeper_token).await?;

        let result = self.generate_gatekeeper_token(&gatekeeper_key).await;
        let _ = self.revoke_gatekeeper_token(gatekeeper_token).await;
        result
    }

    /// Delete a gatekeeper token's record, preventing further use.
    ///
    /// # Errors
    ///
    /// Returns [`GatekeeperError::InvalidGatekeeperToken`] for a
    /// malformed token.
    pub async fn revoke_gatekeeper_token(
        &self,
        gatekeeper_token: &str,
    ) -> Result<(), GatekeeperError> {
        let token = normalize_token(gatekeeper_token)?;
        let key_hash = self.key_hash_from_token(&token).await?;

        self.storage.delete(&token_record_key(&key_hash)).await?;
        Ok(())
    }

    /// Delete every gatekeeper token record.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn revoke_all_gatekeeper_tokens(&self) -> Result<(), GatekeeperError> {
        let records = self.storage.list(GATEKEEPER_TOKENS_PREFIX).await?;

        for record in records {
            self.storage
                .delete(&format!("{GATEKEEPER_TOKENS_PREFIX}{record}"))
                .await?;
        }

        info!("all gatekeeper tokens revoked");
        Ok(())
    }

    // ── Access key and access tokens ─────────────────────────────────

    /// Compare `access_key` against the stored access key in constant
    /// time.
    ///
    /// # Errors
    ///
    /// Returns [`GatekeeperError::InvalidAccessKey`] on mismatch and
    /// [`BarrierError::Sealed`] while sealed.
    pub async fn compare_access_key(&self, access_key: &str) -> Result<(), GatekeeperError> {
        let item = self.barrier.get_internal(ACCESS_KEY_HASH_KEY).await?;
        let stored = item.raw.ok_or(GatekeeperError::InvalidAccessKey)?;

        if bool::from(stored.as_slice().ct_eq(access_key.as_bytes())) {
            Ok(())
        } else {
            Err(GatekeeperError::InvalidAccessKey)
        }
    }

    /// Replace the access key after validating the current one.
    ///
    /// # Errors
    ///
    /// Returns [`GatekeeperError::InvalidAccessKey`] on mismatch.
    pub async fn rotate_access_key(&self, access_key: &str) -> Result<String, GatekeeperError> {
        self.compare_access_key(access_key).await?;
        self.generate_access_key().await
    }

    /// Replace the access key using a valid unseal key set: the
    /// recovery path when the access key is lost.
    ///
    /// # Errors
    ///
    /// Returns [`GatekeeperError::InvalidUnsealKey`] when the shares do
    /// not reconstruct the gatekeeper key.
    pub async fn rotate_access_key_with_unseal_keys(
        &self,
        unseal_keys: &[String],
    ) -> Result<String, GatekeeperError> {
        let gatekeeper_key = master_key_from_unseal_keys(unseal_keys)?;
        if self
            .barrier
            .validate_gatekeeper_key(&gatekeeper_key)
            .await
            .is_err()
        {
            return Err(GatekeeperError::InvalidUnsealKey);
        }

        self.generate_access_key().await
    }

    /// Create a fresh access token with ids assigned; not persisted.
    #[must_use]
    pub fn new_token(&self) -> AccessToken {
        self.tokens.new_token()
    }

    /// Persist an access token after validating the access key and the
    /// token's ACLs.
    ///
    /// # Errors
    ///
    /// - [`GatekeeperError::InvalidAccessKey`] on access-key mismatch.
    /// - [`AuthError::InvalidAcl`](crate::error::AuthError::InvalidAcl)
    ///   for malformed ACLs.
    pub async fn save_access_token_with_access_key(
        &self,
        access_key: &str,
        token: &mut AccessToken,
    ) -> Result<(), GatekeeperError> {
        self.compare_access_key(access_key).await?;
        self.acls.validate_acls(&token.acls)?;

        self.tokens.save(token).await?;
        Ok(())
    }

    async fn generate_access_key(&self) -> Result<String, GatekeeperError> {
        let secret = crypto::generate_key(CipherKind::Aes256Gcm);
        let access_key = Hash::from_bytes(&secret[..]).base64url();

        let item = Item {
            key: ACCESS_KEY_HASH_KEY.to_owned(),
            raw: Some(access_key.clone().into_bytes()),
            ..Item::default()
        };
        self.barrier.put_internal(&item).await?;

        info!("access key rotated");
        Ok(access_key)
    }

    // ── Token derivation ─────────────────────────────────────────────

    /// Recover the gatekeeper key wrapped by a token.
    ///
    /// Lookup misses and AEAD failures are deliberately indistinguishable.
    async fn master_key_from_token(
        &self,
        gatekeeper_token: &str,
    ) -> Result<Zeroizing<Vec<u8>>, GatekeeperError> {
        if !self.barrier.is_initialized().await? {
            return Err(BarrierError::NotInitialized.into());
        }

        let token = normalize_token(gatekeeper_token)?;
        let key_hash = self.key_hash_from_token(&token).await?;

        let record = self
            .storage
            .get(&token_record_key(&key_hash))
            .await?
            .ok_or(GatekeeperError::InvalidGatekeeperToken)?;

        let gatekeeper_key = crypto::decrypt(CipherKind::Aes256Gcm, &key_hash, &record.val)
            .map_err(|_| GatekeeperError::InvalidGatekeeperToken)?;

        Ok(Zeroizing::new(gatekeeper_key))
    }

    /// Derive a token's KDF key: `sha256(token || base64url(barrier_id))`.
    async fn key_hash_from_token(
        &self,
        token: &str,
    ) -> Result<Zeroizing<Vec<u8>>, GatekeeperError> {
        let barrier_id = self.barrier.id().await?;

        let mut key_string = String::with_capacity(token.len() + 43);
        key_string.push_str(token);
        key_string.push_str(&barrier_id.base64url());

        Ok(Zeroizing::new(hash::sha256_bytes(key_string.as_bytes())))
    }
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper").finish_non_exhaustive()
    }
}

/// Storage key for a token record: the first ten base32 characters of
/// the KDF key.
fn token_record_key(key_hash: &[u8]) -> String {
    let mut record_id = Hash::from_bytes(key_hash).base32();
    record_id.truncate(TOKEN_RECORD_ID_LENGTH);
    format!("{GATEKEEPER_TOKENS_PREFIX}{record_id}")
}

/// Strip separators and insist on the canonical 32-character form.
fn normalize_token(gatekeeper_token: &str) -> Result<String, GatekeeperError> {
    let token = gatekeeper_token.replace('-', "");
    if token.len() != GATEKEEPER_TOKEN_LENGTH {
        return Err(GatekeeperError::InvalidGatekeeperToken);
    }
    Ok(token)
}

/// Render a raw token in `xxxx-xxxx-…` groups of four.
fn format_token(token: &str) -> String {
    let mut formatted = String::with_capacity(token.len() + token.len() / 4);
    for (index, ch) in token.chars().enumerate() {
        if index > 0 && index % 4 == 0 {
            formatted.push('-');
        }
        formatted.push(ch);
    }
    formatted
}

fn generate_unseal_keys(
    gatekeeper_key: &[u8],
    parts: usize,
    threshold: usize,
) -> Result<Vec<String>, GatekeeperError> {
    let shares = shamir::split(gatekeeper_key, parts, threshold)?;
    Ok(shares
        .iter()
        .map(|share| URL_SAFE_NO_PAD.encode(share))
        .collect())
}

fn master_key_from_unseal_keys(keys: &[String]) -> Result<Zeroizing<Vec<u8>>, GatekeeperError> {
    let mut shares = Vec::with_capacity(keys.len());
    for key in keys {
        if key.len() < UNSEAL_KEY_MIN_LENGTH || key.len() > UNSEAL_KEY_MAX_LENGTH {
            return Err(GatekeeperError::InvalidUnsealKey);
        }
        let share = URL_SAFE_NO_PAD
            .decode(key)
            .map_err(|_| GatekeeperError::InvalidUnsealKey)?;
        shares.push(share);
    }

    shamir::combine(&shares).map_err(|_| GatekeeperError::InvalidUnsealKey)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strongbox_storage::MemoryStorage;

    fn make_gatekeeper() -> Gatekeeper {
        let storage = Arc::new(MemoryStorage::new()) as Arc<dyn Storage>;
        let barrier = Arc::new(Barrier::new(Arc::clone(&storage)));
        Gatekeeper::new(storage, barrier)
    }

    async fn initialized() -> (Gatekeeper, Vec<String>, String) {
        let gatekeeper = make_gatekeeper();
        let (unseal_keys, access_key) = gatekeeper.initialize_barrier(5, 3).await.unwrap();
        (gatekeeper, unseal_keys, access_key)
    }

    #[tokio::test]
    async fn initialize_returns_shares_and_access_key() {
        let (gatekeeper, unseal_keys, access_key) = initialized().await;

        assert_eq!(unseal_keys.len(), 5);
        for key in &unseal_keys {
            assert!((UNSEAL_KEY_MIN_LENGTH..=UNSEAL_KEY_MAX_LENGTH).contains(&key.len()));
        }
        assert!(!access_key.is_empty());
        assert!(gatekeeper.barrier().is_sealed().await.unwrap());
    }

    #[tokio::test]
    async fn initialize_twice_fails() {
        let (gatekeeper, _, _) = initialized().await;
        let result = gatekeeper.initialize_barrier(5, 3).await;
        assert!(matches!(
            result,
            Err(GatekeeperError::Barrier(BarrierError::AlreadyInitialized))
        ));
    }

    #[tokio::test]
    async fn initialize_rejects_bad_shamir_arguments() {
        let gatekeeper = make_gatekeeper();
        let result = gatekeeper.initialize_barrier(1, 1).await;
        assert!(matches!(result, Err(GatekeeperError::Shamir(_))));

        // A failed split must leave the barrier uninitialized.
        assert!(!gatekeeper.barrier().is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn unseal_with_threshold_shares() {
        let (gatekeeper, unseal_keys, _) = initialized().await;

        gatekeeper
            .unseal_with_unseal_keys(&unseal_keys[..3])
            .await
            .unwrap();
        assert!(!gatekeeper.barrier().is_sealed().await.unwrap());
    }

    #[tokio::test]
    async fn unseal_below_threshold_fails() {
        let (gatekeeper, unseal_keys, _) = initialized().await;

        let result = gatekeeper.unseal_with_unseal_keys(&unseal_keys[..2]).await;
        assert!(matches!(
            result,
            Err(GatekeeperError::Barrier(BarrierError::InvalidGatekeeperKey))
        ));
        assert!(gatekeeper.barrier().is_sealed().await.unwrap());
    }

    #[tokio::test]
    async fn unseal_rejects_malformed_shares() {
        let (gatekeeper, _, _) = initialized().await;

        let result = gatekeeper
            .unseal_with_unseal_keys(&["too-short".to_owned(), "also-short".to_owned()])
            .await;
        assert!(matches!(result, Err(GatekeeperError::InvalidUnsealKey)));

        let not_base64 = "!".repeat(44);
        let result = gatekeeper
            .unseal_with_unseal_keys(&[not_base64.clone(), not_base64])
            .await;
        assert!(matches!(result, Err(GatekeeperError::InvalidUnsealKey)));
    }

    #[tokio::test]
    async fn gatekeeper_token_roundtrip() {
        let (gatekeeper, unseal_keys, _) = initialized().await;

        let token = gatekeeper
            .generate_gatekeeper_token_from_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        // 32 base32 characters shown in groups of four.
        assert_eq!(token.len(), 39);
        assert_eq!(token.matches('-').count(), 7);

        gatekeeper
            .unseal_with_gatekeeper_token(&token, true)
            .await
            .unwrap();
        assert!(!gatekeeper.barrier().is_sealed().await.unwrap());
    }

    #[tokio::test]
    async fn gatekeeper_token_accepted_without_separators() {
        let (gatekeeper, unseal_keys, _) = initialized().await;

        let token = gatekeeper
            .generate_gatekeeper_token_from_unseal_keys(&unseal_keys)
            .await
            .unwrap();
        let bare = token.replace('-', "");

        gatekeeper
            .unseal_with_gatekeeper_token(&bare, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_renewed_token_is_single_use() {
        let (gatekeeper, unseal_keys, _) = initialized().await;

        let token = gatekeeper
            .generate_gatekeeper_token_from_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        gatekeeper
            .unseal_with_gatekeeper_token(&token, false)
            .await
            .unwrap();
        gatekeeper.barrier().seal().await;

        let result = gatekeeper.unseal_with_gatekeeper_token(&token, false).await;
        assert!(matches!(
            result,
            Err(GatekeeperError::InvalidGatekeeperToken)
        ));
    }

    #[tokio::test]
    async fn renewed_token_survives_use() {
        let (gatekeeper, unseal_keys, _) = initialized().await;

        let token = gatekeeper
            .generate_gatekeeper_token_from_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        gatekeeper
            .unseal_with_gatekeeper_token(&token, true)
            .await
            .unwrap();
        gatekeeper
            .seal_with_gatekeeper_token(&token, true)
            .await
            .unwrap();
        gatekeeper
            .unseal_with_gatekeeper_token(&token, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let (gatekeeper, _, _) = initialized().await;

        let result = gatekeeper
            .unseal_with_gatekeeper_token("wont-work", false)
            .await;
        assert!(matches!(
            result,
            Err(GatekeeperError::InvalidGatekeeperToken)
        ));

        let well_formed_but_unknown = format_token(&"0".repeat(32));
        let result = gatekeeper
            .unseal_with_gatekeeper_token(&well_formed_but_unknown, false)
            .await;
        assert!(matches!(
            result,
            Err(GatekeeperError::InvalidGatekeeperToken)
        ));
    }

    #[tokio::test]
    async fn rotate_gatekeeper_token_revokes_old() {
        let (gatekeeper, unseal_keys, _) = initialized().await;

        let token = gatekeeper
            .generate_gatekeeper_token_from_unseal_keys(&unseal_keys)
            .await
            .unwrap();
        let rotated = gatekeeper.rotate_gatekeeper_token(&token).await.unwrap();
        assert_ne!(rotated, token);

        let result = gatekeeper.unseal_with_gatekeeper_token(&token, true).await;
        assert!(matches!(
            result,
            Err(GatekeeperError::InvalidGatekeeperToken)
        ));

        gatekeeper
            .unseal_with_gatekeeper_token(&rotated, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rotate_encryption_key_with_token() {
        let (gatekeeper, unseal_keys, _) = initialized().await;
        gatekeeper
            .unseal_with_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        let token = gatekeeper
            .generate_gatekeeper_token_from_unseal_keys(&unseal_keys)
            .await
            .unwrap();
        gatekeeper
            .rotate_encryption_key_with_gatekeeper_token(&token, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn revoke_all_gatekeeper_tokens() {
        let (gatekeeper, unseal_keys, _) = initialized().await;

        let t1 = gatekeeper
            .generate_gatekeeper_token_from_unseal_keys(&unseal_keys)
            .await
            .unwrap();
        let t2 = gatekeeper
            .generate_gatekeeper_token_from_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        gatekeeper.revoke_all_gatekeeper_tokens().await.unwrap();

        for token in [t1, t2] {
            let result = gatekeeper.unseal_with_gatekeeper_token(&token, true).await;
            assert!(matches!(
                result,
                Err(GatekeeperError::InvalidGatekeeperToken)
            ));
        }
    }

    #[tokio::test]
    async fn rotate_unseal_keys_invalidates_old_shares_and_tokens() {
        let (gatekeeper, old_keys, _) = initialized().await;
        gatekeeper.unseal_with_unseal_keys(&old_keys).await.unwrap();

        let token = gatekeeper
            .generate_gatekeeper_token_from_unseal_keys(&old_keys)
            .await
            .unwrap();

        let new_keys = gatekeeper
            .rotate_unseal_keys(&old_keys, 5, 3)
            .await
            .unwrap();
        assert_eq!(new_keys.len(), 5);
        for key in &new_keys {
            assert!(!old_keys.contains(key));
        }

        // Outstanding gatekeeper tokens are revoked by the rotation.
        let result = gatekeeper.rotate_gatekeeper_token(&token).await;
        assert!(matches!(
            result,
            Err(GatekeeperError::InvalidGatekeeperToken)
        ));

        // Old shares no longer unseal; new ones do.
        gatekeeper.barrier().seal().await;
        assert!(matches!(
            gatekeeper.unseal_with_unseal_keys(&old_keys).await,
            Err(GatekeeperError::Barrier(BarrierError::InvalidGatekeeperKey))
        ));
        gatekeeper
            .unseal_with_unseal_keys(&new_keys[..3])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rotate_unseal_keys_rejects_wrong_shares() {
        let (gatekeeper, unseal_keys, _) = initialized().await;
        gatekeeper
            .unseal_with_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        // A below-threshold subset reconstructs the wrong key.
        let result = gatekeeper
            .rotate_unseal_keys(&unseal_keys[..2].to_vec(), 5, 3)
            .await;
        assert!(matches!(result, Err(GatekeeperError::InvalidUnsealKey)));
    }

    #[tokio::test]
    async fn access_key_compare_and_rotate() {
        let (gatekeeper, unseal_keys, access_key) = initialized().await;
        gatekeeper
            .unseal_with_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        gatekeeper.compare_access_key(&access_key).await.unwrap();

        let rotated = gatekeeper.rotate_access_key(&access_key).await.unwrap();
        assert_ne!(rotated, access_key);

        assert!(matches!(
            gatekeeper.compare_access_key(&access_key).await,
            Err(GatekeeperError::InvalidAccessKey)
        ));
        gatekeeper.compare_access_key(&rotated).await.unwrap();
    }

    #[tokio::test]
    async fn rotate_access_key_rejects_wrong_key() {
        let (gatekeeper, unseal_keys, access_key) = initialized().await;
        gatekeeper
            .unseal_with_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        let result = gatekeeper.rotate_access_key(&access_key[1..]).await;
        assert!(matches!(result, Err(GatekeeperError::InvalidAccessKey)));
    }

    #[tokio::test]
    async fn rotate_access_key_with_unseal_keys() {
        let (gatekeeper, unseal_keys, access_key) = initialized().await;
        gatekeeper
            .unseal_with_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        let recovered = gatekeeper
            .rotate_access_key_with_unseal_keys(&unseal_keys)
            .await
            .unwrap();
        assert_ne!(recovered, access_key);
        gatekeeper.compare_access_key(&recovered).await.unwrap();
    }

    #[tokio::test]
    async fn save_access_token_validates_key_and_acls() {
        use crate::acl::{Acl, Permission};

        let (gatekeeper, unseal_keys, access_key) = initialized().await;
        gatekeeper
            .unseal_with_unseal_keys(&unseal_keys)
            .await
            .unwrap();

        let mut token = gatekeeper.new_token();
        token.namespace = "test".to_owned();
        token.acls = vec![Acl {
            path: "/*".to_owned(),
            permissions: vec![Permission::Read],
        }];

        gatekeeper
            .save_access_token_with_access_key(&access_key, &mut token)
            .await
            .unwrap();
        gatekeeper.token_manager().get(&token.id).await.unwrap();

        // Wrong access key.
        let mut another = gatekeeper.new_token();
        let result = gatekeeper
            .save_access_token_with_access_key("nope", &mut another)
            .await;
        assert!(matches!(result, Err(GatekeeperError::InvalidAccessKey)));

        // Invalid ACLs.
        let mut bad = gatekeeper.new_token();
        bad.acls = vec![Acl {
            path: "a/*/b".to_owned(),
            permissions: vec![Permission::Read],
        }];
        let result = gatekeeper
            .save_access_token_with_access_key(&access_key, &mut bad)
            .await;
        assert!(matches!(
            result,
            Err(GatekeeperError::Auth(crate::error::AuthError::InvalidAcl { .. }))
        ));
    }

    #[test]
    fn format_token_groups_of_four() {
        assert_eq!(
            format_token("ABCDEFGHIJKLMNOP"),
            "ABCD-EFGH-IJKL-MNOP"
        );
    }

    #[test]
    fn normalize_token_strips_separators() {
        let raw = "0123456789ABCDEF0123456789ABCDEF";
        let formatted = format_token(raw);
        assert_eq!(normalize_token(&formatted).unwrap(), raw);
        assert!(normalize_token("short").is_err());
    }
}
