//! Encryption barrier over a storage backend.
//!
//! Every user record passes through the barrier's encrypt/decrypt; the
//! storage layer only ever sees ciphertext for user data. The barrier
//! owns the keychain and a three-state machine:
//!
//! ```text
//!         initialize                    unseal
//! UNINIT ───────────▶ SEALED ─────────────────▶ UNSEALED
//!                     ▲ seal()                   │
//!                     └──────────────────────────┘
//! ```
//!
//! The in-memory keychain pointer *is* the seal state: `None` behind the
//! lock means sealed. Sealing drops the keychain, and every key entry
//! zeroizes its bytes on drop.
//!
//! User paths are normalized into the `secrets/` subtree before storage;
//! the reserved `barrier/` records and everything under `gatekeeper/`
//! are not addressable by clients.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

use strongbox_storage::{BackendRecord, Capabilities, KeyLock, Storage};

use crate::crypto::{self, CipherKind};
use crate::error::{BarrierError, CryptoError};
use crate::hash::Hash;
use crate::keychain::{EncryptionKey, Keychain};

const KEYCHAIN_KEY: &str = "barrier/keychain";
const BARRIER_ID_KEY: &str = "barrier/id";
const BARRIER_PREFIX: &str = "barrier/";
const GATEKEEPER_PREFIX: &str = "gatekeeper/";
const SECRETS_PREFIX: &str = "secrets/";

/// A plaintext record as seen by clients.
///
/// Exactly one of `raw` and `map` may be populated; the barrier rejects
/// items with both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Item {
    /// Client-visible key. Stored normalized; returned with the storage
    /// prefix stripped.
    pub key: String,
    /// Opaque value bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<u8>>,
    /// Structured value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<serde_json::Map<String, serde_json::Value>>,
    /// Free-form annotations, not interpreted by the barrier.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Write capability handed to the [`Barrier::initialize`] hook.
///
/// Grants exactly the encrypted writes needed to bootstrap records inside
/// the barrier before it reseals — no re-entrant barrier handle, no seal
/// state to consult. Dropped when the hook returns.
pub struct BootstrapWriter {
    storage: Arc<dyn Storage>,
    active: EncryptionKey,
}

impl BootstrapWriter {
    /// Encrypt an item with the new active key and write it.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::MixRawMap`] for an item with both value
    /// forms, and propagates crypto and backend failures.
    pub async fn put_item(&self, item: &Item) -> Result<(), BarrierError> {
        if item.raw.is_some() && item.map.is_some() {
            return Err(BarrierError::MixRawMap);
        }

        let normalized = secrets_key(&item.key);
        let record = encrypt_with(&self.active, item, normalized)?;
        self.storage.put(record).await?;
        Ok(())
    }
}

/// The encryption barrier.
pub struct Barrier {
    storage: Arc<dyn Storage>,
    keychain: RwLock<Option<Keychain>>,
}

impl Barrier {
    /// Create a sealed barrier over the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            keychain: RwLock::new(None),
        }
    }

    /// The backend this barrier wraps. Operations performed directly on
    /// the backend are not managed by the barrier.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Whether the barrier has been initialized.
    ///
    /// True as soon as a keychain snapshot exists in the backend. A
    /// keychain resident in memory short-circuits the backend probe.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::Backend`] if the backend probe fails.
    pub async fn is_initialized(&self) -> Result<bool, BarrierError> {
        if self.keychain.read().await.is_some() {
            return Ok(true);
        }

        let keys = self.storage.list(BARRIER_PREFIX).await?;
        Ok(keys.iter().any(|k| k == "keychain"))
    }

    /// Whether the barrier is initialized but sealed.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::NotInitialized`] before initialization.
    pub async fn is_sealed(&self) -> Result<bool, BarrierError> {
        if !self.is_initialized().await? {
            return Err(BarrierError::NotInitialized);
        }

        Ok(self.keychain.read().await.is_none())
    }

    /// Initialize the barrier: create the barrier identity and a fresh
    /// keychain, invoke the bootstrap hook, persist the keychain under
    /// `gatekeeper_key`, and reseal.
    ///
    /// The hook receives a [`BootstrapWriter`] capability for the writes
    /// that must land inside the barrier before it reseals (the
    /// gatekeeper uses this for the initial access key). The hook's
    /// output is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::AlreadyInitialized`] when a keychain
    /// already exists, and propagates hook, crypto, and backend failures.
    pub async fn initialize<F, Fut, T>(
        &self,
        gatekeeper_key: &[u8],
        bootstrap: F,
    ) -> Result<T, BarrierError>
    where
        F: FnOnce(BootstrapWriter) -> Fut,
        Fut: Future<Output = Result<T, BarrierError>>,
    {
        if self.is_initialized().await? {
            return Err(BarrierError::AlreadyInitialized);
        }

        let guard = self.keychain.write().await;

        let id = crypto::generate_key(CipherKind::Aes256Gcm);
        self.storage
            .put(BackendRecord {
                key: BARRIER_ID_KEY.to_owned(),
                encryption_key_id: 0,
                val: id.to_vec(),
            })
            .await?;

        let mut keychain = Keychain::new();
        keychain.rotate()?;
        let active = keychain.active().ok_or(BarrierError::Sealed)?.clone();

        let writer = BootstrapWriter {
            storage: Arc::clone(&self.storage),
            active,
        };
        let output = bootstrap(writer).await?;

        persist_keychain(self.storage.as_ref(), &keychain, gatekeeper_key).await?;

        // The keychain drops here (zeroizing its keys); the barrier stays
        // sealed until the first unseal.
        drop(keychain);
        drop(guard);

        info!("barrier initialized");
        Ok(output)
    }

    /// The 32-byte barrier identity written at initialization.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::NotInitialized`] when the identity record
    /// is missing.
    pub async fn id(&self) -> Result<Hash, BarrierError> {
        let record = self
            .storage
            .get(BARRIER_ID_KEY)
            .await?
            .ok_or(BarrierError::NotInitialized)?;

        Ok(Hash::from_bytes(record.val))
    }

    /// Check a gatekeeper key against the persisted keychain snapshot
    /// without installing the keychain.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidGatekeeperKey`] when the key fails
    /// to authenticate the snapshot.
    pub async fn validate_gatekeeper_key(&self, gatekeeper_key: &[u8]) -> Result<(), BarrierError> {
        let record = self
            .storage
            .get(KEYCHAIN_KEY)
            .await?
            .ok_or(BarrierError::NotInitialized)?;

        match Keychain::from_snapshot(gatekeeper_key, &record.val) {
            Ok(_) => Ok(()),
            Err(_) => Err(BarrierError::InvalidGatekeeperKey),
        }
    }

    /// Decrypt the persisted keychain with `gatekeeper_key` and install
    /// it, moving the barrier to UNSEALED.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::Unsealed`] when already unsealed.
    /// - [`BarrierError::InvalidGatekeeperKey`] when the key fails to
    ///   authenticate the snapshot.
    pub async fn unseal(&self, gatekeeper_key: &[u8]) -> Result<(), BarrierError> {
        if !self.is_sealed().await? {
            return Err(BarrierError::Unsealed);
        }

        let record = self
            .storage
            .get(KEYCHAIN_KEY)
            .await?
            .ok_or(BarrierError::NotInitialized)?;

        let keychain = Keychain::from_snapshot(gatekeeper_key, &record.val)
            .map_err(|_| BarrierError::InvalidGatekeeperKey)?;

        let mut guard = self.keychain.write().await;
        *guard = Some(keychain);

        info!("barrier unsealed");
        Ok(())
    }

    /// Drop the keychain from memory, returning to SEALED. Idempotent.
    /// The dropped keychain zeroizes its key material.
    pub async fn seal(&self) {
        let mut guard = self.keychain.write().await;
        if guard.take().is_some() {
            info!("barrier sealed");
        }
    }

    /// Re-encrypt the keychain snapshot under a new gatekeeper key.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::Sealed`] unless unsealed.
    pub async fn change_gatekeeper_key(&self, gatekeeper_key: &[u8]) -> Result<(), BarrierError> {
        let guard = self.keychain.write().await;
        let keychain = guard.as_ref().ok_or(BarrierError::Sealed)?;

        persist_keychain(self.storage.as_ref(), keychain, gatekeeper_key).await?;
        info!("gatekeeper key changed");
        Ok(())
    }

    /// Append a fresh active encryption key and persist the keychain.
    ///
    /// New writes tag the new key id; records written under older ids
    /// keep decrypting. Rotate well before the ~2^32-message nonce
    /// birthday bound of a single key.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::Sealed`] unless unsealed.
    pub async fn rotate_encryption_key(&self, gatekeeper_key: &[u8]) -> Result<(), BarrierError> {
        let mut guard = self.keychain.write().await;
        let keychain = guard.as_mut().ok_or(BarrierError::Sealed)?;

        let id = keychain.rotate()?;
        persist_keychain(self.storage.as_ref(), keychain, gatekeeper_key).await?;

        info!(key_id = id, "encryption key rotated");
        Ok(())
    }

    /// Encrypt an item with the active key, tagging the record with the
    /// key id. The item's key is normalized into the `secrets/` subtree.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::Sealed`] unless unsealed and
    /// [`BarrierError::DisallowedPath`] for reserved paths.
    pub async fn encrypt_item(&self, item: &Item) -> Result<BackendRecord, BarrierError> {
        let guard = self.require_unsealed().await?;
        let keychain = keychain_ref(&guard)?;
        let normalized = user_key(&item.key)?;
        let active = keychain.active().ok_or(BarrierError::Sealed)?;
        encrypt_with(active, item, normalized)
    }

    /// Decrypt a record using the keychain key named by its id.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::UnknownKeyId`] for id 0 (reserved) or an id the
    ///   keychain does not hold.
    /// - [`BarrierError::Crypto`] on authentication failure.
    pub async fn decrypt_item(&self, record: &BackendRecord) -> Result<Item, BarrierError> {
        let guard = self.require_unsealed().await?;
        let keychain = keychain_ref(&guard)?;
        decrypt_with(keychain, record)
    }

    /// List the next path segments under a user prefix.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::Sealed`] unless unsealed and
    /// [`BarrierError::DisallowedPath`] for reserved prefixes.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, BarrierError> {
        let _guard = self.require_unsealed().await?;
        let composed = user_key(prefix)?;
        Ok(self.storage.list(&composed).await?)
    }

    /// Read and decrypt the item at a user path.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::Sealed`] unless unsealed.
    /// - [`BarrierError::DisallowedPath`] for reserved paths.
    /// - [`BarrierError::NotFound`] when no record exists.
    pub async fn get(&self, key: &str) -> Result<Item, BarrierError> {
        let composed = user_key(key)?;
        self.get_at(&composed).await
    }

    /// Encrypt and write an item at its (user) key.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::Sealed`] unless unsealed.
    /// - [`BarrierError::DisallowedPath`] for reserved paths.
    /// - [`BarrierError::MixRawMap`] when both `raw` and `map` are set.
    pub async fn put(&self, item: &Item) -> Result<(), BarrierError> {
        let composed = user_key(&item.key)?;
        self.put_at(&composed, item).await
    }

    /// Delete the record at a user path. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::Sealed`] unless unsealed and
    /// [`BarrierError::DisallowedPath`] for reserved paths.
    pub async fn delete(&self, key: &str) -> Result<(), BarrierError> {
        let _guard = self.require_unsealed().await?;
        let composed = user_key(key)?;
        self.storage.delete(&composed).await?;
        Ok(())
    }

    /// Obtain a distributed lock for a user key, when the backend
    /// advertises locking. `None` means callers fall back to
    /// last-writer-wins.
    ///
    /// # Errors
    ///
    /// Propagates path policy and backend lock failures.
    pub async fn lock_key(&self, key: &str) -> Result<Option<Box<dyn KeyLock>>, BarrierError> {
        if !self
            .storage
            .capabilities()
            .has(Capabilities::DISTRIBUTED_LOCKING)
        {
            return Ok(None);
        }

        let composed = user_key(key)?;
        Ok(Some(self.storage.lock_key(&composed).await?))
    }

    /// Read and decrypt a record inside the barrier without the client
    /// path policy. Crate-internal: the gatekeeper stores its access key
    /// under the reserved `gatekeeper/` subtree.
    pub(crate) async fn get_internal(&self, key: &str) -> Result<Item, BarrierError> {
        let composed = secrets_key(key);
        self.get_at(&composed).await
    }

    /// Encrypt and write a record inside the barrier without the client
    /// path policy. Crate-internal counterpart of
    /// [`get_internal`](Barrier::get_internal).
    pub(crate) async fn put_internal(&self, item: &Item) -> Result<(), BarrierError> {
        let composed = secrets_key(&item.key);
        self.put_at(&composed, item).await
    }

    async fn get_at(&self, composed: &str) -> Result<Item, BarrierError> {
        let guard = self.require_unsealed().await?;
        let keychain = keychain_ref(&guard)?;

        let record = self
            .storage
            .get(composed)
            .await?
            .ok_or_else(|| BarrierError::NotFound {
                key: composed
                    .strip_prefix(SECRETS_PREFIX)
                    .unwrap_or(composed)
                    .to_owned(),
            })?;

        decrypt_with(keychain, &record)
    }

    async fn put_at(&self, composed: &str, item: &Item) -> Result<(), BarrierError> {
        if item.raw.is_some() && item.map.is_some() {
            return Err(BarrierError::MixRawMap);
        }

        let guard = self.require_unsealed().await?;
        let keychain = keychain_ref(&guard)?;
        let active = keychain.active().ok_or(BarrierError::Sealed)?;

        let record = encrypt_with(active, item, composed.to_owned())?;
        self.storage.put(record).await?;
        Ok(())
    }

    /// Take the shared keychain guard, distinguishing SEALED from UNINIT.
    async fn require_unsealed(
        &self,
    ) -> Result<RwLockReadGuard<'_, Option<Keychain>>, BarrierError> {
        let guard = self.keychain.read().await;
        if guard.is_some() {
            return Ok(guard);
        }

        let keys = self.storage.list(BARRIER_PREFIX).await?;
        if keys.iter().any(|k| k == "keychain") {
            Err(BarrierError::Sealed)
        } else {
            Err(BarrierError::NotInitialized)
        }
    }
}

impl std::fmt::Debug for Barrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Barrier").finish_non_exhaustive()
    }
}

fn keychain_ref<'a>(
    guard: &'a RwLockReadGuard<'_, Option<Keychain>>,
) -> Result<&'a Keychain, BarrierError> {
    guard.as_ref().ok_or(BarrierError::Sealed)
}

/// Normalize a user path into the `secrets/` subtree, rejecting reserved
/// paths.
fn user_key(key: &str) -> Result<String, BarrierError> {
    let trimmed = key.trim_start_matches('/');
    if trimmed == KEYCHAIN_KEY || trimmed == BARRIER_ID_KEY || trimmed.starts_with(GATEKEEPER_PREFIX)
    {
        return Err(BarrierError::DisallowedPath {
            path: trimmed.to_owned(),
        });
    }
    Ok(secrets_key(trimmed))
}

fn secrets_key(key: &str) -> String {
    format!("{SECRETS_PREFIX}{}", key.trim_start_matches('/'))
}

fn encrypt_with(
    active: &EncryptionKey,
    item: &Item,
    normalized_key: String,
) -> Result<BackendRecord, BarrierError> {
    let mut stored = item.clone();
    stored.key = normalized_key.clone();

    let plaintext = serde_json::to_vec(&stored).map_err(|e| CryptoError::Serialization {
        reason: e.to_string(),
    })?;
    let val = crypto::encrypt(active.kind, &active.key, &plaintext)?;

    Ok(BackendRecord {
        key: normalized_key,
        encryption_key_id: active.id,
        val,
    })
}

fn decrypt_with(keychain: &Keychain, record: &BackendRecord) -> Result<Item, BarrierError> {
    if record.encryption_key_id == 0 {
        return Err(BarrierError::UnknownKeyId { id: 0 });
    }

    let key = keychain
        .key(record.encryption_key_id)
        .ok_or(BarrierError::UnknownKeyId {
            id: record.encryption_key_id,
        })?;

    let plaintext = crypto::decrypt(key.kind, &key.key, &record.val)?;
    let mut item: Item =
        serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Serialization {
            reason: e.to_string(),
        })?;

    if let Some(stripped) = item.key.strip_prefix(SECRETS_PREFIX) {
        item.key = stripped.to_owned();
    }

    Ok(item)
}

async fn persist_keychain(
    storage: &dyn Storage,
    keychain: &Keychain,
    gatekeeper_key: &[u8],
) -> Result<(), BarrierError> {
    let snapshot = keychain.snapshot(gatekeeper_key)?;

    storage
        .put(BackendRecord {
            key: KEYCHAIN_KEY.to_owned(),
            encryption_key_id: 0,
            val: snapshot,
        })
        .await?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strongbox_storage::MemoryStorage;
    use zeroize::Zeroizing;

    fn make_barrier() -> (Barrier, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let barrier = Barrier::new(Arc::clone(&storage) as Arc<dyn Storage>);
        (barrier, storage)
    }

    fn gatekeeper_key() -> Zeroizing<Vec<u8>> {
        crypto::generate_key(CipherKind::Aes256Gcm)
    }

    async fn initialized_unsealed() -> (Barrier, Zeroizing<Vec<u8>>, Arc<MemoryStorage>) {
        let (barrier, storage) = make_barrier();
        let key = gatekeeper_key();
        barrier
            .initialize(&key, |_writer| async { Ok(()) })
            .await
            .unwrap();
        barrier.unseal(&key).await.unwrap();
        (barrier, key, storage)
    }

    fn raw_item(key: &str, val: &[u8]) -> Item {
        Item {
            key: key.to_owned(),
            raw: Some(val.to_vec()),
            ..Item::default()
        }
    }

    #[tokio::test]
    async fn uninitialized_barrier_reports_state() {
        let (barrier, _) = make_barrier();
        assert!(!barrier.is_initialized().await.unwrap());
        assert!(matches!(
            barrier.is_sealed().await,
            Err(BarrierError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn operations_before_initialize_fail() {
        let (barrier, _) = make_barrier();
        assert!(matches!(
            barrier.get("some/key").await,
            Err(BarrierError::NotInitialized)
        ));
        assert!(matches!(
            barrier.put(&raw_item("k", b"v")).await,
            Err(BarrierError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn initialize_leaves_barrier_sealed() {
        let (barrier, _) = make_barrier();
        let key = gatekeeper_key();
        barrier
            .initialize(&key, |_writer| async { Ok(()) })
            .await
            .unwrap();

        assert!(barrier.is_initialized().await.unwrap());
        assert!(barrier.is_sealed().await.unwrap());
    }

    #[tokio::test]
    async fn initialize_twice_fails() {
        let (barrier, _) = make_barrier();
        let key = gatekeeper_key();
        barrier
            .initialize(&key, |_writer| async { Ok(()) })
            .await
            .unwrap();

        let result = barrier.initialize(&key, |_writer| async { Ok(()) }).await;
        assert!(matches!(result, Err(BarrierError::AlreadyInitialized)));
    }

    #[tokio::test]
    async fn initialize_writes_barrier_id() {
        let (barrier, _) = make_barrier();
        let key = gatekeeper_key();
        barrier
            .initialize(&key, |_writer| async { Ok(()) })
            .await
            .unwrap();

        let id = barrier.id().await.unwrap();
        assert_eq!(id.as_bytes().len(), 32);
    }

    #[tokio::test]
    async fn id_before_initialize_fails() {
        let (barrier, _) = make_barrier();
        assert!(matches!(
            barrier.id().await,
            Err(BarrierError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn bootstrap_hook_writes_inside_barrier() {
        let (barrier, _) = make_barrier();
        let key = gatekeeper_key();

        let marker = barrier
            .initialize(&key, |writer| async move {
                writer
                    .put_item(&raw_item("gatekeeper/accessKeyHash", b"bootstrap"))
                    .await?;
                Ok("done".to_owned())
            })
            .await
            .unwrap();
        assert_eq!(marker, "done");

        barrier.unseal(&key).await.unwrap();
        let item = barrier.get_internal("gatekeeper/accessKeyHash").await.unwrap();
        assert_eq!(item.raw.as_deref(), Some(b"bootstrap".as_slice()));
    }

    #[tokio::test]
    async fn unseal_with_wrong_key_fails() {
        let (barrier, _) = make_barrier();
        let key = gatekeeper_key();
        barrier
            .initialize(&key, |_writer| async { Ok(()) })
            .await
            .unwrap();

        let wrong = gatekeeper_key();
        let result = barrier.unseal(&wrong).await;
        assert!(matches!(result, Err(BarrierError::InvalidGatekeeperKey)));
        assert!(barrier.is_sealed().await.unwrap());
    }

    #[tokio::test]
    async fn unseal_twice_fails() {
        let (barrier, key, _) = initialized_unsealed().await;
        let result = barrier.unseal(&key).await;
        assert!(matches!(result, Err(BarrierError::Unsealed)));
    }

    #[tokio::test]
    async fn validate_gatekeeper_key_distinguishes() {
        let (barrier, key, _) = initialized_unsealed().await;
        barrier.validate_gatekeeper_key(&key).await.unwrap();

        let wrong = gatekeeper_key();
        assert!(matches!(
            barrier.validate_gatekeeper_key(&wrong).await,
            Err(BarrierError::InvalidGatekeeperKey)
        ));
    }

    #[tokio::test]
    async fn put_get_roundtrip_raw() {
        let (barrier, _, _) = initialized_unsealed().await;

        barrier.put(&raw_item("folder1/item1", b"the-data")).await.unwrap();
        let item = barrier.get("folder1/item1").await.unwrap();
        assert_eq!(item.key, "folder1/item1");
        assert_eq!(item.raw.as_deref(), Some(b"the-data".as_slice()));
    }

    #[tokio::test]
    async fn put_get_roundtrip_map() {
        let (barrier, _, _) = initialized_unsealed().await;

        let mut map = serde_json::Map::new();
        map.insert("user".to_owned(), serde_json::json!("svc"));
        map.insert("attempts".to_owned(), serde_json::json!(3));

        let item = Item {
            key: "creds/db".to_owned(),
            map: Some(map.clone()),
            ..Item::default()
        };
        barrier.put(&item).await.unwrap();

        let got = barrier.get("creds/db").await.unwrap();
        assert_eq!(got.map, Some(map));
        assert!(got.raw.is_none());
    }

    #[tokio::test]
    async fn leading_slash_addresses_same_key() {
        let (barrier, _, _) = initialized_unsealed().await;

        barrier.put(&raw_item("/a/b", b"v")).await.unwrap();
        let item = barrier.get("a/b").await.unwrap();
        assert_eq!(item.raw.as_deref(), Some(b"v".as_slice()));
    }

    #[tokio::test]
    async fn values_are_ciphertext_in_backend() {
        let (barrier, _, storage) = initialized_unsealed().await;

        barrier.put(&raw_item("plain/check", b"super-secret")).await.unwrap();
        let stored = storage.get("secrets/plain/check").await.unwrap().unwrap();
        assert!(stored.encryption_key_id > 0);

        let haystack = stored.val;
        let needle = b"super-secret";
        let leaked = haystack
            .windows(needle.len())
            .any(|window| window == needle);
        assert!(!leaked);
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let (barrier, _, _) = initialized_unsealed().await;
        let result = barrier.get("no/such/key").await;
        assert!(matches!(result, Err(BarrierError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let (barrier, _, _) = initialized_unsealed().await;

        barrier.put(&raw_item("folder1/item1", b"the-data")).await.unwrap();
        barrier.delete("folder1/item1").await.unwrap();

        let result = barrier.get("folder1/item1").await;
        assert!(matches!(result, Err(BarrierError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_missing_key_succeeds() {
        let (barrier, _, _) = initialized_unsealed().await;
        barrier.delete("never/existed").await.unwrap();
    }

    #[tokio::test]
    async fn list_returns_next_segments() {
        let (barrier, _, _) = initialized_unsealed().await;

        barrier.put(&raw_item("folder1/item1", b"1")).await.unwrap();
        barrier.put(&raw_item("folder1/sub/item2", b"2")).await.unwrap();
        barrier.put(&raw_item("folder2/item3", b"3")).await.unwrap();

        let listed = barrier.list("folder1").await.unwrap();
        assert_eq!(listed, vec!["item1", "sub/"]);
    }

    #[tokio::test]
    async fn sealed_barrier_rejects_operations() {
        let (barrier, _, _) = initialized_unsealed().await;
        barrier.seal().await;

        assert!(matches!(
            barrier.get("k").await,
            Err(BarrierError::Sealed)
        ));
        assert!(matches!(
            barrier.put(&raw_item("k", b"v")).await,
            Err(BarrierError::Sealed)
        ));
        assert!(matches!(
            barrier.delete("k").await,
            Err(BarrierError::Sealed)
        ));
        assert!(matches!(
            barrier.list("k").await,
            Err(BarrierError::Sealed)
        ));
    }

    #[tokio::test]
    async fn seal_is_idempotent() {
        let (barrier, _, _) = initialized_unsealed().await;
        barrier.seal().await;
        barrier.seal().await;
        assert!(barrier.is_sealed().await.unwrap());
    }

    #[tokio::test]
    async fn reseal_and_unseal_preserves_data() {
        let (barrier, key, _) = initialized_unsealed().await;

        barrier.put(&raw_item("persist/me", b"still-here")).await.unwrap();
        barrier.seal().await;
        barrier.unseal(&key).await.unwrap();

        let item = barrier.get("persist/me").await.unwrap();
        assert_eq!(item.raw.as_deref(), Some(b"still-here".as_slice()));
    }

    #[tokio::test]
    async fn reserved_paths_are_disallowed() {
        let (barrier, _, _) = initialized_unsealed().await;

        for path in [
            "barrier/keychain",
            "/barrier/keychain",
            "barrier/id",
            "gatekeeper/accessKeyHash",
            "gatekeeper/tokens/abc",
        ] {
            assert!(
                matches!(
                    barrier.get(path).await,
                    Err(BarrierError::DisallowedPath { .. })
                ),
                "get {path} should be disallowed"
            );
            assert!(
                matches!(
                    barrier.put(&raw_item(path, b"v")).await,
                    Err(BarrierError::DisallowedPath { .. })
                ),
                "put {path} should be disallowed"
            );
            assert!(
                matches!(
                    barrier.delete(path).await,
                    Err(BarrierError::DisallowedPath { .. })
                ),
                "delete {path} should be disallowed"
            );
        }
    }

    #[tokio::test]
    async fn mixed_raw_and_map_rejected() {
        let (barrier, _, _) = initialized_unsealed().await;

        let item = Item {
            key: "bad/item".to_owned(),
            raw: Some(b"raw".to_vec()),
            map: Some(serde_json::Map::new()),
            ..Item::default()
        };
        let result = barrier.put(&item).await;
        assert!(matches!(result, Err(BarrierError::MixRawMap)));
    }

    #[tokio::test]
    async fn rotation_tags_new_writes_and_preserves_old_reads() {
        let (barrier, key, storage) = initialized_unsealed().await;

        barrier.put(&raw_item("old/record", b"written-first")).await.unwrap();
        let old = storage.get("secrets/old/record").await.unwrap().unwrap();
        assert_eq!(old.encryption_key_id, 1);

        barrier.rotate_encryption_key(&key).await.unwrap();

        barrier.put(&raw_item("new/record", b"written-second")).await.unwrap();
        let new = storage.get("secrets/new/record").await.unwrap().unwrap();
        assert_eq!(new.encryption_key_id, 2);

        // Old record still decrypts under its original key id.
        let item = barrier.get("old/record").await.unwrap();
        assert_eq!(item.raw.as_deref(), Some(b"written-first".as_slice()));

        // Rewriting tags it with the new id.
        barrier.put(&raw_item("old/record", b"rewritten")).await.unwrap();
        let rewritten = storage.get("secrets/old/record").await.unwrap().unwrap();
        assert_eq!(rewritten.encryption_key_id, 2);
    }

    #[tokio::test]
    async fn rotation_survives_reseal() {
        let (barrier, key, _) = initialized_unsealed().await;

        barrier.put(&raw_item("a", b"1")).await.unwrap();
        barrier.rotate_encryption_key(&key).await.unwrap();
        barrier.seal().await;
        barrier.unseal(&key).await.unwrap();

        let item = barrier.get("a").await.unwrap();
        assert_eq!(item.raw.as_deref(), Some(b"1".as_slice()));
    }

    #[tokio::test]
    async fn rotate_requires_unsealed() {
        let (barrier, key, _) = initialized_unsealed().await;
        barrier.seal().await;
        let result = barrier.rotate_encryption_key(&key).await;
        assert!(matches!(result, Err(BarrierError::Sealed)));
    }

    #[tokio::test]
    async fn change_gatekeeper_key_reencrypts_snapshot() {
        let (barrier, old_key, _) = initialized_unsealed().await;
        barrier.put(&raw_item("kept", b"value")).await.unwrap();

        let new_key = gatekeeper_key();
        barrier.change_gatekeeper_key(&new_key).await.unwrap();
        barrier.seal().await;

        assert!(matches!(
            barrier.unseal(&old_key).await,
            Err(BarrierError::InvalidGatekeeperKey)
        ));

        barrier.unseal(&new_key).await.unwrap();
        let item = barrier.get("kept").await.unwrap();
        assert_eq!(item.raw.as_deref(), Some(b"value".as_slice()));
    }

    #[tokio::test]
    async fn change_gatekeeper_key_requires_unsealed() {
        let (barrier, _, _) = initialized_unsealed().await;
        barrier.seal().await;
        let new_key = gatekeeper_key();
        let result = barrier.change_gatekeeper_key(&new_key).await;
        assert!(matches!(result, Err(BarrierError::Sealed)));
    }

    #[tokio::test]
    async fn decrypt_item_rejects_key_id_zero() {
        let (barrier, _, _) = initialized_unsealed().await;

        let record = BackendRecord {
            key: "secrets/x".to_owned(),
            encryption_key_id: 0,
            val: vec![0u8; 64],
        };
        let result = barrier.decrypt_item(&record).await;
        assert!(matches!(result, Err(BarrierError::UnknownKeyId { id: 0 })));
    }

    #[tokio::test]
    async fn decrypt_item_rejects_unknown_key_id() {
        let (barrier, _, _) = initialized_unsealed().await;

        let mut record = barrier.encrypt_item(&raw_item("x", b"v")).await.unwrap();
        record.encryption_key_id = 99;
        let result = barrier.decrypt_item(&record).await;
        assert!(matches!(
            result,
            Err(BarrierError::UnknownKeyId { id: 99 })
        ));
    }

    #[tokio::test]
    async fn encrypt_decrypt_item_roundtrip() {
        let (barrier, _, _) = initialized_unsealed().await;

        let record = barrier
            .encrypt_item(&raw_item("ephemeral/x", b"not-stored"))
            .await
            .unwrap();
        assert_eq!(record.key, "secrets/ephemeral/x");

        let item = barrier.decrypt_item(&record).await.unwrap();
        assert_eq!(item.key, "ephemeral/x");
        assert_eq!(item.raw.as_deref(), Some(b"not-stored".as_slice()));
    }

    #[tokio::test]
    async fn lock_key_is_none_without_capability() {
        let (barrier, _, _) = initialized_unsealed().await;
        let lock = barrier.lock_key("auth/tokens/x").await.unwrap();
        assert!(lock.is_none());
    }
}
