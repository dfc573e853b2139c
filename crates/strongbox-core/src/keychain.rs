//! Versioned data-encryption keys for the barrier.
//!
//! The keychain is an ordered list of [`EncryptionKey`]s; the last entry
//! is the *active* key used for new writes. Older keys stay on the chain
//! so records written under them remain readable after rotation.
//!
//! Persistence is whole-snapshot only: the keychain serializes to a
//! [`KeychainSnapshot`] and is AEAD-encrypted with the gatekeeper key.
//! Restoring with the wrong key fails authentication, which the barrier
//! surfaces as an invalid gatekeeper key.
//!
//! The keychain carries no lock of its own — the barrier guards it with
//! a readers-writer lock, shared for lookups and exclusive for rotation
//! and snapshots.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, CipherKind};
use crate::error::KeychainError;

const KEYCHAIN_NAME: &str = "keychain";

/// A single versioned data-encryption key.
///
/// Ids are dense and monotonically increasing, starting at 1. The key
/// bytes are zeroized when the entry is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    /// Dense id, starting at 1. Id 0 is reserved.
    #[zeroize(skip)]
    pub id: u32,
    /// Cipher this key belongs to.
    #[zeroize(skip)]
    pub kind: CipherKind,
    /// Raw key bytes.
    pub key: Vec<u8>,
    /// Creation time, unix seconds.
    #[zeroize(skip)]
    pub created_at: i64,
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("key", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Wire form of a persisted keychain.
#[derive(Serialize, Deserialize)]
struct KeychainSnapshot {
    name: String,
    keys: Vec<EncryptionKey>,
    created: i64,
}

/// Ordered collection of encryption keys with an active tail.
#[derive(Debug, Default)]
pub struct Keychain {
    keys: Vec<EncryptionKey>,
}

impl Keychain {
    /// Create an empty keychain. [`active`](Keychain::active) returns
    /// `None` until the first rotation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a keychain from an encrypted snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::Crypto`] when the gatekeeper key fails to
    /// authenticate the snapshot and [`KeychainError::Corrupt`] when the
    /// decrypted payload is not a keychain.
    pub fn from_snapshot(gatekeeper_key: &[u8], snapshot: &[u8]) -> Result<Self, KeychainError> {
        let data = crypto::decrypt(CipherKind::Aes256Gcm, gatekeeper_key, snapshot)?;

        let snap: KeychainSnapshot =
            serde_json::from_slice(&data).map_err(|e| KeychainError::Corrupt {
                reason: e.to_string(),
            })?;

        if snap.name != KEYCHAIN_NAME {
            return Err(KeychainError::Corrupt {
                reason: "unknown snapshot format".to_owned(),
            });
        }

        Ok(Self { keys: snap.keys })
    }

    /// Serialize and encrypt the keychain under the gatekeeper key.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::Crypto`] when serialization or encryption
    /// fails.
    pub fn snapshot(&self, gatekeeper_key: &[u8]) -> Result<Vec<u8>, KeychainError> {
        let snap = KeychainSnapshot {
            name: KEYCHAIN_NAME.to_owned(),
            keys: self.keys.clone(),
            created: Utc::now().timestamp(),
        };

        let data =
            serde_json::to_vec(&snap).map_err(|e| crate::error::CryptoError::Serialization {
                reason: e.to_string(),
            })?;

        Ok(crypto::encrypt(CipherKind::Aes256Gcm, gatekeeper_key, &data)?)
    }

    /// Look up a key by id.
    #[must_use]
    pub fn key(&self, id: u32) -> Option<&EncryptionKey> {
        self.keys.iter().find(|k| k.id == id)
    }

    /// The active key: the newest entry on the chain.
    #[must_use]
    pub fn active(&self) -> Option<&EncryptionKey> {
        self.keys.last()
    }

    /// Append a key. An id of 0 is assigned the next dense id.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::DuplicateKeyId`] when a key with the same
    /// id is already on the chain.
    pub fn add(&mut self, mut key: EncryptionKey) -> Result<(), KeychainError> {
        if key.id == 0 {
            key.id = match self.keys.last() {
                Some(last) => last.id + 1,
                None => 1,
            };
        }
        if key.created_at == 0 {
            key.created_at = Utc::now().timestamp();
        }

        if self.keys.iter().any(|k| k.id == key.id) {
            return Err(KeychainError::DuplicateKeyId { id: key.id });
        }

        self.keys.push(key);
        Ok(())
    }

    /// Remove the key with the given id, if present.
    pub fn remove(&mut self, id: u32) {
        self.keys.retain(|k| k.id != id);
    }

    /// Generate a fresh AES-256-GCM key and make it the active key.
    ///
    /// Returns the id assigned to the new key.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::DuplicateKeyId`] when id assignment races
    /// an explicit [`add`](Keychain::add), which cannot happen under the
    /// barrier's exclusive lock.
    pub fn rotate(&mut self) -> Result<u32, KeychainError> {
        let key_bytes = crypto::generate_key(CipherKind::Aes256Gcm);
        let key = EncryptionKey {
            id: 0,
            kind: CipherKind::Aes256Gcm,
            key: key_bytes.to_vec(),
            created_at: 0,
        };
        self.add(key)?;

        // add() always appends, so the new active key is the tail.
        Ok(self.keys.last().map_or(0, |k| k.id))
    }
}
