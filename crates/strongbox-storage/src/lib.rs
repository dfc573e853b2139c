//! Storage backend abstraction for Strongbox.
//!
//! This crate defines the [`Storage`] trait — a pure key-value interface
//! that knows nothing about secrets or encryption. The barrier in
//! `strongbox-core` wraps a storage backend so that this layer only ever
//! sees ciphertext for user data.
//!
//! Keys are UTF-8 strings using `/` as a separator. Values travel as
//! [`BackendRecord`]s: the record carries the key, the id of the barrier
//! encryption key that produced the value (0 for records written outside
//! the barrier), and the opaque value bytes.
//!
//! One implementation is provided in-tree: [`MemoryStorage`], used for
//! tests and single-process development. Distributed backends plug in
//! through the same trait and advertise extra behaviour via
//! [`Capabilities`].

mod error;
mod memory;

use serde::{Deserialize, Serialize};

pub use error::StorageError;
pub use memory::MemoryStorage;

/// A single stored record.
///
/// `encryption_key_id` identifies the barrier key that encrypted `val`.
/// Id 0 is reserved for records that are not barrier-encrypted (the
/// barrier identity, keychain snapshot, and gatekeeper token records).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRecord {
    /// Full storage key, e.g. `secrets/namespaces/ns/kv/app/password`.
    pub key: String,
    /// Id of the encryption key that produced `val`; 0 = not barrier-encrypted.
    pub encryption_key_id: u32,
    /// Opaque value bytes.
    pub val: Vec<u8>,
}

/// Optional behaviours a backend may advertise.
///
/// Modeled as a small bitset so backends can advertise several at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No optional behaviour.
    pub const NONE: Capabilities = Capabilities(0);
    /// The backend can hand out per-key distributed locks via
    /// [`Storage::lock_key`].
    pub const DISTRIBUTED_LOCKING: Capabilities = Capabilities(1);
    /// The backend can notify watchers of key changes.
    pub const WATCHING: Capabilities = Capabilities(1 << 1);

    /// Whether every capability in `other` is advertised.
    #[must_use]
    pub fn has(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    /// Combine two capability sets.
    #[must_use]
    pub fn with(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 | other.0)
    }
}

/// A held per-key lock from a backend that advertises
/// [`Capabilities::DISTRIBUTED_LOCKING`].
///
/// Callers must release the lock on every exit path, including failures.
#[async_trait::async_trait]
pub trait KeyLock: Send + Sync {
    /// Acquire the lock, blocking until it is held.
    async fn lock(&self) -> Result<(), StorageError>;

    /// Release the lock. Releasing a lock that is not held is not an error.
    async fn unlock(&self) -> Result<(), StorageError>;
}

/// A pluggable key-value storage backend.
///
/// Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait Storage: Send + Sync + 'static {
    /// List the next path segment of every key under `prefix`.
    ///
    /// A trailing `/` is appended to `prefix` when missing. For each key
    /// with that prefix, the result contains the suffix up to and
    /// including the next `/` (or the bare tail when there is none).
    /// Duplicates are collapsed and the result is sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Retrieve a record by key. Returns `Ok(None)` when the key does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<BackendRecord>, StorageError>;

    /// Store a record, replacing any existing value at its key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, record: BackendRecord) -> Result<(), StorageError>;

    /// Delete a key. Idempotent — deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// The optional behaviours this backend advertises.
    fn capabilities(&self) -> Capabilities;

    /// Obtain a distributed per-key lock.
    ///
    /// Only meaningful when [`Capabilities::DISTRIBUTED_LOCKING`] is
    /// advertised; the default implementation refuses.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LockingUnsupported`] when the backend has
    /// no lock support.
    async fn lock_key(&self, key: &str) -> Result<Box<dyn KeyLock>, StorageError> {
        let _ = key;
        Err(StorageError::LockingUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_none_has_nothing() {
        assert!(!Capabilities::NONE.has(Capabilities::DISTRIBUTED_LOCKING));
        assert!(!Capabilities::NONE.has(Capabilities::WATCHING));
    }

    #[test]
    fn capabilities_combine() {
        let caps = Capabilities::DISTRIBUTED_LOCKING.with(Capabilities::WATCHING);
        assert!(caps.has(Capabilities::DISTRIBUTED_LOCKING));
        assert!(caps.has(Capabilities::WATCHING));
        assert!(caps.has(Capabilities::NONE));
    }

    #[test]
    fn capabilities_subset_check() {
        let caps = Capabilities::DISTRIBUTED_LOCKING;
        let both = Capabilities::DISTRIBUTED_LOCKING.with(Capabilities::WATCHING);
        assert!(!caps.has(both));
        assert!(both.has(caps));
    }
}
