//! In-memory storage backend.
//!
//! Stores records in a `BTreeMap` behind an async `RwLock`. Not
//! persistent — data is lost when the process exits. Used by unit and
//! integration tests and for single-process development servers.
//!
//! Does not advertise distributed locking: a single process needs none,
//! and callers that require read-modify-write atomicity fall back to
//! last-writer-wins semantics here.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{BackendRecord, Capabilities, Storage, StorageError};

/// An in-memory storage backend backed by a `BTreeMap`.
///
/// Thread-safe and cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<RwLock<BTreeMap<String, BackendRecord>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let records = self.records.read().await;

        let mut prefix = prefix.to_owned();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }

        let mut segments = BTreeSet::new();
        for key in records.range(prefix.clone()..) {
            let key = key.0;
            if !key.starts_with(&prefix) {
                break;
            }
            let tail = &key[prefix.len()..];
            if tail.is_empty() {
                continue;
            }
            match tail.find('/') {
                Some(i) => segments.insert(tail[..=i].to_owned()),
                None => segments.insert(tail.to_owned()),
            };
        }

        Ok(segments.into_iter().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<BackendRecord>, StorageError> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn put(&self, record: BackendRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        records.remove(key);
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }
}
