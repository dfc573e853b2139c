//! Namespace-scoped KV access on top of the barrier.
//!
//! Every tenant operation composes `namespaces/<ns>/kv/<path>` before
//! reaching the barrier, so namespaces cannot address each other's keys
//! or the reserved subtrees. Path sanitation rejects non-printable
//! characters before they become storage keys.

use std::sync::Arc;

use crate::barrier::{Barrier, Item};
use crate::error::KvError;

const NAMESPACES_PREFIX: &str = "namespaces/";

/// The namespaced KV facade.
pub struct Kv {
    barrier: Arc<Barrier>,
}

impl Kv {
    /// Create a KV facade over the given barrier.
    #[must_use]
    pub fn new(barrier: Arc<Barrier>) -> Self {
        Self { barrier }
    }

    /// List the next path segments under `path` in a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::NoNamespace`] / [`KvError::InvalidPath`] on bad
    /// input and propagates barrier failures.
    pub async fn list(&self, namespace: &str, path: &str) -> Result<Vec<String>, KvError> {
        let composed = kv_path(namespace, path)?;
        Ok(self.barrier.list(&composed).await?)
    }

    /// Read the item at `path` in a namespace. The returned item's key is
    /// relative to the namespace.
    ///
    /// # Errors
    ///
    /// Same as [`list`](Kv::list), plus barrier `NotFound`.
    pub async fn get(&self, namespace: &str, path: &str) -> Result<Item, KvError> {
        if path.trim_end_matches('/').is_empty() {
            return Err(KvError::InvalidPath);
        }

        let composed = kv_path(namespace, path)?;
        let mut item = self.barrier.get(&composed).await?;
        item.key = trim_kv_path(namespace, &item.key);
        Ok(item)
    }

    /// Write an item at its key in a namespace.
    ///
    /// # Errors
    ///
    /// Same as [`list`](Kv::list), plus barrier value-policy failures.
    pub async fn put(&self, namespace: &str, item: &Item) -> Result<(), KvError> {
        if item.key.trim_end_matches('/').is_empty() {
            return Err(KvError::InvalidPath);
        }

        let composed = kv_path(namespace, &item.key)?;
        let mut scoped = item.clone();
        scoped.key = composed;
        Ok(self.barrier.put(&scoped).await?)
    }

    /// Delete the item at `path` in a namespace. Idempotent.
    ///
    /// # Errors
    ///
    /// Same as [`list`](Kv::list).
    pub async fn delete(&self, namespace: &str, path: &str) -> Result<(), KvError> {
        if path.trim_end_matches('/').is_empty() {
            return Err(KvError::InvalidPath);
        }

        let composed = kv_path(namespace, path)?;
        Ok(self.barrier.delete(&composed).await?)
    }
}

impl std::fmt::Debug for Kv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kv").finish_non_exhaustive()
    }
}

/// Compose the namespace-qualified storage path.
fn kv_path(namespace: &str, path: &str) -> Result<String, KvError> {
    let namespace = namespace.trim_matches('/');
    if namespace.is_empty() {
        return Err(KvError::NoNamespace);
    }

    if namespace.chars().any(char::is_control) || path.chars().any(char::is_control) {
        return Err(KvError::InvalidPath);
    }

    Ok(format!(
        "{NAMESPACES_PREFIX}{namespace}/kv/{}",
        path.trim_start_matches('/')
    ))
}

/// Strip the composed prefix from a returned key.
fn trim_kv_path(namespace: &str, key: &str) -> String {
    let prefix = format!("{NAMESPACES_PREFIX}{}/kv/", namespace.trim_matches('/'));
    key.strip_prefix(&prefix).unwrap_or(key).to_owned()
}
