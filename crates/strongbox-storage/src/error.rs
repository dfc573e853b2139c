//! Storage error types.

/// Errors that can occur during storage operations.
///
/// Variants carry the offending key or prefix so failures can be diagnosed
/// without a debugger. Values never appear in error messages.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to read a record.
    #[error("failed to read key '{key}': {reason}")]
    Read { key: String, reason: String },

    /// Failed to write a record.
    #[error("failed to write key '{key}': {reason}")]
    Write { key: String, reason: String },

    /// Failed to delete a key.
    #[error("failed to delete key '{key}': {reason}")]
    Delete { key: String, reason: String },

    /// Failed to list keys under a prefix.
    #[error("failed to list keys with prefix '{prefix}': {reason}")]
    List { prefix: String, reason: String },

    /// The backend does not advertise distributed locking.
    #[error("backend does not support distributed locking")]
    LockingUnsupported,

    /// Failed to acquire or release a per-key lock.
    #[error("lock operation on key '{key}' failed: {reason}")]
    Lock { key: String, reason: String },
}
