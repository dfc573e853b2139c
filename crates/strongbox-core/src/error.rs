//! Error types for `strongbox-core`.
//!
//! The taxonomy is closed: every failure a caller can act on has exactly
//! one variant. Wrapped sources (`#[from]`) carry context for operators;
//! program logic matches on the variant alone. Error messages never
//! include key material.

use strongbox_storage::StorageError;

/// Errors from cryptographic primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The key is absent or has the wrong length for its cipher.
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    /// The cipher kind is not supported.
    #[error("unknown cipher kind: {kind}")]
    UnknownCipher { kind: String },

    /// An AEAD operation failed (wrong key, corrupted data, or tampered tag).
    #[error("aead operation failed: {reason}")]
    Aead { reason: String },

    /// Encoding or decoding of a sealed record failed.
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Errors from secret-sharing split/combine.
#[derive(Debug, thiserror::Error)]
pub enum ShamirError {
    /// Out-of-range parts/threshold or an empty secret.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The share set cannot be combined: too few, unequal lengths, or
    /// duplicate x-coordinates.
    #[error("invalid shares: {reason}")]
    InvalidShares { reason: String },
}

/// Errors from keychain snapshot handling.
#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    /// A key with this id already exists on the keychain.
    #[error("a key with id {id} already exists on the keychain")]
    DuplicateKeyId { id: u32 },

    /// The decrypted snapshot is not a keychain.
    #[error("corrupt keychain snapshot: {reason}")]
    Corrupt { reason: String },

    /// A cryptographic operation on the snapshot failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Errors from the encryption barrier.
#[derive(Debug, thiserror::Error)]
pub enum BarrierError {
    /// The barrier has already been initialized.
    #[error("barrier is already initialized")]
    AlreadyInitialized,

    /// The barrier has not been initialized.
    #[error("barrier is not initialized")]
    NotInitialized,

    /// The barrier is sealed — unseal before reading or writing.
    #[error("barrier is sealed")]
    Sealed,

    /// The barrier is already unsealed.
    #[error("barrier is already unsealed")]
    Unsealed,

    /// The gatekeeper key failed to authenticate the keychain snapshot.
    #[error("unseal failed due to invalid gatekeeper key")]
    InvalidGatekeeperKey,

    /// The key path is reserved and not addressable by clients.
    #[error("key path is not allowed: {path}")]
    DisallowedPath { path: String },

    /// An item may populate `raw` or `map`, never both.
    #[error("cannot mix raw and map values")]
    MixRawMap,

    /// A record references an encryption key the keychain does not hold.
    #[error("encryption key id {id} does not exist")]
    UnknownKeyId { id: u32 },

    /// No record exists at the given key.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The keychain snapshot could not be restored.
    #[error(transparent)]
    Keychain(#[from] KeychainError),

    /// The storage backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] StorageError),
}

/// Errors from token and ACL handling.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token does not exist or has expired.
    #[error("token not found or expired")]
    TokenNotFound,

    /// The token id or reference id is malformed.
    #[error("invalid token")]
    TokenInvalid,

    /// The token's enabled-at time is in the future.
    #[error("token not allowed to be used yet")]
    TokenNotActiveYet,

    /// The ACLs deny the requested operation.
    #[error("no permission to perform this action")]
    Forbidden,

    /// An ACL is malformed.
    #[error("invalid acl: {reason}")]
    InvalidAcl { reason: String },

    /// The barrier failed while reading or writing a token.
    #[error(transparent)]
    Barrier(#[from] BarrierError),
}

/// Errors from the namespaced KV facade.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The namespace or path contains non-printable characters, or the
    /// path is empty.
    #[error("invalid characters in path")]
    InvalidPath,

    /// No namespace was specified.
    #[error("no namespace specified")]
    NoNamespace,

    /// The barrier rejected the operation.
    #[error(transparent)]
    Barrier(#[from] BarrierError),
}

/// Errors from the gatekeeper.
#[derive(Debug, thiserror::Error)]
pub enum GatekeeperError {
    /// The gatekeeper token is malformed, unknown, or failed to decrypt.
    /// Deliberately uniform — callers cannot tell lookup misses from
    /// authentication failures.
    #[error("invalid gatekeeper token")]
    InvalidGatekeeperToken,

    /// An unseal key share is malformed or the set does not reconstruct
    /// the gatekeeper key.
    #[error("invalid unseal key")]
    InvalidUnsealKey,

    /// The access key does not match the stored one.
    #[error("invalid access key")]
    InvalidAccessKey,

    /// The barrier rejected the operation.
    #[error(transparent)]
    Barrier(#[from] BarrierError),

    /// Token or ACL handling failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Secret-sharing split failed.
    #[error(transparent)]
    Shamir(#[from] ShamirError),

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The storage backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] StorageError),
}
