//! Deterministic byte-to-string encodings.
//!
//! [`Hash`] wraps a byte slice and renders it as base32 (extended-hex
//! alphabet, no padding), base64url (no padding), hex, or an FNV-1a
//! 64-bit digest. These are pure functions with no state; credential
//! derivation in the gatekeeper and token manager is built on them.

use std::hash::Hasher;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use data_encoding::BASE32HEX_NOPAD;
use fnv::FnvHasher;
use sha2::{Digest, Sha256};

/// FNV-1a 64-bit digest of a byte slice.
pub(crate) fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

/// SHA-256 digest of a byte slice, returned as raw bytes.
#[must_use]
pub fn sha256_bytes(bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(bytes).to_vec()
}

/// A byte slice with hashed and encoded renderings.
///
/// Frequently wraps secret material (random keys, KDF output), so `Debug`
/// redacts the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Hash(Vec<u8>);

impl Hash {
    /// Wrap the SHA-256 digest of `bytes`.
    #[must_use]
    pub fn sha256(bytes: &[u8]) -> Self {
        Hash(sha256_bytes(bytes))
    }

    /// Wrap already-computed bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Hash(bytes.into())
    }

    /// Decode a base64url (no padding) string. A failed decode yields an
    /// empty hash, which never matches any derived credential.
    #[must_use]
    pub fn from_base64url(s: &str) -> Self {
        Hash(URL_SAFE_NO_PAD.decode(s).unwrap_or_default())
    }

    /// Borrow the wrapped bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// FNV-1a 64-bit digest of the wrapped bytes.
    #[must_use]
    pub fn uint64(&self) -> u64 {
        fnv1a_64(&self.0)
    }

    /// Decimal rendering of [`uint64`](Hash::uint64).
    #[must_use]
    pub fn uint64_string(&self) -> String {
        self.uint64().to_string()
    }

    /// Base32 (extended-hex alphabet, no padding) rendering.
    #[must_use]
    pub fn base32(&self) -> String {
        BASE32HEX_NOPAD.encode(&self.0)
    }

    /// Base64url (no padding) rendering.
    #[must_use]
    pub fn base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hash")
            .field("len", &self.0.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
