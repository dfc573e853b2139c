//! Cryptographic primitives for Strongbox.
//!
//! Provides AES-256-GCM authenticated encryption behind a closed
//! [`CipherKind`] enumeration. Every encryption draws a fresh 96-bit
//! nonce from the OS CSPRNG; the ciphertext format is
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//!
//! Constructed AEAD instances are cached per key digest to avoid
//! re-running the AES key schedule on hot paths. Correctness never
//! depends on the cache.
//!
//! Generated key material is returned in [`Zeroizing`] buffers so it is
//! wiped when it leaves scope.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::hash;

/// Key length for AES-256-GCM.
pub const AES256_GCM_KEY_SIZE: usize = 32;

/// Nonce length for AES-256-GCM (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Tag length for AES-256-GCM.
pub const TAG_SIZE: usize = 16;

/// The supported authenticated ciphers.
///
/// Closed enumeration; persisted as a numeric tag so that records written
/// by one process version stay readable by later ones. Decoding an
/// unrecognized tag fails with [`CryptoError::UnknownCipher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum CipherKind {
    /// AES-256-GCM: 32-byte key, 12-byte nonce, 16-byte tag.
    Aes256Gcm,
}

impl CipherKind {
    /// Key length in bytes for this cipher.
    #[must_use]
    pub fn key_size(self) -> usize {
        match self {
            CipherKind::Aes256Gcm => AES256_GCM_KEY_SIZE,
        }
    }
}

impl From<CipherKind> for u32 {
    fn from(kind: CipherKind) -> u32 {
        match kind {
            CipherKind::Aes256Gcm => 1,
        }
    }
}

impl TryFrom<u32> for CipherKind {
    type Error = CryptoError;

    fn try_from(value: u32) -> Result<Self, CryptoError> {
        match value {
            1 => Ok(CipherKind::Aes256Gcm),
            other => Err(CryptoError::UnknownCipher {
                kind: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for CipherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherKind::Aes256Gcm => f.write_str("AES256_GCM"),
        }
    }
}

/// Ensure the given key has the correct length for the cipher.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] for an empty or wrong-length key.
pub fn validate_key(kind: CipherKind, key: &[u8]) -> Result<(), CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::InvalidKey {
            reason: "key cannot be empty".to_owned(),
        });
    }
    if key.len() != kind.key_size() {
        return Err(CryptoError::InvalidKey {
            reason: format!(
                "key must be {} bytes for {kind}, not {}",
                kind.key_size(),
                key.len()
            ),
        });
    }
    Ok(())
}

/// Generate a fresh random key for the given cipher from the OS CSPRNG.
///
/// The returned buffer is zeroized when dropped.
#[must_use]
pub fn generate_key(kind: CipherKind) -> Zeroizing<Vec<u8>> {
    match kind {
        CipherKind::Aes256Gcm => {
            let key = Aes256Gcm::generate_key(OsRng);
            Zeroizing::new(key.to_vec())
        }
    }
}

/// Encrypt `plaintext` with a fresh random nonce.
///
/// Returns `nonce || ciphertext || tag`. Nonces are drawn independently
/// per call; reuse detection is not attempted — rotate keys well before
/// the ~2^32-message birthday bound.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] for a bad key and
/// [`CryptoError::Aead`] if the AEAD operation fails.
pub fn encrypt(kind: CipherKind, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    validate_key(kind, key)?;

    match kind {
        CipherKind::Aes256Gcm => {
            let cipher = cached_cipher(key);
            let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
            let ciphertext = cipher
                .encrypt(&nonce, plaintext)
                .map_err(|e| CryptoError::Aead {
                    reason: e.to_string(),
                })?;

            let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
            combined.extend_from_slice(&nonce);
            combined.extend_from_slice(&ciphertext);
            Ok(combined)
        }
    }
}

/// Decrypt a `nonce || ciphertext || tag` blob produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] for a bad key and
/// [`CryptoError::Aead`] when the input is too short or authentication
/// fails (wrong key, corrupted data, tampered tag).
pub fn decrypt(kind: CipherKind, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    validate_key(kind, key)?;

    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Aead {
            reason: format!(
                "ciphertext too short: expected at least {} bytes, got {}",
                NONCE_SIZE + TAG_SIZE,
                data.len()
            ),
        });
    }

    match kind {
        CipherKind::Aes256Gcm => {
            let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
            let nonce = Nonce::from_slice(nonce_bytes);
            let cipher = cached_cipher(key);

            cipher
                .decrypt(nonce, ciphertext)
                .map_err(|e| CryptoError::Aead {
                    reason: e.to_string(),
                })
        }
    }
}

/// Fetch or construct the AEAD instance for a key.
///
/// Keyed by the FNV-1a digest of the key bytes, so re-keying with the
/// same key on a hot path reuses the expanded schedule.
fn cached_cipher(key: &[u8]) -> Aes256Gcm {
    static CACHE: OnceLock<RwLock<HashMap<u64, Aes256Gcm>>> = OnceLock::new();

    let cache = CACHE.get_or_init(|| RwLock::new(HashMap::new()));
    let digest = hash::fnv1a_64(key);

    if let Ok(map) = cache.read() {
        if let Some(cipher) = map.get(&digest) {
            return cipher.clone();
        }
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    if let Ok(mut map) = cache.write() {
        map.insert(digest, cipher.clone());
    }
    cipher
}
