// ============================================
// File: crates/kpxc-core/src/crypto/keys.rs
// ============================================
//! # Cryptographic Key Types
//!
//! ## Creation Reason
//! Key types for the box construction with proper security properties
//! (secret bytes zeroed on drop, public halves safe to log as fingerprints).
//!
//! ## Main Functionality
//! - `SessionKeyPair`: X25519 key pair, fresh for every session
//! - `BoxPublicKey`: 32-byte public key with base64 wire encoding
//!
//! ## Key Lifecycle
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  SessionKeyPair (per run)                                  │
//! │  ├─ Generated from the injected random source              │
//! │  ├─ Public half sent with change-public-keys               │
//! │  └─ Secret half seals and opens every payload              │
//! │                                                            │
//! │  Id key (long-term, public half only)                      │
//! │  ├─ Generated once, persisted by the embedding application │
//! │  └─ Registered with the server through associate           │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Secret bytes are zeroed on drop (manual Drop, zeroize 1.3 style)
//! - Never print secret material, `Debug` only shows the fingerprint
//!
//! ## Last Modified
//! v0.1.0 - Initial key type definitions

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::KEY_SIZE;
use crate::error::{CoreError, Result};

// ============================================
// SessionKeyPair
// ============================================

/// X25519 key pair used for one protocol session.
///
/// # Security
/// - Secret bytes are zeroed on drop
/// - `Clone` copies the secret; the interceptor relies on it to present
///   the same key on both of its legs
///
/// # Example
/// ```
/// use kpxc_core::crypto::SessionKeyPair;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(1);
/// let pair = SessionKeyPair::generate(&mut rng);
/// assert_eq!(pair.public_key().as_bytes().len(), 32);
/// ```
#[derive(Clone)]
pub struct SessionKeyPair {
    secret: [u8; KEY_SIZE],
    public: BoxPublicKey,
}

impl Drop for SessionKeyPair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl SessionKeyPair {
    /// Generates a new key pair from the given random source.
    #[must_use]
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut secret = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut secret);
        let pair = Self::from_secret_bytes(secret);
        secret.zeroize();
        pair
    }

    /// Builds a key pair from raw secret key bytes.
    #[must_use]
    pub fn from_secret_bytes(secret: [u8; KEY_SIZE]) -> Self {
        let public = crypto_box::SecretKey::from(secret).public_key();
        Self {
            secret,
            public: BoxPublicKey(*public.as_bytes()),
        }
    }

    /// Returns the public half.
    #[must_use]
    pub const fn public_key(&self) -> &BoxPublicKey {
        &self.public
    }

    /// Returns the secret key in the form `crypto_box` expects.
    pub(crate) fn secret_key(&self) -> crypto_box::SecretKey {
        crypto_box::SecretKey::from(self.secret)
    }
}

impl fmt::Debug for SessionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyPair")
            .field("public_key", &self.public)
            .finish_non_exhaustive()
    }
}

// ============================================
// BoxPublicKey
// ============================================

/// A 32-byte X25519 public key.
///
/// # Wire Format
/// Standard base64 (44 characters, padded) in the `publicKey`, `key` and
/// `idKey` fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxPublicKey([u8; KEY_SIZE]);

impl BoxPublicKey {
    /// Creates a public key from raw bytes.
    ///
    /// # Errors
    /// Returns `InvalidKey` if the length is not 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CoreError::invalid_key(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    /// Decodes a public key from its base64 wire form.
    ///
    /// # Errors
    /// Returns `InvalidKey` on bad base64 or a wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CoreError::invalid_key(format!("bad base64: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Encodes the key for the wire.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short, log-safe fingerprint: hex of the first 8 bytes of SHA-256(key).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }

    pub(crate) fn to_crypto_box(self) -> crypto_box::PublicKey {
        crypto_box::PublicKey::from(self.0)
    }
}

impl fmt::Debug for BoxPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxPublicKey({})", self.fingerprint())
    }
}

impl fmt::Display for BoxPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl Serialize for BoxPublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for BoxPublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

// ============================================
// Tests
// ============================================
