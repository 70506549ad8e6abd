// ============================================
// File: crates/kpxc-core/src/crypto/nonce.rs
// ============================================
//! # Box Nonce
//!
//! ## Creation Reason
//! Every request carries a fresh random 24-byte nonce; the matching
//! response must carry that nonce incremented by one. The increment doubles
//! as request/response correlation and as replay protection.
//!
//! ## Increment Rule
//! ```text
//! nonce = little-endian unsigned integer over 24 bytes
//! next  = nonce + 1 (mod 2^192)
//!
//! [ff ff 00 ..] ──► [00 00 01 ..]
//! [ff ff .. ff] ──► [00 00 .. 00]   (wraps)
//! ```
//! This is libsodium's `sodium_increment`, which KeePassXC uses.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Changing the increment rule breaks every nonce check against KeePassXC
//! - Nonces are never reused across requests, always draw a fresh one
//!
//! ## Last Modified
//! v0.1.0 - Initial nonce type

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::NONCE_SIZE;
use crate::error::{CoreError, Result};

/// 24-byte box nonce.
///
/// # Example
/// ```
/// use kpxc_core::crypto::Nonce;
///
/// let nonce = Nonce::from_bytes(&[0xff; 24]).unwrap();
/// assert_eq!(nonce.increment().as_bytes(), &[0u8; 24]);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Draws a fresh nonce from the given random source.
    #[must_use]
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Creates a nonce from raw bytes.
    ///
    /// # Errors
    /// Returns `MalformedEnvelope` if the length is not 24 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let nonce: [u8; NONCE_SIZE] = bytes.try_into().map_err(|_| {
            CoreError::malformed(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(nonce))
    }

    /// Decodes a nonce from its base64 wire form.
    ///
    /// # Errors
    /// Returns `MalformedEnvelope` on bad base64 or a wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CoreError::malformed(format!("nonce is not base64: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Encodes the nonce for the wire.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Returns the raw nonce bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Returns the successor nonce (little-endian add one, wrapping).
    #[must_use]
    pub fn increment(&self) -> Self {
        let mut next = self.0;
        for byte in &mut next {
            let (value, overflow) = byte.overflowing_add(1);
            *byte = value;
            if !overflow {
                break;
            }
        }
        Self(next)
    }

    /// Returns `true` if `other` is exactly this nonce incremented by one.
    #[must_use]
    pub fn is_followed_by(&self, other: &Self) -> bool {
        self.increment() == *other
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.to_base64())
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl Serialize for Nonce {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Nonce {
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
