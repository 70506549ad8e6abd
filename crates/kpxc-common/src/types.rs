// ============================================
// File: crates/kpxc-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Identifiers that travel in clear text in every envelope. They carry no
//! security weight, the peer only uses them for logging and routing.
//!
//! ## Main Functionality
//! - `ClientId`: Per-process client identifier (`clientID` field)
//! - `RequestId`: Correlation id for long-running actions (`requestID` field)
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both serialize as plain JSON strings, keep it that way for wire compatibility
//! - Random generation takes the caller's rng so tests stay deterministic
//!
//! ## Last Modified
//! v0.1.0 - Initial identifier types

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// Constants
// ============================================

/// Number of random bytes behind a generated `ClientId`.
pub const CLIENT_ID_RANDOM_BYTES: usize = 24;

// ============================================
// ClientId
// ============================================

/// Clear-text identifier of a protocol client.
///
/// # Wire Format
/// Sent as the `clientID` string of every request envelope. A generated id
/// is the standard base64 encoding of 24 random bytes.
///
/// # Example
/// ```
/// use kpxc_common::types::ClientId;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let id = ClientId::generate(&mut rng);
/// assert_eq!(id.as_str().len(), 32);
///
/// let named: ClientId = "my-client".parse().unwrap();
/// assert_eq!(named.to_string(), "my-client");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generates a random client id from the given source.
    #[must_use]
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; CLIENT_ID_RANDOM_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(BASE64.encode(bytes))
    }

    /// Returns the id as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClientId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(CommonError::invalid_input("client_id", "cannot be empty"));
        }
        Ok(Self(s.to_string()))
    }
}

// ============================================
// RequestId
// ============================================

/// Correlation id attached to requests that may outlive the default timeout.
///
/// `generate-password` is answered only after user interaction, so the
/// request carries one of these alongside the nonce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a random eight digit request id.
    #[must_use]
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        Self(format!("{:08}", rng.next_u32() % 100_000_000))
    }

    /// Returns the id as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================
// Tests
// ============================================
