// ============================================
// File: crates/kpxc-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes the NaCl-compatible box construction the KeePassXC browser
//! protocol is built on, using the audited RustCrypto `crypto_box` crate.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`keys`]: Session key pair and encoded public keys
//! - [`nonce`]: 24-byte nonce with the libsodium increment rule
//! - [`boxed`]: Authenticated public-key encryption (`SalsaBox`)
//!
//! ## Cryptographic Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  change-public-keys                         │
//! │  Client                                        Server       │
//! │    │  publicKey (clear, base64) ─────────────────► │        │
//! │    │ ◄───────────────── publicKey (clear, base64)  │        │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    every other action                       │
//! │                                                             │
//! │  own secret + peer public + nonce N ──► XSalsa20-Poly1305   │
//! │  response must carry N + 1 and is sealed under N + 1        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER roll your own crypto
//! - A (key, nonce) pair must never be used twice
//! - Randomness comes from an injected [`RandomSource`]
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod boxed;
pub mod keys;
pub mod nonce;

pub use boxed::BoxCipher;
pub use keys::{BoxPublicKey, SessionKeyPair};
pub use nonce::Nonce;

use rand::{CryptoRng, RngCore};

// ============================================
// Constants
// ============================================

/// Size of an X25519 public or secret key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of a box nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

// ============================================
// RandomSource
// ============================================

/// Cryptographically secure random source that can be handed to a session.
///
/// Blanket-implemented for every `RngCore + CryptoRng + Send` type, so
/// production code passes `rand::rngs::OsRng` and tests pass a seeded
/// `rand::rngs::StdRng`.
pub trait RandomSource: RngCore + CryptoRng + Send {}

impl<T: RngCore + CryptoRng + Send> RandomSource for T {}

/// Returns the operating system random source, boxed.
#[must_use]
pub fn os_random() -> Box<dyn RandomSource> {
    Box::new(rand::rngs::OsRng)
}
