// ============================================
// File: crates/kpxc-core/src/lib.rs
// ============================================
//! # KPXC Core - Protocol Engine Primitives
//!
//! ## Creation Reason
//! Holds everything about the KeePassXC browser protocol that does not touch
//! a socket: key material, nonce discipline, authenticated box encryption,
//! the message envelope and the typed per-action payload catalog.
//!
//! ## Main Functionality
//! - [`crypto`]: Session keys, nonces, X25519 + XSalsa20-Poly1305 box
//! - [`identity`]: Per-session identity and the persisted association record
//! - [`protocol`]: Envelope, action names and typed payloads
//! - [`error`]: Core error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                kpxc-browser                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │     kpxc-core  ◄──     kpxc-transport              │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │               kpxc-common                          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL cryptography comes from RustCrypto (`crypto_box`), no custom primitives
//! - Secret key bytes are zeroed on drop
//! - Randomness is always injected, nothing here calls a global rng implicitly
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod identity;
pub mod protocol;

pub use crypto::{BoxCipher, BoxPublicKey, Nonce, RandomSource, SessionKeyPair};
pub use error::{CoreError, Result};
pub use identity::{AssociationRecord, Identity};
pub use protocol::{
    Action, ActionRequest, ActionResponse, Envelope, Notification, RequestPayload,
    ResponsePayload,
};
