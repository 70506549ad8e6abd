// ============================================
// File: crates/kpxc-common/src/lib.rs
// ============================================
//! # KPXC Common - Shared Utilities Library
//!
//! ## Creation Reason
//! Provides the small set of identifier types and error definitions that
//! every other crate of the KeePassXC browser protocol stack relies on.
//!
//! ## Main Functionality
//! - [`types`]: Clear-text identifiers carried on the wire (`ClientId`, `RequestId`)
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                kpxc-browser                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │     kpxc-core          kpxc-transport              │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │              kpxc-common  ◄── You are here         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Nothing secret lives here; key material belongs to `kpxc-core`
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod types;

pub use error::{CommonError, Result};
pub use types::{ClientId, RequestId};
