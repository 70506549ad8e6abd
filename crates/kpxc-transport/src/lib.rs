// ============================================
// File: crates/kpxc-transport/src/lib.rs
// ============================================
//! # KPXC Transport - Byte-Stream Layer
//!
//! ## Creation Reason
//! The browser protocol runs over plain byte pipes. This crate provides
//! those pipes behind one trait so the protocol engine never touches
//! sockets directly.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: The `Connection` trait and deadline helper
//! - [`unix`]: Unix domain socket to KeePassXC (unframed)
//! - [`stream`]: Length-prefixed stream, stdin/stdout native messaging
//! - [`mock`]: Scripted in-memory connection (tests, `mock` feature)
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                kpxc-browser                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │     kpxc-core          kpxc-transport               │
//! │         │              You are here ◄──             │
//! │         ▼                                           │
//! │    kpxc-common                                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//!  Browser extension                     KeePassXC
//!        │  stdin/stdout (u32 LE framed)     ▲
//!        ▼                                   │ Unix socket (raw JSON)
//!  StreamConnection ──► kpxc-browser ──► UnixConnection
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always use the trait for testability
//! - Platform-specific code must be isolated (`unix` is cfg(unix))
//! - Mock implementation available with the `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod stream;
pub mod traits;
#[cfg(unix)]
pub mod unix;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export primary types
pub use error::{Result, TransportError};
pub use stream::StreamConnection;
pub use traits::{with_deadline, Connection};

#[cfg(unix)]
pub use unix::UnixConnection;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockConnection, MockHandle};
