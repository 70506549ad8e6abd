// ============================================
// File: crates/kpxc-browser/src/handlers/mod.rs
// ============================================
//! # Request Handlers
//!
//! ## Creation Reason
//! The proxy server reads raw frames from the browser side and needs one
//! answer per frame. How that answer is produced depends on the mode.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`proxy`]: forwards bytes unchanged
//! - [`mitm`]: terminates both encrypted legs and re-seals every payload
//!
//! ## Handler Architecture
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Handlers                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌────────────────────┐        ┌──────────────────────────┐  │
//! │  │ PassthroughHandler │        │ Interceptor              │  │
//! │  │                    │        │                          │  │
//! │  │ - send raw         │        │ - swap public keys       │  │
//! │  │ - receive reply    │        │ - open, hook, re-seal    │  │
//! │  │                    │        │ - remap nonces per leg   │  │
//! │  └────────────────────┘        └──────────────────────────┘  │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - One request in flight per handler; the server loop is sequential
//! - `is_closed` tells the server loop to stop after an error
//! - `close` runs on every server exit; no upstream leg outlives the browser side
//!
//! ## Last Modified
//! v0.1.0 - Initial handlers structure

use async_trait::async_trait;

use crate::error::Result;

pub mod mitm;
pub mod proxy;

pub use mitm::Interceptor;
pub use proxy::PassthroughHandler;

/// Turns one request frame from the browser side into one reply frame.
#[async_trait]
pub trait RequestHandler: Send {
    /// Produces the reply to `request`.
    ///
    /// # Errors
    /// Anything that prevents a reply; the server logs it and carries on
    /// unless [`Self::is_closed`] is now true.
    async fn handle(&mut self, request: &[u8]) -> Result<Vec<u8>>;

    /// Whether the handler can no longer serve requests.
    fn is_closed(&self) -> bool {
        false
    }

    /// Releases the upstream connection. Must be idempotent.
    async fn close(&mut self);
}
