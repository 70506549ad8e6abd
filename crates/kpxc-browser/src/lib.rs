// ============================================
// File: crates/kpxc-browser/src/lib.rs
// ============================================
//! # KeePassXC Browser Library
//!
//! ## Creation Reason
//! Speaks the KeePassXC browser protocol from the extension's side, and can
//! stand between a real extension and KeePassXC as a proxy, either passing
//! bytes through or terminating the encryption on both sides.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`client`]: Protocol client (handshake, association, typed actions)
//! - [`handlers`]: Request handlers for the proxy server
//!   - [`handlers::proxy`]: Byte pass-through
//!   - [`handlers::mitm`]: Intercepting handler
//! - [`hooks`]: Payload hooks for the intercepting handler
//! - [`server`]: Proxy request loop
//! - [`exchange`]: Reply reception shared by client and handlers
//! - [`config`]: TOML configuration
//! - [`discovery`]: KeePassXC socket discovery
//! - [`association`]: Association record persistence
//! - [`error`]: Browser-side error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         kpxc-browser                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐    │
//! │  │   Config    │────►│   Client    │────►│  Association    │    │
//! │  │  Discovery  │     │             │     │     Store       │    │
//! │  └─────────────┘     └──────┬──────┘     └─────────────────┘    │
//! │                             │                                   │
//! │  ┌─────────────┐     ┌──────┴──────┐     ┌─────────────────┐    │
//! │  │   Server    │────►│  Handlers   │────►│     Hooks       │    │
//! │  │    Loop     │     │ proxy/mitm  │     │                 │    │
//! │  └─────────────┘     └──────┬──────┘     └─────────────────┘    │
//! │                             │                                   │
//! ├─────────────────────────────┼───────────────────────────────────┤
//! │        kpxc-core            │          kpxc-transport           │
//! │  identity, box, envelope    └──►  unix socket, stdio frames     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//! Client:  payload → seal(N) → KeePassXC → verify N+1 → open → record
//! Proxy:   browser → [open → hook → seal(M)] → KeePassXC → [verify M+1 → open → hook → seal(N+1)] → browser
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - One request in flight per connection, everywhere
//! - Integrity failures close the session; remote errors do not
//! - In proxy mode stdout carries frames; log to stderr only
//!
//! ## Last Modified
//! v0.1.0 - Initial browser library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod association;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod exchange;
pub mod handlers;
pub mod hooks;
pub mod server;

#[cfg(test)]
mod testing;

// Re-export primary types
pub use association::AssociationStore;
pub use client::{ClientOptions, ClientState, ProtocolClient};
pub use config::{BrowserConfig, ProxyMode};
pub use error::{BrowserError, Result};
pub use handlers::{Interceptor, PassthroughHandler, RequestHandler};
pub use hooks::{IdKeySubstitution, InterceptContext, InterceptHook, PassthroughHook, TracingHook};
pub use server::{ServeStats, Server};
