// ============================================
// File: crates/kpxc-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the KeePassXC browser wire protocol: the clear JSON envelope,
//! the action names and the typed payloads sealed inside `message`.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`action`]: Action names and the encryption matrix
//! - [`envelope`]: Outer JSON message
//! - [`payload`]: Typed request/response records and closed payload enums
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Handshake Phase                          │
//! │  Client ── change-public-keys {publicKey} ─────────► Server │
//! │  Client ◄──────────────── {publicKey, nonce+1} ───── Server │
//! │  Client ── associate / test-associate (sealed) ────► Server │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Action Phase                             │
//! │  Client ── {action, nonce N, message} ─────────────► Server │
//! │  Client ◄────────── {nonce N+1, message} ─────────── Server │
//! │  Client ◄────────── {action: database-locked} ────── Server │
//! │                      (unsolicited, any time)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Field names are fixed by KeePassXC and the browser extensions
//! - Unknown fields must survive a decode/encode cycle
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod action;
pub mod envelope;
pub(crate) mod lenient;
pub mod payload;

pub use action::{Action, Notification};
pub use envelope::Envelope;
pub use payload::{
    ActionRequest, ActionResponse, AssociateRequest, AssociateResponse, AssociationKey,
    CreateNewGroupRequest, CreateNewGroupResponse, GeneratePasswordRequest,
    GeneratePasswordResponse, GetDatabaseGroupsRequest, GetDatabaseGroupsResponse,
    GetDatabaseHashRequest, GetDatabaseHashResponse, GetLoginsRequest, GetLoginsResponse,
    GetTotpRequest, GetTotpResponse, GroupNode, GroupTree, LockDatabaseRequest,
    LockDatabaseResponse, LoginEntry, RequestPayload, ResponsePayload, ResponseStatus,
    SetLoginRequest, SetLoginResponse, TestAssociateRequest, TestAssociateResponse,
};

/// Name of the KeePassXC browser socket.
pub const SOCKET_NAME: &str = "org.keepassxc.KeePassXC.BrowserServer";

/// Receive buffer size for one protocol message (1 MiB).
pub const BUF_SIZE: usize = 1024 * 1024;
