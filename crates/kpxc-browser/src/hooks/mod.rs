// ============================================
// File: crates/kpxc-browser/src/hooks/mod.rs
// ============================================
//! # Interception Hooks
//!
//! ## Creation Reason
//! The interceptor sees every decrypted payload in both directions. What it
//! does with them is pluggable: log them, rewrite them, or leave them alone.
//!
//! ## Main Functionality
//! - [`InterceptHook`]: callbacks on decrypted request/response payloads
//! - [`InterceptContext`]: the interceptor's own keys
//! - [`PassthroughHook`]: changes nothing
//! - [`IdKeySubstitution`]: registers the interceptor's id key upstream in
//!   place of the client's and maps it back on later requests
//! - [`TracingHook`]: logs payloads at debug level, then delegates
//!
//! ## Hook Position
//! ```text
//! client ──box──► Interceptor ──decrypt──► on_request ──seal──► KeePassXC
//! client ◄──box── Interceptor ◄──seal──── on_response ◄─decrypt── KeePassXC
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A hook error aborts the exchange and closes the interceptor
//! - Hooks must not touch `status.nonce`; the interceptor rewrites it
//!   after `on_response`
//!
//! ## Last Modified
//! v0.1.0 - Initial hooks

use std::collections::HashSet;

use tracing::debug;

use kpxc_core::{BoxPublicKey, RequestPayload, ResponsePayload};

use crate::error::Result;

// ============================================
// Hook Trait
// ============================================

/// Keys the interceptor presents to both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptContext {
    /// Session public key shown to the client and to KeePassXC.
    pub session_key: BoxPublicKey,
    /// The interceptor's own id key.
    pub id_key: BoxPublicKey,
}

/// Callbacks on decrypted payloads.
pub trait InterceptHook: Send {
    /// Called after a client request is opened, before it is re-sealed.
    ///
    /// # Errors
    /// Any error aborts the exchange.
    fn on_request(&mut self, _ctx: &InterceptContext, _request: &mut RequestPayload) -> Result<()> {
        Ok(())
    }

    /// Called after a KeePassXC reply is opened, before it is re-sealed.
    ///
    /// # Errors
    /// Any error aborts the exchange.
    fn on_response(
        &mut self,
        _ctx: &InterceptContext,
        _response: &mut ResponsePayload,
    ) -> Result<()> {
        Ok(())
    }
}

impl<H: InterceptHook + ?Sized> InterceptHook for Box<H> {
    fn on_request(&mut self, ctx: &InterceptContext, request: &mut RequestPayload) -> Result<()> {
        (**self).on_request(ctx, request)
    }

    fn on_response(&mut self, ctx: &InterceptContext, response: &mut ResponsePayload) -> Result<()> {
        (**self).on_response(ctx, response)
    }
}

// ============================================
// PassthroughHook
// ============================================

/// Leaves every payload unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughHook;

impl InterceptHook for PassthroughHook {}

// ============================================
// IdKeySubstitution
// ============================================

/// Replaces the client's id key with the interceptor's.
///
/// KeePassXC only ever learns the interceptor's id key. Keys the client
/// registered through this hook are mapped back on `test-associate` and
/// `get-logins`; unknown keys pass untouched.
#[derive(Debug, Default)]
pub struct IdKeySubstitution {
    replaced: HashSet<BoxPublicKey>,
}

impl IdKeySubstitution {
    /// Creates an empty substitution table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` was replaced on an earlier `associate`.
    pub fn has_replaced(&self, key: &BoxPublicKey) -> bool {
        self.replaced.contains(key)
    }

    fn map(&self, key: &mut BoxPublicKey, ctx: &InterceptContext) {
        if self.replaced.contains(key) {
            *key = ctx.id_key;
        }
    }
}

impl InterceptHook for IdKeySubstitution {
    fn on_request(&mut self, ctx: &InterceptContext, request: &mut RequestPayload) -> Result<()> {
        match request {
            RequestPayload::Associate(associate) => {
                if associate.id_key != ctx.id_key {
                    debug!(
                        client_id_key = %associate.id_key.fingerprint(),
                        substitute = %ctx.id_key.fingerprint(),
                        "Substituting id key on associate"
                    );
                    self.replaced.insert(associate.id_key);
                    associate.id_key = ctx.id_key;
                }
            }
            RequestPayload::TestAssociate(test) => self.map(&mut test.key, ctx),
            RequestPayload::GetLogins(logins) => {
                for entry in &mut logins.keys {
                    self.map(&mut entry.key, ctx);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// ============================================
// TracingHook
// ============================================

/// Logs each decrypted payload, then delegates to `inner`.
#[derive(Debug, Default)]
pub struct TracingHook<H> {
    inner: H,
}

impl<H: InterceptHook> TracingHook<H> {
    /// Wraps `inner`.
    pub const fn new(inner: H) -> Self {
        Self { inner }
    }

    /// The wrapped hook.
    pub const fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: InterceptHook> InterceptHook for TracingHook<H> {
    fn on_request(&mut self, ctx: &InterceptContext, request: &mut RequestPayload) -> Result<()> {
        debug!(
            action = %request.action(),
            payload = %String::from_utf8_lossy(&request.to_json()?),
            "Intercepted request"
        );
        self.inner.on_request(ctx, request)
    }

    fn on_response(&mut self, ctx: &InterceptContext, response: &mut ResponsePayload) -> Result<()> {
        debug!(
            action = %response.action(),
            payload = %String::from_utf8_lossy(&response.to_json()?),
            "Intercepted response"
        );
        self.inner.on_response(ctx, response)
    }
}
