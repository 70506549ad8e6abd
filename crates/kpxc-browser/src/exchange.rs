// ============================================
// File: crates/kpxc-browser/src/exchange.rs
// ============================================
//! # Reply Reception
//!
//! ## Creation Reason
//! The client, the pass-through proxy and the interceptor all wait for
//! KeePassXC's answer to one request. KeePassXC is not always clean about
//! it, so the quirks are absorbed here, once.
//!
//! ## Receive Quirks
//! ```text
//! send(request)
//!   receive ──► 2 bytes?            ──► receive once more
//!   parse   ──► notification while
//!               awaiting another
//!               action?             ──► receive once more
//!   reply
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Exactly ONE extra receive per quirk. This reproduces what KeePassXC
//!   has been seen to do; it is not a documented protocol rule, and a
//!   second stray frame or a second notification will surface as an error
//! - The extra receive reuses the caller's timeout
//!
//! ## Last Modified
//! v0.1.0 - Initial reply reception

use std::time::Duration;

use tracing::debug;

use kpxc_core::{Action, CoreError, Envelope, Nonce};
use kpxc_transport::Connection;

use crate::error::Result;

/// Length of the stray frame KeePassXC occasionally emits before a reply.
pub const STRAY_FRAME_LEN: usize = 2;

/// Receives one message, discarding a single two-byte stray frame.
///
/// # Errors
/// Transport errors from either receive.
pub async fn receive_skipping_stray<C>(
    conn: &mut C,
    max_bytes: usize,
    timeout: Option<Duration>,
) -> Result<Vec<u8>>
where
    C: Connection + ?Sized,
{
    let raw = conn.receive(max_bytes, timeout).await?;
    if raw.len() != STRAY_FRAME_LEN {
        return Ok(raw);
    }
    debug!("Discarding two-byte frame");
    Ok(conn.receive(max_bytes, timeout).await?)
}

/// Receives and parses the reply to a request for `expected`.
///
/// # Errors
/// Transport errors, or `MalformedEnvelope` if the reply is not an envelope.
pub async fn receive_reply<C>(
    conn: &mut C,
    expected: Action,
    max_bytes: usize,
    timeout: Option<Duration>,
) -> Result<Envelope>
where
    C: Connection + ?Sized,
{
    let raw = receive_skipping_stray(conn, max_bytes, timeout).await?;
    let reply = Envelope::parse(&raw)?;

    let unsolicited = reply
        .action()
        .map(|action| action.is_notification() && action != expected)
        .unwrap_or(false);
    if !unsolicited {
        return Ok(reply);
    }

    debug!(
        action = %expected,
        notification = %reply.action,
        "Skipping notification received while awaiting reply"
    );
    let raw = conn.receive(max_bytes, timeout).await?;
    Ok(Envelope::parse(&raw)?)
}

/// Checks the clear part of a reply to a request sent with `nonce`.
///
/// Status first (a server error carries no usable nonce), then
/// [`verify_reply`]. Returns the reply nonce.
///
/// # Errors
/// `Remote`, `UnexpectedAction` or `NonceMismatch`.
pub fn check_reply(nonce: &Nonce, expected: Action, reply: &Envelope) -> Result<Option<Nonce>> {
    reply.check_status()?;
    verify_reply(nonce, expected, reply)
}

/// Checks the action name, then the nonce whenever the reply carries one.
///
/// Unlike [`check_reply`] this accepts error replies, so a relay can pass
/// them on after checking they answer the request it sent.
///
/// # Errors
/// `UnexpectedAction` or `NonceMismatch`.
pub fn verify_reply(nonce: &Nonce, expected: Action, reply: &Envelope) -> Result<Option<Nonce>> {
    if reply.action != expected.as_str() {
        return Err(CoreError::unexpected(expected.as_str(), reply.action.clone()).into());
    }
    let reply_nonce = reply.nonce()?;
    if let Some(reply_nonce) = &reply_nonce {
        if !nonce.is_followed_by(reply_nonce) {
            return Err(CoreError::NonceMismatch.into());
        }
    }
    Ok(reply_nonce)
}
