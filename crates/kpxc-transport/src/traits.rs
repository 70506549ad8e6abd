// ============================================
// File: crates/kpxc-transport/src/traits.rs
// ============================================
//! # Connection Trait
//!
//! ## Creation Reason
//! The protocol engine only needs a dumb duplex pipe. This trait is that
//! pipe, so the client, the proxy and the interceptor run unchanged over a
//! Unix socket, a stdio stream or a scripted mock.
//!
//! ## Main Functionality
//! - `Connection`: connect / send / receive-with-timeout / close
//! - `with_deadline`: maps an elapsed optional deadline to `Timeout`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Methods take `&mut self`: a connection has exactly one owner and at
//!   most one request in flight
//! - `receive` must be cancel-safe, timeouts are implemented by dropping
//!   the pending read
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, TransportError};

// ============================================
// Connection Trait
// ============================================

/// Abstract duplex message pipe.
///
/// # Example
/// ```ignore
/// async fn echo<C: Connection>(conn: &mut C) -> Result<()> {
///     let frame = conn.receive(1024 * 1024, None).await?;
///     conn.send(&frame).await
/// }
/// ```
#[async_trait]
pub trait Connection: Send {
    /// Opens the connection to `address`.
    ///
    /// # Errors
    /// `ConnectFailed` if the endpoint cannot be reached.
    async fn connect(&mut self, address: &str) -> Result<()>;

    /// Writes one message.
    ///
    /// # Errors
    /// `NotConnected` before `connect`, `SendFailed`/`Io` on write errors.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Reads one message of at most `max_bytes`.
    ///
    /// `None` waits forever.
    ///
    /// # Errors
    /// `Timeout` if the deadline elapses, `ConnectionClosed` on EOF.
    async fn receive(&mut self, max_bytes: usize, timeout: Option<Duration>) -> Result<Vec<u8>>;

    /// Closes the connection. Closing twice is not an error.
    ///
    /// # Errors
    /// Returns error if the shutdown itself fails.
    async fn close(&mut self) -> Result<()>;

    /// Returns `true` while connected.
    fn is_connected(&self) -> bool;
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Box<C> {
    async fn connect(&mut self, address: &str) -> Result<()> {
        (**self).connect(address).await
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data).await
    }

    async fn receive(&mut self, max_bytes: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        (**self).receive(max_bytes, timeout).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

// ============================================
// Helpers
// ============================================

/// Runs `future`, failing with `Timeout` if `deadline` elapses first.
///
/// # Errors
/// `Timeout` on deadline, otherwise whatever `future` returns.
pub async fn with_deadline<T, F>(operation: &str, deadline: Option<Duration>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| TransportError::timeout(operation, limit))?,
        None => future.await,
    }
}
