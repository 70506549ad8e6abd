// ============================================
// File: crates/kpxc-browser/src/server.rs
// ============================================
//! # Proxy Server Loop
//!
//! ## Creation Reason
//! Native messaging hosts speak to the browser over a framed stream. This
//! loop reads one request at a time from that stream, hands it to a
//! [`RequestHandler`] and writes the reply back.
//!
//! ## Main Functionality
//! - `Server`: downstream connection plus a handler
//! - `serve`: the request loop until the browser side closes
//! - `run`: `serve` raced against Ctrl+C
//!
//! ## Server Loop
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Main Loop                           │
//! │                                                              │
//! │   receive(idle timeout) ──timeout──► loop                    │
//! │          │              ──closed───► stop                    │
//! │          ▼                                                   │
//! │   handler.handle ──error──► log, count ──handler closed──► stop
//! │          │                                                   │
//! │          ▼                                                   │
//! │   send(reply)                                                │
//! │                                                              │
//! │   any exit ──► handler.close (upstream leg)                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A failed request gets no reply; the browser side times out on it
//! - Strictly sequential: the protocol has one request in flight
//! - The upstream leg never outlives the browser side
//!
//! ## Last Modified
//! v0.1.0 - Initial server loop

use std::time::Duration;

use tracing::{debug, error, info, trace};

use kpxc_core::protocol::BUF_SIZE;
use kpxc_transport::Connection;

use crate::error::Result;
use crate::handlers::RequestHandler;

/// Default idle receive timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Requests read from the browser side.
    pub requests: u64,
    /// Requests the handler failed.
    pub failures: u64,
}

/// Request loop between a browser-side connection and a handler.
///
/// # Lifecycle
/// 1. Create with `Server::new(downstream, handler)`
/// 2. Run with `server.run().await` (or `serve` without signal handling)
/// 3. Stops when the browser side closes, the handler closes, or Ctrl+C
pub struct Server<D, H> {
    downstream: D,
    handler: H,
    idle_timeout: Option<Duration>,
    max_message_size: usize,
}

impl<D: Connection, H: RequestHandler> Server<D, H> {
    /// Creates a server with default limits.
    pub fn new(downstream: D, handler: H) -> Self {
        Self {
            downstream,
            handler,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            max_message_size: BUF_SIZE,
        }
    }

    /// Sets the idle receive timeout and the largest accepted request.
    #[must_use]
    pub fn with_limits(mut self, idle_timeout: Option<Duration>, max_message_size: usize) -> Self {
        self.idle_timeout = idle_timeout;
        self.max_message_size = max_message_size;
        self
    }

    /// The request handler.
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Serves requests until the browser side closes, then closes the
    /// handler's upstream leg.
    ///
    /// # Errors
    /// The handler's error once the handler reports itself closed, or a
    /// transport error other than timeout/close on the browser side.
    pub async fn serve(&mut self) -> Result<ServeStats> {
        let outcome = self.serve_requests().await;
        self.handler.close().await;
        outcome
    }

    async fn serve_requests(&mut self) -> Result<ServeStats> {
        let mut stats = ServeStats::default();

        loop {
            let request = match self
                .downstream
                .receive(self.max_message_size, self.idle_timeout)
                .await
            {
                Ok(request) => request,
                Err(e) if e.is_timeout() => {
                    trace!("Idle, still waiting");
                    continue;
                }
                Err(e) if e.is_closed() => {
                    info!("Browser side closed");
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            stats.requests += 1;

            match self.handler.handle(&request).await {
                Ok(reply) => {
                    if let Err(e) = self.downstream.send(&reply).await {
                        if e.is_closed() {
                            info!("Browser side closed before reply");
                            break;
                        }
                        return Err(e.into());
                    }
                    debug!(request = request.len(), reply = reply.len(), "Request served");
                }
                Err(e) => {
                    stats.failures += 1;
                    error!(error = %e, "Request failed");
                    if self.handler.is_closed() {
                        return Err(e);
                    }
                }
            }
        }

        info!(requests = stats.requests, failures = stats.failures, "Server loop finished");
        Ok(stats)
    }

    /// Serves until the browser side closes or Ctrl+C, then closes both
    /// legs.
    ///
    /// # Errors
    /// See [`Self::serve`].
    pub async fn run(mut self) -> Result<ServeStats> {
        info!("Proxy started");
        let outcome = tokio::select! {
            result = self.serve_requests() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                Ok(ServeStats::default())
            }
        };

        self.handler.close().await;
        if let Err(e) = self.downstream.close().await {
            debug!(error = %e, "Browser-side close failed");
        }
        info!("Proxy shutdown complete");
        outcome
    }
}
