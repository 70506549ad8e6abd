// ============================================
// File: crates/kpxc-browser/src/handlers/proxy.rs
// ============================================
//! Pass-through forwarding: bytes in, bytes out, nothing opened.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use kpxc_transport::Connection;

use crate::error::Result;
use crate::exchange::receive_skipping_stray;
use crate::handlers::RequestHandler;

/// Forwards each request unchanged and returns KeePassXC's raw reply.
pub struct PassthroughHandler<C> {
    upstream: C,
    max_message_size: usize,
    timeout: Option<Duration>,
    closed: bool,
}

impl<C: Connection> PassthroughHandler<C> {
    /// Wraps an already connected upstream connection.
    pub fn new(upstream: C, max_message_size: usize, timeout: Option<Duration>) -> Self {
        Self {
            upstream,
            max_message_size,
            timeout,
            closed: false,
        }
    }
}

#[async_trait]
impl<C: Connection> RequestHandler for PassthroughHandler<C> {
    async fn handle(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        trace!(bytes = request.len(), "Forwarding request");
        let outcome = async {
            self.upstream.send(request).await?;
            receive_skipping_stray(&mut self.upstream, self.max_message_size, self.timeout).await
        }
        .await;

        match outcome {
            Ok(reply) => {
                debug!(request = request.len(), reply = reply.len(), "Forwarded exchange");
                Ok(reply)
            }
            Err(e) => {
                if e.is_closed() {
                    self.closed = true;
                }
                Err(e)
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) {
        self.closed = true;
        if let Err(e) = self.upstream.close().await {
            debug!(error = %e, "Upstream close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpxc_transport::MockConnection;

    #[tokio::test]
    async fn test_bytes_are_forwarded_verbatim() {
        let upstream = MockConnection::with_responder(|_| vec![b"{}".to_vec(), b"reply".to_vec()]);
        let handle = upstream.handle();
        let mut handler = PassthroughHandler::new(upstream, 1024, None);

        let reply = handler.handle(b"{\"action\":\"get-totp\"}").await.unwrap();
        assert_eq!(reply, b"reply");
        assert_eq!(handle.take_sent(), vec![b"{\"action\":\"get-totp\"}".to_vec()]);
        assert!(!handler.is_closed());
    }

    #[tokio::test]
    async fn test_closed_upstream_closes_handler() {
        let upstream = MockConnection::new();
        let mut handler = PassthroughHandler::new(upstream, 1024, None);

        let err = handler.handle(b"x").await.unwrap_err();
        assert!(err.is_closed());
        assert!(handler.is_closed());
    }

    #[tokio::test]
    async fn test_close_releases_upstream() {
        let upstream = MockConnection::new();
        let handle = upstream.handle();
        let mut handler = PassthroughHandler::new(upstream, 1024, None);

        handler.close().await;
        assert!(handler.is_closed());
        assert!(!handle.is_connected());
    }
}
