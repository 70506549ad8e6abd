// ============================================
// File: crates/kpxc-transport/src/unix.rs
// ============================================
//! # Unix Socket Connection
//!
//! ## Creation Reason
//! KeePassXC listens on a Unix stream socket named
//! `org.keepassxc.KeePassXC.BrowserServer`. Messages are written raw,
//! without any length prefix.
//!
//! ## Receive Semantics
//! ```text
//! receive(max) ──► one read() of up to `max` bytes ──► whatever arrived
//! ```
//! One receive is one `read()`. The server writes each reply in a single
//! write, so in practice one read yields one message; the protocol client
//! deals with the occasional stray two-byte read.
//!
//! ## ⚠️ Important Note for Next Developer
//! - A zero-byte read is EOF and maps to `ConnectionClosed`
//! - Unix-only; the module is compiled out elsewhere
//!
//! ## Last Modified
//! v0.1.0 - Initial Unix connection

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{with_deadline, Connection};

/// Connection over a Unix domain stream socket.
#[derive(Debug, Default)]
pub struct UnixConnection {
    stream: Option<UnixStream>,
    address: Option<PathBuf>,
}

impl UnixConnection {
    /// Creates an unconnected instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already connected stream (e.g. one accepted by a listener).
    #[must_use]
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream: Some(stream),
            address: None,
        }
    }

    /// Path this connection was opened against, if any.
    #[must_use]
    pub fn address(&self) -> Option<&PathBuf> {
        self.address.as_ref()
    }

    fn stream(&mut self) -> Result<&mut UnixStream> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Connection for UnixConnection {
    async fn connect(&mut self, address: &str) -> Result<()> {
        let stream = UnixStream::connect(address)
            .await
            .map_err(|e| TransportError::connect_failed(address, e))?;
        debug!(address = %address, "Connected to Unix socket");
        self.stream = Some(stream);
        self.address = Some(PathBuf::from(address));
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::io("unix socket write", e))?;
        trace!(bytes = data.len(), "Sent on Unix socket");
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let stream = self.stream()?;
        let mut buf = vec![0u8; max_bytes];
        let n = with_deadline("unix socket receive", timeout, async {
            stream
                .read(&mut buf)
                .await
                .map_err(|e| TransportError::io("unix socket read", e))
        })
        .await?;

        if n == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        buf.truncate(n);
        trace!(bytes = n, "Received on Unix socket");
        Ok(buf)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            // The peer may already be gone.
            let _ = stream.shutdown().await;
            debug!(address = ?self.address, "Unix socket closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("kpxc-test-{}-{name}.sock", std::process::id()))
    }

    #[tokio::test]
    async fn test_send_and_receive_over_socket() {
        let path = socket_path("roundtrip");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut peer = UnixConnection::from_stream(stream);
            let request = peer.receive(1024, None).await.unwrap();
            peer.send(&request).await.unwrap();
            peer.close().await.unwrap();
        });

        let mut conn = UnixConnection::new();
        conn.connect(path.to_str().unwrap()).await.unwrap();
        assert!(conn.is_connected());

        conn.send(b"{\"action\":\"get-databasehash\"}").await.unwrap();
        let reply = conn.receive(1024, Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(reply, b"{\"action\":\"get-databasehash\"}");

        server.await.unwrap();
        assert!(matches!(
            conn.receive(1024, Some(Duration::from_secs(5))).await,
            Err(TransportError::ConnectionClosed)
        ));

        conn.close().await.unwrap();
        assert!(!conn.is_connected());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let path = socket_path("timeout");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let mut conn = UnixConnection::new();
        conn.connect(path.to_str().unwrap()).await.unwrap();
        let _held = listener.accept().await.unwrap();

        let err = conn
            .receive(1024, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_errors_without_connection() {
        let mut conn = UnixConnection::new();
        assert!(matches!(conn.send(b"x").await, Err(TransportError::NotConnected)));
        assert!(matches!(
            conn.connect("/nonexistent/kpxc.sock").await,
            Err(TransportError::ConnectFailed { .. })
        ));
    }
}
