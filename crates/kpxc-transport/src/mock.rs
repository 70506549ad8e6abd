// ============================================
// File: crates/kpxc-transport/src/mock.rs
// ============================================
//! # Mock Connection Implementation
//!
//! ## Creation Reason
//! Provides a scripted connection for testing protocol code without a
//! running KeePassXC.
//!
//! ## Main Functionality
//! - Inbound frame queue (`inject`)
//! - Outbound frame capture (`take_sent`)
//! - Optional responder closure that answers each sent frame
//! - Receive-call counting, to pin down retry behavior
//!
//! ## Usage in Tests
//! ```ignore
//! use std::time::Duration;
//! use kpxc_transport::{Connection, MockConnection};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = MockConnection::new();
//! let handle = conn.handle();
//!
//! handle.inject(b"{\"action\":\"database-locked\"}".to_vec());
//! let frame = conn.receive(1024, Some(Duration::from_secs(1))).await?;
//! assert_eq!(handle.receive_calls(), 1);
//! # let _ = frame;
//! # Ok(())
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//! - The mock never blocks: an empty queue is an immediate `Timeout` when
//!   a deadline was given, `ConnectionClosed` otherwise
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, TransportError};
use crate::traits::Connection;

// ============================================
// Constants
// ============================================

/// Maximum number of frames to queue.
const MAX_QUEUE_SIZE: usize = 1000;

/// Closure answering a sent frame with zero or more inbound frames.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

// ============================================
// Shared State
// ============================================

#[derive(Default)]
struct MockState {
    inbound: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    responder: Mutex<Option<Responder>>,
    address: Mutex<Option<String>>,
    receive_calls: AtomicUsize,
    connected: AtomicBool,
}

// ============================================
// MockConnection
// ============================================

/// Scripted in-memory connection.
pub struct MockConnection {
    state: Arc<MockState>,
}

/// Test-side view of a [`MockConnection`] that stays usable after the
/// connection has been moved into a client.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<MockState>,
}

impl MockConnection {
    /// Creates a connected mock with empty queues.
    #[must_use]
    pub fn new() -> Self {
        let state = MockState {
            connected: AtomicBool::new(true),
            ..MockState::default()
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// Creates a mock whose every sent frame is answered by `responder`.
    #[must_use]
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        let conn = Self::new();
        *conn.state.responder.lock() = Some(Box::new(responder));
        conn
    }

    /// Returns a handle for inspecting and scripting this mock.
    #[must_use]
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Queues a frame for the next `receive()`.
    ///
    /// # Panics
    /// Panics if the queue is full (> `MAX_QUEUE_SIZE` frames).
    pub fn inject(&self, frame: impl Into<Vec<u8>>) {
        let mut queue = self.state.inbound.lock();
        assert!(queue.len() < MAX_QUEUE_SIZE, "Mock connection inbound queue overflow");
        queue.push_back(frame.into());
    }

    /// Takes every frame sent so far.
    #[must_use]
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.state.sent.lock())
    }

    /// Number of frames sent and not yet taken.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.state.sent.lock().len()
    }

    /// Number of frames waiting to be received.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.inbound.lock().len()
    }

    /// Number of `receive()` calls so far.
    #[must_use]
    pub fn receive_calls(&self) -> usize {
        self.state.receive_calls.load(Ordering::SeqCst)
    }

    /// Address passed to the last `connect()`.
    #[must_use]
    pub fn connected_address(&self) -> Option<String> {
        self.state.address.lock().clone()
    }

    /// Returns `true` while the mock is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn connect(&mut self, address: &str) -> Result<()> {
        *self.state.address.lock() = Some(address.to_string());
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.state.sent.lock().push(data.to_vec());

        let replies = self
            .state
            .responder
            .lock()
            .as_mut()
            .map(|respond| respond(data))
            .unwrap_or_default();
        let mut queue = self.state.inbound.lock();
        queue.extend(replies);
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        self.state.receive_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        match self.state.inbound.lock().pop_front() {
            Some(mut frame) => {
                frame.truncate(max_bytes);
                Ok(frame)
            }
            None => match timeout {
                Some(limit) => Err(TransportError::timeout("mock receive", limit)),
                None => Err(TransportError::ConnectionClosed),
            },
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }
}

// ============================================
// Tests
// ============================================
