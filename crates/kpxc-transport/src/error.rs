// ============================================
// File: crates/kpxc-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Errors of the byte-stream layer: connecting to the KeePassXC socket,
//! moving frames in and out, and waiting for them.
//!
//! ## Error Categories
//! 1. **Connection Errors**: connect failed, not connected, peer closed
//! 2. **I/O Errors**: send/receive failures, oversized frames
//! 3. **Timing**: a receive deadline elapsed
//! 4. **Configuration Errors**: unusable addresses or limits
//!
//! ## ⚠️ Important Note for Next Developer
//! - A timeout is reported, never retried here; the caller decides
//! - `ConnectionClosed` means EOF, the session is over
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::time::Duration;

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Connection Errors
    // ========================================

    /// Could not reach the endpoint.
    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed {
        /// Endpoint we tried to reach
        address: String,
        /// Why connecting failed
        reason: String,
    },

    /// No connection has been established (or it was closed).
    #[error("Connection not established")]
    NotConnected,

    /// The peer closed the stream.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    // ========================================
    // I/O Errors
    // ========================================

    /// Send operation failed.
    #[error("Failed to send: {reason}")]
    SendFailed {
        /// Why send failed
        reason: String,
    },

    /// Receive operation failed.
    #[error("Failed to receive: {reason}")]
    ReceiveFailed {
        /// Why receive failed
        reason: String,
    },

    /// A frame announced more bytes than the receive limit.
    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Announced size
        size: usize,
        /// Receive limit
        max: usize,
    },

    /// Operation timed out.
    #[error("Operation timed out after {duration_ms} ms: {operation}")]
    Timeout {
        /// What operation timed out
        operation: String,
        /// The deadline that elapsed
        duration_ms: u64,
    },

    // ========================================
    // Configuration Errors
    // ========================================

    /// Invalid configuration.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Configuration field name
        field: String,
        /// Why it's invalid
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectFailed {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error is transient and the caller may retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns `true` if a receive deadline elapsed.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the stream is gone for good.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::ConnectionClosed | Self::NotConnected => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "unspecified I/O operation".into(),
            source: err,
        }
    }
}

// ============================================
// Tests
// ============================================
