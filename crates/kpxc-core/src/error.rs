// ============================================
// File: crates/kpxc-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines the error taxonomy of the protocol engine: cryptographic failures,
//! protocol integrity failures, state misuse and errors reported by the peer.
//!
//! ## Error Categories
//! 1. **Crypto Errors**: Authentication failure, malformed key material
//! 2. **Protocol Errors**: Malformed envelope, unknown action, nonce mismatch
//! 3. **State Errors**: Operation attempted out of order, missing data
//! 4. **Remote Errors**: The peer answered with `error` / `errorCode`
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material or decrypted payloads in error messages
//! - Crypto and protocol errors are integrity failures, they are never retried
//! - Remote errors are the only recoverable category
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for protocol and cryptographic operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Cryptographic Errors
    // ========================================

    /// The box authentication tag did not verify.
    ///
    /// Either the ciphertext was tampered with, or it was sealed for a
    /// different key pair. Treat it as a possible active attacker.
    #[error("Decryption failed: authentication error")]
    AuthenticationFailed,

    /// Key material is malformed (bad encoding or wrong length).
    #[error("Invalid key: {reason}")]
    InvalidKey {
        /// What is wrong with the key
        reason: String,
    },

    /// Encryption operation failed.
    #[error("Encryption failed: {context}")]
    Encryption {
        /// What was being encrypted
        context: String,
    },

    // ========================================
    // Protocol Errors
    // ========================================

    /// The action name is not part of the protocol.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// The envelope is not valid JSON or lacks a required field.
    #[error("Malformed envelope: {reason}")]
    MalformedEnvelope {
        /// What's wrong with the envelope
        reason: String,
    },

    /// The decrypted payload does not match the action's schema.
    #[error("Malformed '{action}' payload: {reason}")]
    MalformedPayload {
        /// Action whose payload failed to decode
        action: String,
        /// Decoder message
        reason: String,
    },

    /// A response nonce is not the request nonce incremented by one.
    #[error("Nonce mismatch: response nonce is not the successor of the request nonce")]
    NonceMismatch,

    /// A message arrived that does not fit the current exchange.
    #[error("Unexpected message: expected '{expected}', got '{got}'")]
    UnexpectedAction {
        /// Action we were waiting for
        expected: String,
        /// Action that arrived
        got: String,
    },

    // ========================================
    // State Errors
    // ========================================

    /// Operation not valid in current state.
    #[error("Invalid state for operation: {operation} requires {required_state}")]
    InvalidState {
        /// What operation was attempted
        operation: String,
        /// What state was required
        required_state: String,
    },

    /// Required data is missing.
    #[error("Missing required data: {field}")]
    MissingData {
        /// What data is missing
        field: String,
    },

    // ========================================
    // Remote Errors
    // ========================================

    /// The peer reported a failure.
    #[error("Remote error: {message} (code {})", display_code(.code))]
    Remote {
        /// Error string sent by the peer
        message: String,
        /// Numeric error code, `-1` if the peer sent a non-numeric code
        code: Option<i64>,
    },
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidKey` error.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Creates a `MalformedEnvelope` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            reason: reason.into(),
        }
    }

    /// Creates a `MalformedPayload` error.
    pub fn malformed_payload(action: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            action: action.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `UnexpectedAction` error.
    pub fn unexpected(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::UnexpectedAction {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Creates an `InvalidState` error.
    pub fn invalid_state(
        operation: impl Into<String>,
        required_state: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            required_state: required_state.into(),
        }
    }

    /// Creates a `MissingData` error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingData {
            field: field.into(),
        }
    }

    /// Creates a `Remote` error from the clear `error` / `errorCode` fields.
    ///
    /// A code that is present but not numeric is reported as `-1`.
    pub fn remote(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::Remote {
            message: message.into(),
            code: code.map(|c| c.trim().parse::<i64>().unwrap_or(-1)),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this is a cryptographic error.
    #[must_use]
    pub const fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::InvalidKey { .. } | Self::Encryption { .. }
        )
    }

    /// Returns `true` if this is a protocol error.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownAction(_)
                | Self::MalformedEnvelope { .. }
                | Self::MalformedPayload { .. }
                | Self::NonceMismatch
                | Self::UnexpectedAction { .. }
        )
    }

    /// Returns `true` if this is a state error.
    #[must_use]
    pub const fn is_state_error(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::MissingData { .. })
    }

    /// Returns `true` if the peer reported this error.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if this error means the session can no longer be trusted.
    ///
    /// A session that saw one of these must be closed, never retried.
    #[must_use]
    pub const fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::NonceMismatch)
    }
}

fn display_code(code: &Option<i64>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(CoreError::AuthenticationFailed.is_crypto_error());
        assert!(CoreError::AuthenticationFailed.is_integrity_failure());
        assert!(!CoreError::AuthenticationFailed.is_protocol_error());

        assert!(CoreError::NonceMismatch.is_protocol_error());
        assert!(CoreError::NonceMismatch.is_integrity_failure());
        assert!(!CoreError::NonceMismatch.is_crypto_error());

        let state = CoreError::invalid_state("encrypt", "peer public key");
        assert!(state.is_state_error());
        assert!(!state.is_integrity_failure());
    }

    #[test]
    fn test_remote_error_code_parsing() {
        match CoreError::remote("Database not opened", Some("1")) {
            CoreError::Remote { code, .. } => assert_eq!(code, Some(1)),
            other => panic!("unexpected {other:?}"),
        }
        match CoreError::remote("weird", Some("abc")) {
            CoreError::Remote { code, .. } => assert_eq!(code, Some(-1)),
            other => panic!("unexpected {other:?}"),
        }
        let err = CoreError::remote("plain", None);
        assert!(err.is_remote());
        assert!(err.to_string().contains("code none"));
    }
}
