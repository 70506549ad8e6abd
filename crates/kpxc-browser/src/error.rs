// ============================================
// File: crates/kpxc-browser/src/error.rs
// ============================================
//! # Browser Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial error set for client, proxy and interceptor

use std::path::Path;

use thiserror::Error;

use kpxc_common::CommonError;
use kpxc_core::CoreError;
use kpxc_transport::TransportError;

/// Result type for browser operations.
pub type Result<T> = std::result::Result<T, BrowserError>;

/// KeePassXC error code: action cancelled or denied by the user.
pub const ERROR_ACTION_CANCELLED_OR_DENIED: i64 = 6;

/// KeePassXC error code: association failed.
pub const ERROR_ASSOCIATION_FAILED: i64 = 8;

/// Browser error types.
#[derive(Error, Debug)]
pub enum BrowserError {
    // ========================================
    // Configuration Errors
    // ========================================

    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// Path of the configuration file
        path: String,
        /// Why loading failed
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Dotted name of the offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// No KeePassXC socket in any searched directory.
    #[error("KeePassXC socket not found (searched: {searched})")]
    SocketNotFound {
        /// Comma-separated candidate paths
        searched: String,
    },

    /// Association record could not be read or written.
    #[error("Association file '{path}': {reason}")]
    Persistence {
        /// Path of the association file
        path: String,
        /// Underlying failure
        reason: String,
    },

    // ========================================
    // Handshake Errors
    // ========================================

    /// `change-public-keys` was refused or returned no key.
    #[error("Public key exchange failed: {reason}")]
    HandshakeFailed {
        /// What went wrong
        reason: String,
    },

    /// The user or KeePassXC refused a new association.
    #[error("Association denied: {message}")]
    AssociationDenied {
        /// Error string from KeePassXC
        message: String,
        /// KeePassXC error code
        code: Option<i64>,
    },

    /// A stored association is no longer known to KeePassXC.
    #[error("Stored association rejected: {message}")]
    AssociationRejected {
        /// Error string from KeePassXC
        message: String,
        /// KeePassXC error code
        code: Option<i64>,
    },

    // ========================================
    // Interception Errors
    // ========================================

    /// An intercept hook refused a payload.
    #[error("Intercept hook failed: {reason}")]
    Hook {
        /// Reason given by the hook
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from the transport crate.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Persistence` error.
    pub fn persistence(path: &Path, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `HandshakeFailed` error.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            reason: reason.into(),
        }
    }

    /// Creates a `Hook` error.
    pub fn hook(reason: impl Into<String>) -> Self {
        Self::Hook {
            reason: reason.into(),
        }
    }

    /// Re-types a remote `associate` failure.
    ///
    /// Codes 6 and 8 mean the user (or KeePassXC) refused the association;
    /// everything else stays a plain remote error.
    #[must_use]
    pub fn from_associate_failure(err: Self) -> Self {
        match err {
            Self::Core(CoreError::Remote { message, code })
                if matches!(
                    code,
                    Some(ERROR_ACTION_CANCELLED_OR_DENIED | ERROR_ASSOCIATION_FAILED)
                ) =>
            {
                Self::AssociationDenied { message, code }
            }
            other => other,
        }
    }

    /// Re-types a remote `test-associate` failure.
    #[must_use]
    pub fn from_test_associate_failure(err: Self) -> Self {
        match err {
            Self::Core(CoreError::Remote { message, code }) => {
                Self::AssociationRejected { message, code }
            }
            other => other,
        }
    }

    // ========================================
    // Classification
    // ========================================

    /// Returns `true` for configuration and discovery failures.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::SocketNotFound { .. }
        )
    }

    /// Returns `true` if a box failed to open or seal.
    #[must_use]
    pub const fn is_crypto_error(&self) -> bool {
        match self {
            Self::Core(e) => e.is_crypto_error(),
            _ => false,
        }
    }

    /// Returns `true` for malformed or unexpected messages.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        match self {
            Self::Core(e) => e.is_protocol_error(),
            _ => false,
        }
    }

    /// Returns `true` if an operation ran in the wrong state.
    #[must_use]
    pub const fn is_state_error(&self) -> bool {
        match self {
            Self::Core(e) => e.is_state_error(),
            _ => false,
        }
    }

    /// Returns `true` if the session can no longer be trusted.
    #[must_use]
    pub const fn is_integrity_failure(&self) -> bool {
        match self {
            Self::Core(e) => e.is_integrity_failure(),
            _ => false,
        }
    }

    /// Returns `true` if KeePassXC reported the failure.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        match self {
            Self::Core(e) => e.is_remote(),
            Self::AssociationDenied { .. } | Self::AssociationRejected { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if retrying the higher-level operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            _ => self.is_remote(),
        }
    }

    /// Returns `true` if a receive timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Returns `true` if a connection was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_closed())
    }
}
