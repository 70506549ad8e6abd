// ============================================
// File: crates/kpxc-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Validation failures of the shared identifier types.
//!
//! ## Design Philosophy
//! - `thiserror` for the definitions
//! - `kpxc-browser` wraps `CommonError` in its own error type
//! - Messages never contain key material or decrypted payloads
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Common error types shared across the KPXC crates.
///
/// # Example
/// ```
/// use kpxc_common::error::{CommonError, Result};
///
/// fn validate_client_id(id: &str) -> Result<()> {
///     if id.is_empty() {
///         return Err(CommonError::invalid_input("client_id", "cannot be empty"));
///     }
///     Ok(())
/// }
/// assert!(validate_client_id("").is_err());
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    /// Invalid input data provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },
}

impl CommonError {
    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ============================================
// Tests
// ============================================
