// ============================================
// File: crates/kpxc-browser/src/discovery.rs
// ============================================
//! # Socket Discovery
//!
//! KeePassXC creates its browser socket under `$TMPDIR` on some setups and
//! under `$XDG_RUNTIME_DIR` on most Linux desktops. Both are probed, in
//! that order; the first existing path wins.
//!
//! ## Last Modified
//! v0.1.0 - Initial discovery

use std::ffi::OsString;
use std::path::PathBuf;

use tracing::debug;

use kpxc_core::protocol::SOCKET_NAME;

use crate::error::{BrowserError, Result};

/// Environment variables probed for the socket directory, in order.
pub const SOCKET_DIR_VARS: [&str; 2] = ["TMPDIR", "XDG_RUNTIME_DIR"];

/// Candidate socket paths for the given directory values.
///
/// Unset or empty directories are skipped.
#[must_use]
pub fn socket_candidates<I>(dirs: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = Option<OsString>>,
{
    dirs.into_iter()
        .flatten()
        .filter(|dir| !dir.is_empty())
        .map(|dir| PathBuf::from(dir).join(SOCKET_NAME))
        .collect()
}

/// Returns the first candidate that exists.
///
/// # Errors
/// `SocketNotFound` listing every probed path.
pub fn first_existing(candidates: &[PathBuf]) -> Result<PathBuf> {
    for candidate in candidates {
        if candidate.exists() {
            debug!(path = %candidate.display(), "Found KeePassXC socket");
            return Ok(candidate.clone());
        }
    }
    let searched = if candidates.is_empty() {
        SOCKET_DIR_VARS.join(" and ") + " unset"
    } else {
        candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(BrowserError::SocketNotFound { searched })
}

/// Locates the KeePassXC socket from the process environment.
///
/// # Errors
/// `SocketNotFound` if no candidate exists.
pub fn discover_socket_path() -> Result<PathBuf> {
    let candidates = socket_candidates(SOCKET_DIR_VARS.iter().map(std::env::var_os));
    first_existing(&candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_keep_order_and_skip_unset() {
        let candidates = socket_candidates([
            Some(OsString::from("/tmp")),
            None,
            Some(OsString::new()),
            Some(OsString::from("/run/user/1000")),
        ]);
        assert_eq!(
            candidates,
            [
                PathBuf::from("/tmp").join(SOCKET_NAME),
                PathBuf::from("/run/user/1000").join(SOCKET_NAME),
            ]
        );
    }

    #[test]
    fn test_first_existing_prefers_earlier_candidate() {
        let dir = std::env::temp_dir().join(format!("kpxc-discovery-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let present = dir.join(SOCKET_NAME);
        std::fs::write(&present, b"").unwrap();

        let missing = PathBuf::from("/nonexistent-kpxc").join(SOCKET_NAME);
        let found = first_existing(&[missing.clone(), present.clone()]).unwrap();
        assert_eq!(found, present);

        let err = first_existing(&[missing]).unwrap_err();
        assert!(err.to_string().contains("/nonexistent-kpxc"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_no_candidates_is_not_found() {
        assert!(matches!(
            first_existing(&[]),
            Err(BrowserError::SocketNotFound { .. })
        ));
    }
}
