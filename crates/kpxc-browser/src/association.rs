// ============================================
// File: crates/kpxc-browser/src/association.rs
// ============================================
//! # Association Persistence
//!
//! ## Creation Reason
//! An association is approved once by a human in KeePassXC. Its record
//! (`{"IdKey": ..., "AId": ...}`) has to survive restarts so later runs
//! only need `test-associate`.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The file is written with mode 0600 on Unix; the id key is what
//!   KeePassXC trusts
//! - A missing file is `Ok(None)`, not an error
//!
//! ## Last Modified
//! v0.1.0 - Initial association store

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use kpxc_core::AssociationRecord;

use crate::error::{BrowserError, Result};

/// JSON file holding one association record.
#[derive(Debug, Clone)]
pub struct AssociationStore {
    path: PathBuf,
}

impl AssociationStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record, `None` if the file does not exist.
    ///
    /// # Errors
    /// `Persistence` if the file is unreadable or not a record.
    pub async fn load(&self) -> Result<Option<AssociationRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored association");
                return Ok(None);
            }
            Err(e) => return Err(BrowserError::persistence(&self.path, e)),
        };
        let record: AssociationRecord = serde_json::from_str(&content)
            .map_err(|e| BrowserError::persistence(&self.path, e))?;
        Ok(Some(record))
    }

    /// Writes the record, creating parent directories.
    ///
    /// # Errors
    /// `Persistence` on any filesystem failure.
    pub async fn save(&self, record: &AssociationRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BrowserError::persistence(&self.path, e))?;
        }

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| BrowserError::persistence(&self.path, e))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| BrowserError::persistence(&self.path, e))?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&self.path)
                .await
                .map_err(|e| BrowserError::persistence(&self.path, e))?
                .permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms)
                .await
                .map_err(|e| BrowserError::persistence(&self.path, e))?;
        }

        info!(path = %self.path.display(), "Association saved");
        Ok(())
    }
}
