// ============================================
// File: crates/kpxc-core/src/protocol/action.rs
// ============================================
//! # Action Names
//!
//! ## Creation Reason
//! Every envelope is dispatched by its `action` string. This module turns
//! that string into a closed enum and records, per action, which parts of
//! the exchange are encrypted.
//!
//! ## Encryption Matrix
//! | Action | Request payload | Response payload |
//! |--------|-----------------|------------------|
//! | change-public-keys | clear `publicKey` | clear `publicKey` |
//! | lock-database | encrypted | none (clear ack) |
//! | database-locked / database-unlocked | - | none (notification) |
//! | everything else | encrypted | encrypted |
//!
//! ## Last Modified
//! v0.1.0 - Initial action catalog

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================
// Action
// ============================================

/// Every action name the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Clear-text session key exchange.
    ChangePublicKeys,
    /// Database hash query, also the cheapest "is it alive" probe.
    GetDatabaseHash,
    /// Register the id key (needs human approval on the server).
    Associate,
    /// Check a persisted association.
    TestAssociate,
    /// Ask the server to generate a password.
    GeneratePassword,
    /// Fetch logins for a URL.
    GetLogins,
    /// Create or update a login.
    SetLogin,
    /// Lock the database.
    LockDatabase,
    /// Fetch the group tree.
    GetDatabaseGroups,
    /// Create a group by path.
    CreateNewGroup,
    /// Fetch the current TOTP for an entry.
    GetTotp,
    /// Unsolicited notification: database was locked.
    DatabaseLocked,
    /// Unsolicited notification: database was unlocked.
    DatabaseUnlocked,
}

impl Action {
    /// All actions, in catalog order.
    pub const ALL: [Self; 13] = [
        Self::ChangePublicKeys,
        Self::GetDatabaseHash,
        Self::Associate,
        Self::TestAssociate,
        Self::GeneratePassword,
        Self::GetLogins,
        Self::SetLogin,
        Self::LockDatabase,
        Self::GetDatabaseGroups,
        Self::CreateNewGroup,
        Self::GetTotp,
        Self::DatabaseLocked,
        Self::DatabaseUnlocked,
    ];

    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChangePublicKeys => "change-public-keys",
            Self::GetDatabaseHash => "get-databasehash",
            Self::Associate => "associate",
            Self::TestAssociate => "test-associate",
            Self::GeneratePassword => "generate-password",
            Self::GetLogins => "get-logins",
            Self::SetLogin => "set-login",
            Self::LockDatabase => "lock-database",
            Self::GetDatabaseGroups => "get-database-groups",
            Self::CreateNewGroup => "create-new-group",
            Self::GetTotp => "get-totp",
            Self::DatabaseLocked => "database-locked",
            Self::DatabaseUnlocked => "database-unlocked",
        }
    }

    /// Returns `true` if the request carries an encrypted `message`.
    #[must_use]
    pub const fn is_encrypted_request(&self) -> bool {
        !matches!(
            self,
            Self::ChangePublicKeys | Self::DatabaseLocked | Self::DatabaseUnlocked
        )
    }

    /// Returns `true` if a successful response carries an encrypted `message`.
    ///
    /// `lock-database` is acknowledged in clear.
    #[must_use]
    pub const fn has_encrypted_response(&self) -> bool {
        self.is_encrypted_request() && !matches!(self, Self::LockDatabase)
    }

    /// Returns `true` for unsolicited server notifications.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        matches!(self, Self::DatabaseLocked | Self::DatabaseUnlocked)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|action| action.as_str() == s)
            .copied()
            .ok_or_else(|| CoreError::UnknownAction(s.to_string()))
    }
}

impl Serialize for Action {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================
// Notification
// ============================================

/// Unsolicited server event, delivered outside of any request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Notification {
    /// The database was locked.
    DatabaseLocked,
    /// The database was unlocked.
    DatabaseUnlocked,
}

impl Notification {
    /// Maps a notification action to its event.
    #[must_use]
    pub const fn from_action(action: Action) -> Option<Self> {
        match action {
            Action::DatabaseLocked => Some(Self::DatabaseLocked),
            Action::DatabaseUnlocked => Some(Self::DatabaseUnlocked),
            _ => None,
        }
    }

    /// The action name this notification travels under.
    #[must_use]
    pub const fn action(&self) -> Action {
        match self {
            Self::DatabaseLocked => Action::DatabaseLocked,
            Self::DatabaseUnlocked => Action::DatabaseUnlocked,
        }
    }
}
