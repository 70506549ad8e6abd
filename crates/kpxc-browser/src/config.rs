// ============================================
// File: crates/kpxc-browser/src/config.rs
// ============================================
//! # Browser Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the client and proxy binaries,
//! loaded from a TOML file with per-field defaults.
//!
//! ## Main Functionality
//! - `BrowserConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Socket path resolution (explicit path, else discovery)
//!
//! ## Configuration Sections
//! - `connection`: KeePassXC socket path, timeouts, message size
//! - `identity`: Client id, association file
//! - `proxy`: Pass-through or intercepting mode, idle timeout
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [connection]
//! socket_path = "/run/user/1000/org.keepassxc.KeePassXC.BrowserServer"
//! receive_timeout_secs = 0
//! generate_password_timeout_secs = 120
//!
//! [identity]
//! association_file = "/home/me/.config/kpxc-browser/association.json"
//!
//! [proxy]
//! mode = "mitm"
//! idle_timeout_secs = 30
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A timeout of 0 means "wait forever"
//! - `proxy.upstream_socket` overrides `connection.socket_path` for the
//!   proxy only
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use kpxc_common::ClientId;
use kpxc_core::protocol::BUF_SIZE;

use crate::discovery::discover_socket_path;
use crate::error::{BrowserError, Result};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================
// BrowserConfig
// ============================================

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Connection to KeePassXC.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Client identity and persisted association.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Proxy behavior.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BrowserConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BrowserError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| BrowserError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads the file if it exists, defaults otherwise.
    ///
    /// # Errors
    /// Returns error if an existing file is invalid.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns error if the string cannot be parsed or validated.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BrowserError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// `ConfigInvalid` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        self.identity.validate()?;
        self.proxy.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Serializes configuration to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Socket the client talks to: the configured path, else discovery.
    ///
    /// # Errors
    /// `SocketNotFound` when nothing is configured and discovery fails.
    pub fn client_socket(&self) -> Result<PathBuf> {
        match &self.connection.socket_path {
            Some(path) => Ok(path.clone()),
            None => discover_socket_path(),
        }
    }

    /// Socket the proxy forwards to.
    ///
    /// # Errors
    /// `SocketNotFound` when nothing is configured and discovery fails.
    pub fn upstream_socket(&self) -> Result<PathBuf> {
        match &self.proxy.upstream_socket {
            Some(path) => Ok(path.clone()),
            None => self.client_socket(),
        }
    }
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn check_path(field: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(BrowserError::config_invalid(field, "path cannot be empty"));
    }
    Ok(())
}

// ============================================
// ConnectionConfig
// ============================================

/// Connection section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// KeePassXC socket; discovered when absent.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    /// Receive timeout for ordinary requests (0 = none).
    #[serde(default)]
    pub receive_timeout_secs: u64,

    /// Receive timeout for `generate-password` (0 = none).
    #[serde(default = "default_generate_password_timeout")]
    pub generate_password_timeout_secs: u64,

    /// Largest message accepted in one receive.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_generate_password_timeout() -> u64 {
    120
}

fn default_max_message_size() -> usize {
    BUF_SIZE
}

impl ConnectionConfig {
    fn validate(&self) -> Result<()> {
        if let Some(path) = &self.socket_path {
            check_path("connection.socket_path", path)?;
        }
        if self.max_message_size == 0 {
            return Err(BrowserError::config_invalid(
                "connection.max_message_size",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Receive timeout for ordinary requests.
    #[must_use]
    pub fn receive_timeout(&self) -> Option<Duration> {
        optional_secs(self.receive_timeout_secs)
    }

    /// Receive timeout for `generate-password`.
    #[must_use]
    pub fn generate_password_timeout(&self) -> Option<Duration> {
        optional_secs(self.generate_password_timeout_secs)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            receive_timeout_secs: 0,
            generate_password_timeout_secs: default_generate_password_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

// ============================================
// IdentityConfig
// ============================================

/// Identity section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Fixed client id; a random one is generated per run when absent.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Where the association record lives.
    #[serde(default = "default_association_file")]
    pub association_file: PathBuf,
}

fn default_association_file() -> PathBuf {
    PathBuf::from("kpxc-association.json")
}

impl IdentityConfig {
    /// The configured client id, parsed.
    ///
    /// # Errors
    /// [`BrowserError::Common`] when the configured id is blank.
    pub fn parse_client_id(&self) -> Result<Option<ClientId>> {
        Ok(self.client_id.as_deref().map(str::parse::<ClientId>).transpose()?)
    }

    fn validate(&self) -> Result<()> {
        if let Err(e) = self.parse_client_id() {
            return Err(BrowserError::config_invalid("identity.client_id", e.to_string()));
        }
        check_path("identity.association_file", &self.association_file)
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            association_file: default_association_file(),
        }
    }
}

// ============================================
// ProxyConfig
// ============================================

/// How the proxy treats traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Forward raw bytes.
    #[default]
    Passthrough,
    /// Terminate both legs and expose decrypted payloads.
    Mitm,
}

/// Proxy section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Pass-through or intercepting.
    #[serde(default)]
    pub mode: ProxyMode,

    /// Receive timeout on the downstream side.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// KeePassXC socket for the proxy; falls back to `connection.socket_path`.
    #[serde(default)]
    pub upstream_socket: Option<PathBuf>,
}

fn default_idle_timeout() -> u64 {
    30
}

impl ProxyConfig {
    fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(BrowserError::config_invalid(
                "proxy.idle_timeout_secs",
                "must be greater than 0",
            ));
        }
        if let Some(path) = &self.upstream_socket {
            check_path("proxy.upstream_socket", path)?;
        }
        Ok(())
    }

    /// Idle timeout as a duration.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            mode: ProxyMode::default(),
            idle_timeout_secs: default_idle_timeout(),
            upstream_socket: None,
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            return Err(BrowserError::config_invalid(
                "logging.level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.max_message_size, 1024 * 1024);
        assert_eq!(config.proxy.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.connection.receive_timeout(), None);
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [connection]
            socket_path = "/run/user/1000/org.keepassxc.KeePassXC.BrowserServer"
            receive_timeout_secs = 5
            generate_password_timeout_secs = 0

            [identity]
            client_id = "cli"
            association_file = "/tmp/assoc.json"

            [proxy]
            mode = "mitm"
            idle_timeout_secs = 10
            upstream_socket = "/tmp/upstream.sock"

            [logging]
            level = "debug"
        "#;

        let config = BrowserConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.connection.receive_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.connection.generate_password_timeout(), None);
        assert_eq!(config.identity.client_id.as_deref(), Some("cli"));
        assert_eq!(
            config.identity.parse_client_id().unwrap().map(|id| id.to_string()),
            Some("cli".to_string())
        );
        assert_eq!(config.proxy.mode, ProxyMode::Mitm);
        assert_eq!(
            config.upstream_socket().unwrap(),
            PathBuf::from("/tmp/upstream.sock")
        );
        assert_eq!(
            config.client_socket().unwrap(),
            PathBuf::from("/run/user/1000/org.keepassxc.KeePassXC.BrowserServer")
        );
    }

    #[test]
    fn test_upstream_falls_back_to_client_socket() {
        let config = BrowserConfig::from_toml_str(
            r#"
            [connection]
            socket_path = "/tmp/kpxc.sock"
        "#,
        )
        .unwrap();
        assert_eq!(config.proxy.mode, ProxyMode::Passthrough);
        assert_eq!(config.upstream_socket().unwrap(), PathBuf::from("/tmp/kpxc.sock"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_buf = "[connection]\nmax_message_size = 0\n";
        assert!(matches!(
            BrowserConfig::from_toml_str(zero_buf),
            Err(BrowserError::ConfigInvalid { .. })
        ));

        let empty_path = "[identity]\nassociation_file = \"\"\n";
        assert!(BrowserConfig::from_toml_str(empty_path).is_err());

        let bad_level = "[logging]\nlevel = \"loud\"\n";
        assert!(BrowserConfig::from_toml_str(bad_level).is_err());

        let zero_idle = "[proxy]\nidle_timeout_secs = 0\n";
        assert!(BrowserConfig::from_toml_str(zero_idle).is_err());

        let blank_id = "[identity]\nclient_id = \"  \"\n";
        assert!(matches!(
            BrowserConfig::from_toml_str(blank_id),
            Err(BrowserError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_blank_client_id_surfaces_as_common_error() {
        let identity = IdentityConfig {
            client_id: Some(String::new()),
            ..IdentityConfig::default()
        };
        assert!(matches!(identity.parse_client_id(), Err(BrowserError::Common(_))));
        assert!(IdentityConfig::default().parse_client_id().unwrap().is_none());
    }

    #[test]
    fn test_toml_output_parses_back() {
        let config = BrowserConfig::default();
        let again = BrowserConfig::from_toml_str(&config.to_toml()).unwrap();
        assert_eq!(again.proxy.idle_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("kpxc-config-does-not-exist.toml");
        let config = BrowserConfig::load_or_default(&path).await.unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(BrowserConfig::load(&path).await.unwrap_err().is_config_error());
    }
}
