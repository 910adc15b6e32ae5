//! Configuration loading and persistence.
//!
//! Handles reading and writing the notifeed configuration file and applying
//! environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

use crate::channel::TransportKind;
use crate::effects::PermissionState;

/// Configuration for the notification client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the notification server.
    pub server_url: String,
    /// Path prefix of the notification endpoints.
    pub path: String,
    /// Transports to try, in order.
    pub transports: Vec<TransportKind>,
    /// First reconnection delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Reconnection delay cap in milliseconds.
    pub max_backoff_ms: u64,
    /// Timeout for a single transport handshake in milliseconds.
    pub connect_timeout_ms: u64,
    /// Delay between polls after an empty batch, in milliseconds.
    pub poll_interval_ms: u64,
    /// Ring the bell for new notifications.
    pub sound_enabled: bool,
    /// Raise desktop notifications.
    pub desktop_enabled: bool,
    /// Persisted desktop notification decision.
    pub notification_permission: PermissionState,
    /// Drop notifications that arrive before a successful handshake.
    pub require_authentication: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            path: "/notifications".to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            connect_timeout_ms: 10_000,
            poll_interval_ms: 1000,
            sound_enabled: true,
            desktop_enabled: true,
            notification_permission: PermissionState::Default,
            require_authentication: false,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `NOTIFEED_CONFIG_DIR` overrides the platform config directory
    /// (Linux: `~/.config/notifeed`, macOS: `~/Library/Application Support/notifeed`).
    pub fn config_dir() -> Result<PathBuf> {
        let dir = match std::env::var("NOTIFEED_CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::config_dir()
                .context("Could not determine config directory")?
                .join("notifeed"),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the config file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields the defaults. A malformed file is an error.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads only what is on disk, without environment overrides.
    ///
    /// Use this before [`save`](Self::save) so overrides are not persisted.
    pub fn load_file() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", config_path.display()))?;
        if config.transports.is_empty() {
            anyhow::bail!(
                "Invalid config file {}: transports must not be empty",
                config_path.display()
            );
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server_url) = std::env::var("NOTIFEED_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Ok(transports) = std::env::var("NOTIFEED_TRANSPORTS") {
            match parse_transports(&transports) {
                Ok(parsed) => self.transports = parsed,
                Err(e) => log::warn!("Ignoring NOTIFEED_TRANSPORTS: {}", e),
            }
        }

        if let Ok(require_auth) = std::env::var("NOTIFEED_REQUIRE_AUTH") {
            if let Some(flag) = parse_flag(&require_auth) {
                self.require_authentication = flag;
            }
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        fs::write(&config_path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        // Owner read/write only
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}

/// Parse a comma-separated transport list such as `"websocket,polling"`.
pub fn parse_transports(value: &str) -> Result<Vec<TransportKind>, String> {
    let transports = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<TransportKind>, String>>()?;
    if transports.is_empty() {
        return Err("empty transport list".to_string());
    }
    Ok(transports)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serializes tests that touch process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_overrides() {
        std::env::remove_var("NOTIFEED_SERVER_URL");
        std::env::remove_var("NOTIFEED_TRANSPORTS");
        std::env::remove_var("NOTIFEED_REQUIRE_AUTH");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://localhost:3000");
        assert_eq!(
            config.transports,
            vec![TransportKind::Websocket, TransportKind::Polling]
        );
        assert_eq!(config.notification_permission, PermissionState::Default);
        assert!(!config.require_authentication);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server_url": "https://example.com"}"#).unwrap();
        assert_eq!(config.server_url, "https://example.com");
        assert_eq!(config.max_backoff_ms, 30_000);
        assert!(config.sound_enabled);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_var("NOTIFEED_CONFIG_DIR", dir.path());
        clear_overrides();

        let config = Config::load().unwrap();
        assert_eq!(config, Config::default());

        std::env::remove_var("NOTIFEED_CONFIG_DIR");
    }

    #[test]
    fn test_save_then_load_keeps_permission() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_var("NOTIFEED_CONFIG_DIR", dir.path());
        clear_overrides();

        let config = Config {
            notification_permission: PermissionState::Granted,
            ..Config::default()
        };
        config.save().unwrap();

        let loaded = Config::load().unwrap();
        assert_eq!(loaded.notification_permission, PermissionState::Granted);

        #[cfg(unix)]
        {
            let mode = fs::metadata(dir.path().join("config.json"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        std::env::remove_var("NOTIFEED_CONFIG_DIR");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_var("NOTIFEED_CONFIG_DIR", dir.path());
        fs::write(dir.path().join("config.json"), "{not json").unwrap();

        assert!(Config::load().is_err());

        std::env::remove_var("NOTIFEED_CONFIG_DIR");
    }

    #[test]
    fn test_empty_transport_list_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_var("NOTIFEED_CONFIG_DIR", dir.path());
        clear_overrides();
        fs::write(dir.path().join("config.json"), r#"{"transports": []}"#).unwrap();

        let err = Config::load_file().unwrap_err();
        assert!(err.to_string().contains("transports must not be empty"));

        std::env::remove_var("NOTIFEED_CONFIG_DIR");
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        std::env::set_var("NOTIFEED_CONFIG_DIR", dir.path());
        std::env::set_var("NOTIFEED_SERVER_URL", "https://feed.example.com");
        std::env::set_var("NOTIFEED_TRANSPORTS", "polling");
        std::env::set_var("NOTIFEED_REQUIRE_AUTH", "yes");

        let config = Config::load().unwrap();
        assert_eq!(config.server_url, "https://feed.example.com");
        assert_eq!(config.transports, vec![TransportKind::Polling]);
        assert!(config.require_authentication);

        clear_overrides();
        std::env::remove_var("NOTIFEED_CONFIG_DIR");
    }

    #[test]
    fn test_parse_transports() {
        assert_eq!(
            parse_transports("polling, ws"),
            Ok(vec![TransportKind::Polling, TransportKind::Websocket])
        );
        assert!(parse_transports(" , ").is_err());
        assert!(parse_transports("websocket,smoke").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
