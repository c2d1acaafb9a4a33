//! TOML-based configuration for the server.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\HueSync\config.toml`
//! - Linux:    `~/.config/huesync/config.toml`
//! - macOS:    `~/Library/Application Support/HueSync/config.toml`
//!
//! Example:
//!
//! ```toml
//! [server]
//! name = "Hue HDMI Sync"
//! port = 8080
//!
//! [bridge]
//! io_timeout_ms = 5000
//! quiesce_ms = 500
//! auto_stream_area = "1"
//! ```
//!
//! A missing file, a missing section, and a missing field all fall back to
//! the defaults below, so the server runs on first start without any file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::announce::{RetryPolicy, ServiceMetadata};
use crate::application::bridge_manager::BridgeTimings;

/// Name of the credential file written next to the config file.
pub const DEFAULT_CREDENTIALS_FILE: &str = "client.json";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub announce: AnnounceConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// How the service presents itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Advertised service name.
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Advertised service type.
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Port of the control surface, advertised to clients.
    #[serde(default = "default_port")]
    pub port: u16,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Bridge registration and handshake timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Application name used when registering with a bridge.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Settling time after a stream stops.
    #[serde(default = "default_quiesce_ms")]
    pub quiesce_ms: u64,
    /// Area streamed right after a successful restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_stream_area: Option<String>,
}

/// UDP service announcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnounceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Destination port of the broadcast datagrams.
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,
    /// Destination address; the limited broadcast address by default.
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

/// Producer frame source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerConfig {
    /// UDP port the frame listener binds on localhost.
    #[serde(default = "default_frame_port")]
    pub frame_port: u16,
}

/// Credential file location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Explicit credential file path; `client.json` next to the config file
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_service_name() -> String {
    "Hue HDMI Sync".to_string()
}
fn default_service_type() -> String {
    "hue-hdmi-sync".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_app_name() -> String {
    "hue-hdmi-sync".to_string()
}
fn default_io_timeout_ms() -> u64 {
    5000
}
fn default_quiesce_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_broadcast_port() -> u16 {
    8081
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_interval_ms() -> u64 {
    2000
}
fn default_retry_initial_ms() -> u64 {
    1000
}
fn default_retry_max_ms() -> u64 {
    30_000
}
fn default_frame_port() -> u16 {
    8090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            service_type: default_service_type(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            io_timeout_ms: default_io_timeout_ms(),
            quiesce_ms: default_quiesce_ms(),
            auto_stream_area: None,
        }
    }
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            broadcast_port: default_broadcast_port(),
            broadcast_address: default_broadcast_address(),
            interval_ms: default_interval_ms(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            frame_port: default_frame_port(),
        }
    }
}

impl ServerConfig {
    pub fn metadata(&self) -> ServiceMetadata {
        ServiceMetadata::new(&self.name, &self.service_type, self.port)
    }
}

impl BridgeConfig {
    pub fn timings(&self) -> BridgeTimings {
        BridgeTimings {
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            quiesce: Duration::from_millis(self.quiesce_ms),
        }
    }
}

impl AnnounceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.retry_initial_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl AppConfig {
    /// Resolves the credential file: the configured path, or
    /// `client.json` beside `config_path`.
    pub fn credentials_path(&self, config_path: &Path) -> PathBuf {
        match &self.storage.credentials_path {
            Some(path) => path.clone(),
            None => config_path
                .parent()
                .map(|dir| dir.join(DEFAULT_CREDENTIALS_FILE))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE)),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(platform_config_dir()
        .ok_or(ConfigError::NoPlatformConfigDir)?
        .join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads `path`, first writing the defaults there if the file does not exist.
///
/// Returns the config and whether the file was created.
///
/// # Errors
///
/// As [`load_config`] and [`save_config`].
pub fn load_or_init_config(path: &Path) -> Result<(AppConfig, bool), ConfigError> {
    if path.exists() {
        return Ok((load_config(path)?, false));
    }
    let config = AppConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("HueSync"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("huesync"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("HueSync")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("huesync_cfg_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config_matches_documented_values() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.server.name, "Hue HDMI Sync");
        assert_eq!(cfg.server.service_type, "hue-hdmi-sync");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.bridge.app_name, "hue-hdmi-sync");
        assert_eq!(cfg.announce.broadcast_port, 8081);
        assert_eq!(cfg.producer.frame_port, 8090);
        assert!(cfg.bridge.auto_stream_area.is_none());
    }

    #[test]
    fn test_bridge_timings_default_to_five_seconds_and_half_a_second() {
        let timings = BridgeConfig::default().timings();
        assert_eq!(timings.io_timeout, Duration::from_secs(5));
        assert_eq!(timings.quiesce, Duration::from_millis(500));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_given_fields() {
        // Arrange
        let toml_str = r#"
[bridge]
quiesce_ms = 750
auto_stream_area = "3"
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.bridge.quiesce_ms, 750);
        assert_eq!(cfg.bridge.auto_stream_area.as_deref(), Some("3"));
        assert_eq!(cfg.bridge.io_timeout_ms, 5000);
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = temp_dir();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = std::env::temp_dir()
            .join(format!("huesync_missing_{}", Uuid::new_v4()))
            .join("config.toml");

        assert_eq!(load_config(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.server.port = 9000;
        cfg.server.log_level = "debug".to_string();
        cfg.storage.credentials_path = Some(dir.join("creds.json"));

        // Act
        save_config(&path, &cfg).unwrap();
        let loaded = load_config(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_first_run_writes_defaults_and_later_runs_read_them() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("config.toml");

        // Act
        let (first, created) = load_or_init_config(&path).unwrap();
        let mut edited = first.clone();
        edited.producer.frame_port = 7001;
        save_config(&path, &edited).unwrap();
        let (second, created_again) = load_or_init_config(&path).unwrap();

        // Assert
        assert!(created);
        assert_eq!(first, AppConfig::default());
        assert!(path.exists());
        assert!(!created_again);
        assert_eq!(second.producer.frame_port, 7001);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_credentials_path_defaults_next_to_config() {
        let cfg = AppConfig::default();
        let path = cfg.credentials_path(Path::new("/etc/huesync/config.toml"));
        assert_eq!(path, PathBuf::from("/etc/huesync/client.json"));
    }

    #[test]
    fn test_credentials_path_honours_override() {
        let mut cfg = AppConfig::default();
        cfg.storage.credentials_path = Some(PathBuf::from("/var/lib/huesync/bridge.json"));
        assert_eq!(
            cfg.credentials_path(Path::new("/etc/huesync/config.toml")),
            PathBuf::from("/var/lib/huesync/bridge.json")
        );
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }

    #[test]
    fn test_metadata_and_retry_policy_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 9123;
        cfg.announce.retry_initial_ms = 250;

        assert_eq!(cfg.server.metadata().port, 9123);
        assert_eq!(cfg.announce.retry_policy().delay_for(1), Duration::from_millis(250));
    }
}
