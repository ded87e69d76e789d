//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub links: LinksConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long shutdown waits for sessions to close
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_shutdown_grace() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-session WebSocket limits
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    #[serde(default = "default_inbound_queue")]
    pub inbound_queue: usize,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: f64,

    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: f64,
}

fn default_max_message_size() -> usize {
    32 * 1024 * 1024 // 32 MiB
}

fn default_inbound_queue() -> usize {
    32
}

fn default_outbound_queue() -> usize {
    64
}

fn default_ping_interval() -> f64 {
    20.0
}

fn default_ping_timeout() -> f64 {
    20.0
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            inbound_queue: default_inbound_queue(),
            outbound_queue: default_outbound_queue(),
            ping_interval_secs: default_ping_interval(),
            ping_timeout_secs: default_ping_timeout(),
        }
    }
}

/// Telemetry broadcast configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: f64,

    #[serde(default = "default_min_interval")]
    pub min_interval_secs: f64,

    #[serde(default = "default_max_interval")]
    pub max_interval_secs: f64,
}

fn default_interval() -> f64 {
    1.0
}

fn default_min_interval() -> f64 {
    0.1
}

fn default_max_interval() -> f64 {
    60.0
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            min_interval_secs: default_min_interval(),
            max_interval_secs: default_max_interval(),
        }
    }
}

/// What the ingest pipeline does with decoded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Write every frame to `save_dir`
    Save,
    /// Forward frames to connected controllers
    #[default]
    Window,
    /// Acknowledge and discard
    None,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Save => "save",
            DisplayMode::Window => "window",
            DisplayMode::None => "none",
        }
    }
}

impl FromStr for DisplayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "save" => Ok(DisplayMode::Save),
            "window" => Ok(DisplayMode::Window),
            "none" => Ok(DisplayMode::None),
            other => Err(ConfigError::InvalidValue {
                key: "display_mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Camera and frame sink configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// Whether camera commands are available at all
    #[serde(default = "default_camera_enabled")]
    pub enabled: bool,

    /// Upstream feed description reported in camera status
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub display_mode: DisplayMode,

    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
}

fn default_camera_enabled() -> bool {
    true
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("frames")
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: default_camera_enabled(),
            url: None,
            display_mode: DisplayMode::default(),
            save_dir: default_save_dir(),
        }
    }
}

/// Admission control configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window")]
    pub window_secs: u64,
}

fn default_max_requests() -> usize {
    100
}

fn default_window() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window(),
        }
    }
}

/// Managed link configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LinksConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_retry_backoff() -> u64 {
    500
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            connect_timeout_secs: default_connect_timeout(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        Self::discover().0
    }

    /// Default config file locations, in search order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("airlink").join("config.toml")),
            Some(PathBuf::from("/etc/airlink/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load from the first usable default location.
    ///
    /// Nothing is logged here; the returned [`ConfigOrigin`] is logged once
    /// tracing is up.
    pub fn discover() -> (Self, ConfigOrigin) {
        Self::discover_in(&Self::default_paths())
    }

    fn discover_in(paths: &[PathBuf]) -> (Self, ConfigOrigin) {
        let mut skipped = Vec::new();
        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => {
                    let origin = ConfigOrigin {
                        source: Some(path.clone()),
                        skipped,
                    };
                    return (config, origin);
                }
                Err(e) => skipped.push(e),
            }
        }

        let origin = ConfigOrigin {
            source: None,
            skipped,
        };
        (Self::from_env(), origin)
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the environment in production)
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = lookup("AIRLINK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("AIRLINK_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Camera overrides
        if let Some(mode) = lookup("AIRLINK_DISPLAY_MODE") {
            match mode.parse() {
                Ok(mode) => self.camera.display_mode = mode,
                Err(e) => tracing::warn!("Ignoring AIRLINK_DISPLAY_MODE: {}", e),
            }
        }
        if let Some(dir) = lookup("AIRLINK_SAVE_DIR") {
            self.camera.save_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("AIRLINK_CAMERA_URL") {
            self.camera.url = Some(url);
        }

        // Broadcast overrides
        if let Some(interval) = lookup("AIRLINK_BROADCAST_INTERVAL").and_then(|s| s.parse().ok()) {
            self.broadcast.interval_secs = interval;
        }

        // Logging overrides
        if let Some(level) = lookup("AIRLINK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("AIRLINK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Where the effective configuration came from
#[derive(Debug, Default)]
pub struct ConfigOrigin {
    /// File that was loaded, `None` for defaults plus environment
    pub source: Option<PathBuf>,
    /// Candidate files that exist but failed to load
    pub skipped: Vec<ConfigError>,
}

impl ConfigOrigin {
    pub fn file(path: &Path) -> Self {
        Self {
            source: Some(path.to_path_buf()),
            skipped: Vec::new(),
        }
    }

    /// Report the outcome through tracing
    pub fn log(&self) {
        for error in &self.skipped {
            tracing::warn!("Skipped config file: {}", error);
        }
        match &self.source {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::info!("Using default config with environment overrides"),
        }
    }
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# airlink Configuration
#
# Environment variables override these settings:
# - AIRLINK_HOST
# - AIRLINK_PORT
# - AIRLINK_DISPLAY_MODE
# - AIRLINK_SAVE_DIR
# - AIRLINK_CAMERA_URL
# - AIRLINK_BROADCAST_INTERVAL
# - AIRLINK_LOG_LEVEL
# - AIRLINK_LOG_FORMAT

[server]
# Listener host and port
host = "0.0.0.0"
port = 8765

# Seconds to wait for sessions to close on shutdown
shutdown_grace_secs = 5

[transport]
# Largest accepted WebSocket message (bytes)
max_message_size = 33554432

# Messages buffered per session ahead of the handler / the socket
inbound_queue = 32
outbound_queue = 64

# Keep-alive ping period and allowed silence after it (seconds)
ping_interval_secs = 20.0
ping_timeout_secs = 20.0

[broadcast]
# Telemetry push period (seconds), adjustable at runtime via update_interval
interval_secs = 1.0
min_interval_secs = 0.1
max_interval_secs = 60.0

[camera]
# Expose camera commands to controllers
enabled = true

# Upstream feed reported in camera status
# url = "rtsp://192.168.1.20/live"

# What to do with frames pushed to /ingest: save, window (forward to controllers), none
display_mode = "window"

# Directory for saved frames
save_dir = "frames"

[rate_limit]
# Admissions per source IP within the window
max_requests = 100
window_secs = 60

[links]
# Connection attempts allowed before a link is given up
max_retries = 3
connect_timeout_secs = 5
retry_backoff_ms = 500

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.transport.max_message_size, 32 * 1024 * 1024);
        assert_eq!(config.transport.inbound_queue, 32);
        assert_eq!(config.broadcast.interval_secs, 1.0);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.links.max_retries, 3);
        assert_eq!(config.camera.display_mode, DisplayMode::Window);
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.transport.ping_interval_secs, 20.0);
        assert_eq!(config.camera.display_mode, DisplayMode::Window);
        assert!(config.camera.url.is_none());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [camera]
            display_mode = "save"
            save_dir = "/tmp/frames"
            "#,
        )
        .unwrap();

        assert_eq!(config.camera.display_mode, DisplayMode::Save);
        assert_eq!(config.camera.save_dir, PathBuf::from("/tmp/frames"));
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_display_mode_from_str() {
        assert_eq!("SAVE".parse::<DisplayMode>().unwrap(), DisplayMode::Save);
        assert_eq!(" none ".parse::<DisplayMode>().unwrap(), DisplayMode::None);
        assert!("hologram".parse::<DisplayMode>().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AIRLINK_PORT", "9000"),
            ("AIRLINK_DISPLAY_MODE", "none"),
            ("AIRLINK_CAMERA_URL", "rtsp://cam"),
            ("AIRLINK_BROADCAST_INTERVAL", "2.5"),
            ("AIRLINK_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.camera.display_mode, DisplayMode::None);
        assert_eq!(config.camera.url.as_deref(), Some("rtsp://cam"));
        assert_eq!(config.broadcast.interval_secs, 2.5);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_invalid_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "AIRLINK_PORT" => Some("not-a-port".to_string()),
            "AIRLINK_DISPLAY_MODE" => Some("hologram".to_string()),
            _ => None,
        });

        assert_eq!(config.server.port, 8765);
        assert_eq!(config.camera.display_mode, DisplayMode::Window);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/airlink.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_discover_skips_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        let good = dir.path().join("good.toml");
        std::fs::write(&broken, "[server\nport = ").unwrap();
        std::fs::write(&good, "[camera]\nurl = \"rtsp://found\"\n").unwrap();

        let paths = [dir.path().join("absent.toml"), broken.clone(), good.clone()];
        let (config, origin) = Config::discover_in(&paths);

        assert_eq!(config.camera.url.as_deref(), Some("rtsp://found"));
        assert_eq!(origin.source, Some(good));
        assert_eq!(origin.skipped.len(), 1);
        assert!(matches!(&origin.skipped[0], ConfigError::Parse { path, .. } if *path == broken));
    }

    #[test]
    fn test_discover_without_files_uses_environment() {
        let dir = tempfile::tempdir().unwrap();

        let (_config, origin) = Config::discover_in(&[dir.path().join("absent.toml")]);

        assert!(origin.source.is_none());
        assert!(origin.skipped.is_empty());
    }
}
