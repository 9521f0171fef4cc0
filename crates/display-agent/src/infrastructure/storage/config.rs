//! TOML configuration for the display agent.
//!
//! Read from the platform-appropriate config file:
//! - Linux:    `$XDG_CONFIG_HOME/display-agent/config.toml` (or `~/.config/...`)
//! - Windows:  `%APPDATA%\display-agent\config.toml`
//! - macOS:    `~/Library/Application Support/display-agent/config.toml`
//!
//! A missing file is not an error: every field has a default, so an agent
//! with no config at all discovers its server address, enumerates displays
//! through RandR and registers under its hardware id and host name.
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! url = "ws://10.0.0.5:3000"   # overrides address discovery
//! port = 3000
//! reconnect_delay_ms = 3000
//!
//! [device]
//! name = "lobby-wall"
//!
//! [watchdog]
//! sample_interval_ms = 3000
//! memory_threshold_mb = 400
//!
//! [surface]
//! browser = "chromium"
//! extra_args = ["--disable-gpu"]
//!
//! [[displays]]
//! id = 1
//! x = 0
//! y = 0
//! width = 1920
//! height = 1080
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use display_core::{Bounds, Display};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::watchdog::WatchdogConfig;

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

    /// A value parsed but makes no sense.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub watchdog: WatchdogSettings,
    #[serde(default)]
    pub surface: SurfaceSettings,
    /// Fixed display list.  Empty means "ask RandR".
    #[serde(default)]
    pub displays: Vec<DisplayEntry>,
}

/// Control-server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Full `ws://` URL.  When absent the URL is built from the best local
    /// IPv4 address and `port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

/// Identity overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Memory watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchdogSettings {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_memory_threshold_mb")]
    pub memory_threshold_mb: u64,
}

/// Kiosk browser settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurfaceSettings {
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Where per-display browser profiles live.  Defaults to
    /// `<config dir>/profiles`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<PathBuf>,
}

/// One statically configured display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayEntry {
    pub id: u64,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl From<DisplayEntry> for Display {
    fn from(entry: DisplayEntry) -> Self {
        Display::new(entry.id, Bounds::new(entry.x, entry.y, entry.width, entry.height))
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_server_port() -> u16 {
    3000
}
fn default_reconnect_delay_ms() -> u64 {
    3000
}
fn default_sample_interval_ms() -> u64 {
    3000
}
fn default_memory_threshold_mb() -> u64 {
    400
}
fn default_browser() -> String {
    crate::infrastructure::surface::browser::DEFAULT_BROWSER.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            device: DeviceConfig::default(),
            watchdog: WatchdogSettings::default(),
            surface: SurfaceSettings::default(),
            displays: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            port: default_server_port(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            memory_threshold_mb: default_memory_threshold_mb(),
        }
    }
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            browser: default_browser(),
            extra_args: Vec::new(),
            profile_dir: None,
        }
    }
}

impl AgentConfig {
    /// Rejects values that would make the agent spin or never reload.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "server.reconnect_delay_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.watchdog.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "watchdog.sample_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(url) = &self.server.url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::Invalid {
                    field: "server.url",
                    reason: format!("{url:?} is not a ws:// or wss:// URL"),
                });
            }
        }
        if let Some(entry) = self.displays.iter().find(|d| d.width == 0 || d.height == 0) {
            return Err(ConfigError::Invalid {
                field: "displays",
                reason: format!("display {} has an empty size", entry.id),
            });
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.server.reconnect_delay_ms)
    }

    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            sample_interval: Duration::from_millis(self.watchdog.sample_interval_ms),
            memory_threshold_mb: self.watchdog.memory_threshold_mb as f64,
        }
    }

    /// Statically configured displays, in file order.
    pub fn static_displays(&self) -> Vec<Display> {
        self.displays.iter().copied().map(Display::from).collect()
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for agent files.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads and validates the config at `path`, or at the default location when
/// `path` is `None`.
///
/// A missing file at the default location yields `AgentConfig::default()`;
/// a missing file that was named explicitly is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors, [`ConfigError::Parse`]
/// if the TOML is malformed and [`ConfigError::Invalid`] if a value is out of
/// range.
pub fn load_config(path: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match config_file_path() {
            Ok(p) => (p, false),
            Err(ConfigError::NoPlatformConfigDir) => return Ok(AgentConfig::default()),
            Err(e) => return Err(e),
        },
    };

    let cfg = match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str::<AgentConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => AgentConfig::default(),
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Resolves the platform config base directory joined with `display-agent`.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("display-agent"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("display-agent"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("display-agent")
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
    use display_core::DisplayId;

    #[test]
    fn test_agent_config_default_matches_documented_values() {
        // Arrange / Act
        let cfg = AgentConfig::default();

        // Assert
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(cfg.watchdog_config(), WatchdogConfig::default());
        assert_eq!(cfg.surface.browser, "chromium");
        assert!(cfg.displays.is_empty());
    }

    #[test]
    fn test_empty_file_parses_to_defaults() {
        let cfg: AgentConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        // Arrange
        let text = r#"
            [server]
            url = "ws://10.0.0.5:3000"

            [watchdog]
            memory_threshold_mb = 600

            [[displays]]
            id = 2
            x = -1080
            width = 1080
            height = 1920
        "#;

        // Act
        let cfg: AgentConfig = toml::from_str(text).expect("parse");

        // Assert
        assert_eq!(cfg.server.url.as_deref(), Some("ws://10.0.0.5:3000"));
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.watchdog.sample_interval_ms, 3000);
        assert_eq!(cfg.watchdog_config().memory_threshold_mb, 600.0);
        let displays = cfg.static_displays();
        assert_eq!(displays[0].id, DisplayId(2));
        assert_eq!(displays[0].bounds, Bounds::new(-1080, 0, 1080, 1920));
    }

    #[test]
    fn test_validate_rejects_zero_reconnect_delay() {
        let mut cfg = AgentConfig::default();
        cfg.server.reconnect_delay_ms = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "server.reconnect_delay_ms", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_non_websocket_url() {
        let mut cfg = AgentConfig::default();
        cfg.server.url = Some("http://10.0.0.5:3000".to_string());
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "server.url", .. })));
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        // Arrange
        let path = std::env::temp_dir().join(format!("display-agent-cfg-{}.toml", std::process::id()));
        std::fs::write(&path, "log_level = \"debug\"\n[device]\nname = \"lobby\"\n").expect("write");

        // Act
        let cfg = load_config(Some(&path)).expect("load");

        // Assert
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.device.name.as_deref(), Some("lobby"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_config_missing_explicit_path_is_an_error() {
        let path = Path::new("/nonexistent/display-agent/config.toml");
        assert!(matches!(load_config(Some(path)), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let path = std::env::temp_dir().join(format!("display-agent-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[server\nport = ").expect("write");

        let result = load_config(Some(&path));

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_file(path);
    }
}
