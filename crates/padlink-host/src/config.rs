//! TOML-based configuration for the host relay.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Padlink\config.toml`
//! - Linux:    `~/.config/padlink/config.toml`
//! - macOS:    `~/Library/Application Support/Padlink/config.toml`
//!
//! Every field carries a `#[serde(default = "…")]` so the relay works on
//! first run (before a config file exists) and keeps working when an older
//! file is missing newer fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

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

/// Top-level relay configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub surface: SurfaceSection,
    #[serde(default)]
    pub ring: RingSection,
}

/// General relay behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Light pressed surface buttons locally, standing in for an application
    /// script layer so a bare relay is visibly alive.
    #[serde(default = "default_true")]
    pub key_echo: bool,
}

/// Socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// IP address to bind the UDP socket to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// UDP port the relay listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

/// Slot pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSection {
    /// Number of device slots.
    #[serde(default = "default_slots")]
    pub slots: usize,
}

/// Surface device defaults for connects that do not negotiate dims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurfaceSection {
    #[serde(default = "default_surface_cols")]
    pub cols: u16,
    #[serde(default = "default_surface_rows")]
    pub rows: u16,
    /// Minimum interval between frame transmissions, and the period of the
    /// relay's refresh tick.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

/// Ring device defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RingSection {
    #[serde(default = "default_rings")]
    pub rings: u8,
    #[serde(default = "default_leds_per_ring")]
    pub leds_per_ring: u16,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    9216
}
fn default_slots() -> usize {
    4
}
fn default_surface_cols() -> u16 {
    16
}
fn default_surface_rows() -> u16 {
    8
}
fn default_refresh_interval_ms() -> u64 {
    33
}
fn default_rings() -> u8 {
    4
}
fn default_leds_per_ring() -> u16 {
    64
}

impl Default for HostConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), key_echo: default_true() }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), listen_port: default_listen_port() }
    }
}

impl Default for PoolSection {
    fn default() -> Self {
        Self { slots: default_slots() }
    }
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            cols: default_surface_cols(),
            rows: default_surface_rows(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl Default for RingSection {
    fn default() -> Self {
        Self { rings: default_rings(), leds_per_ring: default_leds_per_ring() }
    }
}

impl AppConfig {
    /// Converts the on-disk schema into the engine's pool configuration.
    pub fn pool_config(&self) -> padlink_core::PoolConfig {
        padlink_core::PoolConfig {
            slots: self.pool.slots,
            defaults: padlink_core::DeviceDefaults {
                surface_cols: self.surface.cols,
                surface_rows: self.surface.rows,
                refresh_interval: std::time::Duration::from_millis(
                    self.surface.refresh_interval_ms,
                ),
                rings: self.ring.rings,
                leds_per_ring: self.ring.leds_per_ring,
            },
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from disk, returning `AppConfig::default()` if the file
/// does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the config directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Padlink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("padlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Padlink")
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

    #[test]
    fn test_default_config_has_expected_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.network.listen_port, 9216);
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
        assert_eq!(cfg.pool.slots, 4);
        assert_eq!(cfg.surface.cols, 16);
        assert_eq!(cfg.surface.rows, 8);
        assert_eq!(cfg.surface.refresh_interval_ms, 33);
        assert_eq!(cfg.ring.rings, 4);
        assert_eq!(cfg.ring.leds_per_ring, 64);
        assert_eq!(cfg.host.log_level, "info");
        assert!(cfg.host.key_echo);
    }

    #[test]
    fn test_config_serializes_and_deserializes_round_trip() {
        let mut cfg = AppConfig::default();
        cfg.network.listen_port = 12000;
        cfg.surface.cols = 8;
        cfg.host.key_echo = false;

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_all_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_partial_section_overrides_only_named_fields() {
        let toml_str = r#"
[surface]
cols = 8

[network]
listen_port = 7000
"#;
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");
        assert_eq!(cfg.surface.cols, 8);
        assert_eq!(cfg.surface.rows, 8, "unspecified fields keep defaults");
        assert_eq!(cfg.network.listen_port, 7000);
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_pool_config_maps_into_engine_types() {
        let mut cfg = AppConfig::default();
        cfg.pool.slots = 2;
        cfg.surface.refresh_interval_ms = 50;

        let pool = cfg.pool_config();
        assert_eq!(pool.slots, 2);
        assert_eq!(pool.defaults.refresh_interval, std::time::Duration::from_millis(50));
        assert_eq!(pool.defaults.surface_cols, 16);
        assert_eq!(pool.defaults.rings, 4);
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        let dir = std::env::temp_dir().join(format!(
            "padlink_test_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.network.listen_port = 12345;
        cfg.host.log_level = "debug".to_string();

        // Serialize and write manually (mirrors save_config logic without
        // touching the real platform config dir).
        let content = toml::to_string_pretty(&cfg).unwrap();
        std::fs::write(&path, &content).unwrap();
        let loaded: AppConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded.network.listen_port, 12345);
        assert_eq!(loaded.host.log_level, "debug");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"));
        }
        // NoPlatformConfigDir in a stripped environment is also acceptable.
    }
}
