//! Configuration system for dmlink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $DMLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/dmlink/config.toml
//!   3. ~/.config/dmlink/config.toml
//!
//! The port and debug level also honour `SERIALEMCCD_PORT` and
//! `SERIALEMCCD_DEBUG`, the variables the host plugin itself reads.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::geometry::{CameraGeometry, ProcessingMode};
use crate::wire::{ByteOrder, LongWidth, WireLayout};

/// Port the host plugin listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 48890;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DmlinkConfig {
    pub connection: ConnectionConfig,
    pub wire: WireConfig,
    pub debug: DebugConfig,
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// The plugin is meant to be reached over loopback.
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// "little" (portable) or "native" (exact host layout on the same architecture).
    pub byte_order: ByteOrder,
    /// Width of a long on the wire: 4 or 8.
    pub long_bytes: LongWidth,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// 0 = off, 1 = protocol summaries, 2 = raw bytes.
    pub level: u8,
    /// Append a timestamped protocol log here. Unset = no file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub camera_id: i64,
    /// Unbinned sensor size in pixels.
    pub sensor_width: i64,
    pub sensor_height: i64,
    pub binning: i64,
    /// Seconds.
    pub exposure: f64,
    pub processing: ProcessingMode,
    pub shutter_delay_ms: i64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            sensor_width: 2048,
            sensor_height: 2048,
            binning: 1,
            exposure: 0.4,
            processing: ProcessingMode::GainNormalized,
            shutter_delay_ms: 0,
        }
    }
}

impl WireConfig {
    pub fn layout(&self) -> WireLayout {
        WireLayout::new(self.byte_order, self.long_bytes)
    }
}

impl CameraConfig {
    /// Full-frame geometry from the configured defaults.
    pub fn geometry(&self) -> CameraGeometry {
        CameraGeometry::full_frame(self.sensor_width, self.sensor_height, self.binning)
            .with_exposure(self.exposure)
            .with_processing(self.processing)
            .with_shutter_delay_ms(self.shutter_delay_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("dmlink")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DmlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            DmlinkConfig::default()
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DMLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_at(&path)?;
        Ok(path)
    }

    /// Write the default config to `path` unless a file is already there.
    pub fn write_default_at(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&DmlinkConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var, value })
        }

        if let Some(v) = lookup("SERIALEMCCD_PORT") {
            self.connection.port = parse("SERIALEMCCD_PORT", v)?;
        }
        if let Some(v) = lookup("SERIALEMCCD_DEBUG") {
            self.debug.level = parse("SERIALEMCCD_DEBUG", v)?;
        }
        if let Some(v) = lookup("DMLINK_CONNECTION__HOST") {
            self.connection.host = v;
        }
        if let Some(v) = lookup("DMLINK_WIRE__BYTE_ORDER") {
            self.wire.byte_order = match v.trim() {
                "little" => ByteOrder::Little,
                "native" => ByteOrder::Native,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "DMLINK_WIRE__BYTE_ORDER",
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("DMLINK_WIRE__LONG_BYTES") {
            let bytes: u8 = parse("DMLINK_WIRE__LONG_BYTES", v.clone())?;
            self.wire.long_bytes = LongWidth::try_from(bytes).map_err(|_| ConfigError::InvalidEnv {
                var: "DMLINK_WIRE__LONG_BYTES",
                value: v,
            })?;
        }
        if let Some(v) = lookup("DMLINK_DEBUG__LOG_PATH") {
            self.debug.log_path = Some(PathBuf::from(v));
        }
        Ok(())
    }
}
