// src/config.rs

//! Configuration structures for the `kms-scanout` probe.
//!
//! The configuration is a JSON file with three sections (`display`,
//! `buffers`, `gpu`). Every field has a default, so an empty object, a
//! partial file or no file at all are all valid. Only `main` reads
//! [`CONFIG`]; the library modules receive plain values.

use crate::kms::ModeRequest;
use drm_fourcc::{DrmFourcc, DrmModifier};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "KMS_SCANOUT_CONFIG";

/// Process-wide configuration, loaded on first use.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::load_or_default);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid pixel format {0:?}")]
    InvalidFormat(String),
}

// --- Top-Level Configuration Structure ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub buffers: BufferConfig,
    pub gpu: GpuConfig,
}

/// Which device and mode to bind.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// DRM primary node, e.g. `/dev/dri/card0`. Probed when unset.
    pub device: Option<PathBuf>,
    /// `<name>[-<vrefresh>]`, e.g. `"1280x720-60"`. The preferred (or
    /// largest) mode is used when unset.
    pub video_mode: Option<String>,
}

impl DisplayConfig {
    pub fn mode_request(&self) -> Option<ModeRequest> {
        self.video_mode.as_deref().and_then(ModeRequest::parse)
    }
}

/// Render buffer layout and pool shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    /// FOURCC code of the pixel format, e.g. `"XR24"`.
    pub format: String,
    /// Format modifier; 0 is linear.
    pub modifier: u64,
    /// Render into pool buffers instead of a window surface.
    pub surfaceless: bool,
    /// Pool size in surfaceless mode.
    pub count: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            format: "RG16".to_string(), // RGB565
            modifier: 0,
            surfaceless: false,
            count: 2,
        }
    }
}

impl BufferConfig {
    pub fn pixel_format(&self) -> Result<DrmFourcc, ConfigError> {
        parse_fourcc(&self.format)
    }

    pub fn modifier(&self) -> DrmModifier {
        DrmModifier::from(self.modifier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GpuConfig {
    /// Multisample count requested from the config chooser.
    pub samples: i32,
}

/// Little-endian FOURCC code of up to four characters, padded with spaces.
pub fn fourcc_code(text: &str) -> Option<u32> {
    let bytes = text.as_bytes();
    if bytes.is_empty() || bytes.len() > 4 || !text.is_ascii() {
        return None;
    }
    let mut code = [b' '; 4];
    code[..bytes.len()].copy_from_slice(bytes);
    Some(u32::from_le_bytes(code))
}

pub fn parse_fourcc(text: &str) -> Result<DrmFourcc, ConfigError> {
    fourcc_code(text)
        .and_then(|code| DrmFourcc::try_from(code).ok())
        .ok_or_else(|| ConfigError::InvalidFormat(text.to_string()))
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `$KMS_SCANOUT_CONFIG`, then `$XDG_CONFIG_HOME/kms-scanout/config.json`,
    /// then `$HOME/.config/kms-scanout/config.json`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(explicit) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            paths.push(PathBuf::from(explicit));
        }
        if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            paths.push(Path::new(&xdg).join("kms-scanout").join("config.json"));
        }
        if let Some(home) = env::var_os("HOME").filter(|v| !v.is_empty()) {
            paths.push(
                Path::new(&home)
                    .join(".config")
                    .join("kms-scanout")
                    .join("config.json"),
            );
        }
        paths
    }

    /// Loads the first configuration file that exists, else the defaults.
    ///
    /// A file that exists but cannot be read or parsed is reported and the
    /// defaults are used instead.
    pub fn load_or_default() -> Self {
        for path in Self::search_paths() {
            if !path.exists() {
                debug!("No configuration at {}", path.display());
                continue;
            }
            return match Self::from_path(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("{}; using default configuration", e);
                    Self::default()
                }
            };
        }
        info!("Using default configuration");
        Self::default()
    }
}
