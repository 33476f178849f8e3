//! Configuration management for heic-convert
//!
//! Environment-level settings (where caches live, network timeouts, the
//! memory ceiling) are loaded once into a [`ConverterConfig`]. Everything that
//! varies per call lives in [`ConvertRequest`].

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{Result, ConvertError};

pub mod request;
pub use request::*;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Cache directory layout
    pub cache: CacheConfig,

    /// Remote fetch settings
    pub network: NetworkConfig,

    /// Memory ceiling settings
    pub memory: MemoryConfig,

    /// Pixel processing settings
    pub processing: ProcessingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Cache directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Primary (internal) cache directory, searched first
    pub primary_dir: PathBuf,

    /// Secondary (external) cache directory, searched second
    pub external_dir: Option<PathBuf>,

    /// Where converted JPEGs are written (None = primary_dir)
    pub output_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            primary_dir: std::env::temp_dir().join("heic-convert"),
            external_dir: None,
            output_dir: None,
        }
    }
}

impl CacheConfig {
    /// Directory that receives output artifacts
    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.primary_dir)
    }
}

/// Remote fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds (response head and each body chunk)
    pub read_timeout_secs: u64,

    /// Treat loopback URLs as remote (local development servers)
    pub allow_loopback: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            read_timeout_secs: 15,
            allow_loopback: false,
        }
    }
}

/// Memory ceiling configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Per-request pixel memory ceiling in bytes (None = auto-detect)
    pub limit_bytes: Option<u64>,
}

/// Pixel processing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Filter used by the precision resizer
    pub resize_filter: ResizeFilter,
}

/// Available resize filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    /// Nearest neighbor (fastest, lowest quality)
    Nearest,
    /// Triangle (bilinear interpolation)
    #[default]
    Triangle,
    /// Catmull-Rom cubic spline
    CatmullRom,
    /// Lanczos with radius 3
    Lanczos3,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl ConverterConfig {
    /// Create a configuration rooted at the given primary cache directory
    pub fn with_cache_dir<P: Into<PathBuf>>(primary_dir: P) -> Self {
        Self {
            cache: CacheConfig {
                primary_dir: primary_dir.into(),
                ..CacheConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConvertError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => Err(ConvertError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let content = match extension.to_lowercase().as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| ConvertError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| ConvertError::config(format!("YAML serialization failed: {}", e)))?,
            _ => return Err(ConvertError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| ConvertError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.primary_dir.as_os_str().is_empty() {
            return Err(ConvertError::config("Primary cache directory must be set"));
        }

        if self.network.connect_timeout_secs == 0 || self.network.read_timeout_secs == 0 {
            return Err(ConvertError::config(
                "Network timeouts must be greater than 0"
            ));
        }

        if self.memory.limit_bytes == Some(0) {
            return Err(ConvertError::config(
                "Memory limit must be greater than 0"
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConvertError::config("Log level must not be empty"));
        }

        Ok(())
    }
}
