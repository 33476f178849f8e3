//! heic-convert - Memory-bounded image to JPEG conversion
//!
//! Converts a still image (notably HEIC) referenced by a cache name, local
//! path, `file://` URL or remote URL into a JPEG, applying EXIF orientation
//! correction and optional bounded downscaling.
//!
//! # Features
//!
//! - **Multi-strategy resolution**: primary cache, external cache, direct
//!   paths, then remote download into a scoped temporary file
//! - **Bounded memory**: subsampled decode and a per-request memory ceiling;
//!   rotation and resize degrade gracefully instead of failing
//! - **Guaranteed cleanup**: temporary downloads are removed on every exit path
//! - **Pluggable decoder**: hosts with a HEIF codec implement [`RasterDecoder`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use heic_convert::{ConvertRequest, Converter, ConverterConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = Converter::new(ConverterConfig::with_cache_dir("/data/cache"))?;
//!
//! let artifact = converter
//!     .convert(&ConvertRequest::new("content://media/photo.heic").quality(80).bound(1024))
//!     .await?;
//!
//! println!("Converted: {} ({}x{})", artifact, artifact.width, artifact.height);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod processing;
pub mod source;

// Re-export commonly used types
pub use config::{ConvertRequest, ConverterConfig, LoggingConfig, DEFAULT_QUALITY};
pub use error::{ConvertError, ErrorKind, Result};
pub use processing::{Converter, Degradation, ImageCrateDecoder, OutputArtifact, RasterDecoder};
pub use source::{ImageReference, ResolvedSource, SourceOrigin};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const MIN_MEMORY_MB: u64 = 512;

/// Initialize logging from `RUST_LOG` and check system requirements
///
/// Should be called once at program start; later calls keep the first
/// subscriber.
pub fn init() -> Result<()> {
    if tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish(),
    )
    .is_ok()
    {
        info!("heic-convert v{} initialized", VERSION);
    }

    validate_system_requirements()
}

/// Initialize with custom logging configuration
///
/// Logs go to stderr so stdout stays free for conversion results.
pub fn init_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| ConvertError::config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let installed = if config.json_format {
        tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish(),
        )
    };

    if installed.is_ok() {
        info!("heic-convert v{} initialized with custom config", VERSION);
    }

    validate_system_requirements()
}

fn validate_system_requirements() -> Result<()> {
    use sysinfo::{System, SystemExt};

    let mut system = System::new();
    system.refresh_memory();

    let available_memory = system.available_memory();
    if available_memory < MIN_MEMORY_MB * 1024 * 1024 {
        warn!(
            "Low available memory: {}MB (recommended: >{}MB)",
            available_memory / (1024 * 1024),
            MIN_MEMORY_MB
        );
    }

    info!(
        "Decoders: JPEG {}, PNG {}, WebP {}",
        image::ImageFormat::Jpeg.reading_enabled(),
        image::ImageFormat::Png.reading_enabled(),
        image::ImageFormat::WebP.reading_enabled()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_init() {
        // Should not fail on multiple calls
        let _ = init();
        let _ = init();
    }

    #[test]
    fn test_init_rejects_bad_level() {
        let config = LoggingConfig {
            level: "info,heic_convert=loudest".to_string(),
            json_format: false,
        };
        assert!(init_with_config(&config).is_err());
    }

    #[test]
    fn test_system_validation() {
        assert!(validate_system_requirements().is_ok());
    }
}
