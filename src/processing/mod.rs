//! Core conversion pipeline

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::fs;
use tracing::{debug, error, info};

use crate::config::{ConvertRequest, ConverterConfig, ResizeFilter};
use crate::error::{ConvertError, Result};
use crate::source::ResourceLocator;

pub mod cleanup;
pub mod decode;
pub mod encode;
pub mod memory;
pub mod orientation;
pub mod probe;
pub mod resize;
pub mod sampling;

pub use cleanup::SourceGuard;
pub use decode::{decode_pixels, ImageCrateDecoder, RasterDecoder};
pub use encode::{write_jpeg, OutputArtifact, OUTPUT_PREFIX};
pub use memory::{Attempt, Exhausted, MemoryBudget, PixelBuffer};
pub use orientation::{correct_orientation, read_orientation, OrientationTag};
pub use probe::{probe_bounds, ProbedDimensions};
pub use resize::{fit_dimensions, ImageResizer};
pub use sampling::{plan_subsample, SubsampleFactor};

/// A best-effort stage that was skipped for lack of memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    /// Output keeps the source's stored orientation
    RotationSkipped,
    /// Output may exceed the requested bound
    ResizeSkipped,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RotationSkipped => f.write_str("rotation skipped"),
            Self::ResizeSkipped => f.write_str("resize skipped"),
        }
    }
}

/// Converts image references into JPEG artifacts
pub struct Converter {
    config: ConverterConfig,
    locator: ResourceLocator,
    decoder: Arc<dyn RasterDecoder>,
}

impl Converter {
    /// Create a converter using the `image` crate decoder
    pub fn new(config: ConverterConfig) -> Result<Self> {
        config.validate()?;
        let locator = ResourceLocator::new(&config)?;
        Ok(Self {
            config,
            locator,
            decoder: Arc::new(ImageCrateDecoder),
        })
    }

    /// Swap in a different decoder (e.g. a platform HEIF codec)
    pub fn with_decoder(mut self, decoder: Arc<dyn RasterDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Whether the configured decoder handles HEIC/HEIF sources
    pub fn check_support(&self) -> bool {
        self.decoder.supports_heic()
    }

    /// Run one conversion request end to end
    pub async fn convert(&self, request: &ConvertRequest) -> Result<OutputArtifact> {
        let start_time = Instant::now();
        request.validate()?;

        info!(
            "Converting {} (quality {}, bound {})",
            request.reference, request.quality, request.bound
        );

        let source = self.locator.resolve(&request.reference).await?;
        let guard = SourceGuard::new(source);
        debug!("Source {:?} from {}", guard.path(), guard.origin());

        let output_dir = self.prepare_output_dir().await?;

        let job = PipelineJob {
            decoder: Arc::clone(&self.decoder),
            budget: MemoryBudget::new(self.config.memory.limit_bytes),
            filter: self.config.processing.resize_filter,
            quality: request.quality,
            bound: request.bound,
            output_dir,
        };

        let result = tokio::task::spawn_blocking(move || {
            let result = job.run(guard.path());
            guard.release();
            result
        })
        .await
        .map_err(|e| ConvertError::system(format!("Task join error: {}", e)))?;

        match &result {
            Ok(artifact) => info!(
                "Converted {} -> {:?} ({}x{}, {:.2}KB) in {:?}",
                request.reference,
                artifact.path,
                artifact.width,
                artifact.height,
                artifact.file_size as f64 / 1024.0,
                start_time.elapsed()
            ),
            Err(e) => error!("Conversion of {} failed: {}", request.reference, e),
        }

        result
    }

    async fn prepare_output_dir(&self) -> Result<PathBuf> {
        let dir = self.config.cache.output_dir();
        fs::create_dir_all(dir)
            .await
            .map_err(|e| ConvertError::write_failed(dir.to_path_buf(), e))?;
        fs::canonicalize(dir)
            .await
            .map_err(|e| ConvertError::write_failed(dir.to_path_buf(), e))
    }
}

/// Blocking stages of one request, run on the blocking pool
struct PipelineJob {
    decoder: Arc<dyn RasterDecoder>,
    budget: Arc<MemoryBudget>,
    filter: ResizeFilter,
    quality: u8,
    bound: u32,
    output_dir: PathBuf,
}

impl PipelineJob {
    fn run(&self, path: &Path) -> Result<OutputArtifact> {
        let dimensions = probe_bounds(self.decoder.as_ref(), path)?;

        let factor = plan_subsample(dimensions, self.bound);
        debug!(
            "Decoding {}x{} at {} for bound {}",
            dimensions.width, dimensions.height, factor, self.bound
        );

        let buffer = decode_pixels(self.decoder.as_ref(), path, dimensions, factor, &self.budget)?;

        let mut degradations = Vec::new();

        let orientation = read_orientation(path).unwrap_or_default();
        let (buffer, degraded) = correct_orientation(buffer, orientation, &self.budget);
        degradations.extend(degraded);

        let resizer = ImageResizer::with_filter(self.filter);
        let (buffer, degraded) = resizer.fit_within(buffer, self.bound, &self.budget);
        degradations.extend(degraded);

        write_jpeg(buffer, self.quality, &self.output_dir, degradations)
    }
}
