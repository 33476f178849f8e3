//! Pixel decoding into budgeted RGBA buffers

use std::path::Path;
use std::sync::Arc;

use image::error::LimitErrorKind;
use image::{imageops, DynamicImage, GenericImage, ImageDecoder, ImageError, ImageReader, Limits};
use tracing::debug;

use super::memory::{pixel_bytes, Attempt, Exhausted, MemoryBudget, PixelBuffer};
use super::probe::{sniff_container, ProbedDimensions};
use super::sampling::SubsampleFactor;
use crate::error::{ConvertError, Result};

/// A raster decoder the pipeline can drive.
///
/// The default [`ImageCrateDecoder`] handles every format the `image` crate
/// reads. Hosts with a platform HEIF codec plug it in behind this trait.
pub trait RasterDecoder: Send + Sync {
    /// Short name used in logs and messages
    fn name(&self) -> &'static str;

    /// Header-only read of `(width, height)`
    fn read_dimensions(&self, path: &Path) -> Result<(u32, u32)>;

    /// Full decode at `factor`, reserving pixel memory from `budget`
    fn decode(
        &self,
        path: &Path,
        dimensions: ProbedDimensions,
        factor: SubsampleFactor,
        budget: &Arc<MemoryBudget>,
    ) -> Attempt<PixelBuffer>;

    /// Whether HEIC/HEIF sources decode reliably
    fn supports_heic(&self) -> bool;
}

/// Decoder backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl ImageCrateDecoder {
    fn open(path: &Path) -> std::io::Result<ImageReader<std::io::BufReader<std::fs::File>>> {
        ImageReader::open(path)?.with_guessed_format()
    }

    fn unknown_format_message(&self, path: &Path) -> String {
        match sniff_container(path) {
            Some(mime) => format!("{} is not supported by the {} decoder", mime, self.name()),
            None => "unrecognised image format".to_string(),
        }
    }
}

impl RasterDecoder for ImageCrateDecoder {
    fn name(&self) -> &'static str {
        "image"
    }

    fn read_dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let reader = Self::open(path).map_err(|e| {
            ConvertError::unreadable(format!("cannot open source: {}", e), path.to_path_buf())
        })?;

        if reader.format().is_none() {
            return Err(ConvertError::unreadable(
                self.unknown_format_message(path),
                path.to_path_buf(),
            ));
        }

        reader
            .into_dimensions()
            .map_err(|e| ConvertError::unreadable(e.to_string(), path.to_path_buf()))
    }

    fn decode(
        &self,
        path: &Path,
        dimensions: ProbedDimensions,
        factor: SubsampleFactor,
        budget: &Arc<MemoryBudget>,
    ) -> Attempt<PixelBuffer> {
        let mut reader = match Self::open(path) {
            Ok(reader) => reader,
            Err(e) => {
                return Attempt::Failed(ConvertError::decode_failed(
                    format!("cannot reopen source: {}", e),
                    path.to_path_buf(),
                ))
            }
        };

        let mut limits = Limits::default();
        limits.max_alloc = Some(budget.available());
        reader.limits(limits);

        let decoder = match reader.into_decoder() {
            Ok(decoder) => decoder,
            Err(e) => return decode_error(e, dimensions.full_decode_bytes(), budget, path),
        };

        // Held until the RGBA copy exists.
        let native = match budget.reserve(decoder.total_bytes()) {
            Ok(reservation) => reservation,
            Err(exhausted) => return Attempt::Exhausted(exhausted),
        };

        let decoded = match DynamicImage::from_decoder(decoder) {
            Ok(decoded) => decoded,
            Err(e) => return decode_error(e, native.bytes(), budget, path),
        };

        let (width, height) = factor.apply(decoded.width(), decoded.height());

        if factor.is_subsampled() {
            let target = match budget.reserve(pixel_bytes(width, height)) {
                Ok(reservation) => reservation,
                Err(exhausted) => return Attempt::Exhausted(exhausted),
            };

            let image = imageops::thumbnail(&decoded, width, height);
            drop(decoded);
            drop(native);

            debug!(
                "Decoded {}x{} subsampled {} -> {}x{}",
                dimensions.width, dimensions.height, factor, width, height
            );
            return Attempt::Done(PixelBuffer::from_parts(image, target));
        }

        let buffer = match decoded {
            DynamicImage::ImageRgba8(image) => PixelBuffer::from_parts(image, native),
            other => {
                let mut buffer = match PixelBuffer::allocate(width, height, budget) {
                    Attempt::Done(buffer) => buffer,
                    Attempt::Exhausted(exhausted) => return Attempt::Exhausted(exhausted),
                    Attempt::Failed(err) => return Attempt::Failed(err),
                };
                if let Err(e) = buffer.as_image_mut().copy_from(&other, 0, 0) {
                    return Attempt::Failed(ConvertError::decode_failed(
                        e.to_string(),
                        path.to_path_buf(),
                    ));
                }
                buffer
            }
        };

        debug!("Decoded {}x{} at full resolution", width, height);
        Attempt::Done(buffer)
    }

    fn supports_heic(&self) -> bool {
        false
    }
}

/// Map a decoder error, reporting memory limits as exhaustion
fn decode_error<T>(
    err: ImageError,
    requested: u64,
    budget: &MemoryBudget,
    path: &Path,
) -> Attempt<T> {
    match err {
        ImageError::Limits(e) if matches!(e.kind(), LimitErrorKind::InsufficientMemory) => {
            Attempt::Exhausted(Exhausted {
                requested,
                available: budget.available(),
            })
        }
        other => {
            Attempt::Failed(ConvertError::decode_failed(other.to_string(), path.to_path_buf()))
        }
    }
}

/// Decode `path`, escalating exhaustion to `OutOfMemory`
pub fn decode_pixels(
    decoder: &dyn RasterDecoder,
    path: &Path,
    dimensions: ProbedDimensions,
    factor: SubsampleFactor,
    budget: &Arc<MemoryBudget>,
) -> Result<PixelBuffer> {
    decoder.decode(path, dimensions, factor, budget).into_result("decode")
}
