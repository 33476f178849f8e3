//! Precision resizing to a bounding box

use std::sync::Arc;

use image::imageops;
use tracing::{debug, warn};

use super::memory::{pixel_bytes, Attempt, MemoryBudget, PixelBuffer};
use super::Degradation;
use crate::config::ResizeFilter;

/// The `image` resampler keeps an RGBA f32 intermediate of `src_width x dst_height`
const INTERMEDIATE_BYTES_PER_PIXEL: u64 = 16;

impl From<ResizeFilter> for imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => imageops::FilterType::Nearest,
            ResizeFilter::Triangle => imageops::FilterType::Triangle,
            ResizeFilter::CatmullRom => imageops::FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// Target size fitting `bound` on both axes with aspect ratio preserved.
///
/// `None` when no resize is needed: bound 0, or both sides already within it.
pub fn fit_dimensions(width: u32, height: u32, bound: u32) -> Option<(u32, u32)> {
    if bound == 0 || (width <= bound && height <= bound) {
        return None;
    }

    let scale = (bound as f32 / width as f32).min(bound as f32 / height as f32);
    let target_width = ((width as f32 * scale).round() as u32).clamp(1, bound);
    let target_height = ((height as f32 * scale).round() as u32).clamp(1, bound);

    Some((target_width, target_height))
}

/// Downscales decoded buffers against the request's memory budget
pub struct ImageResizer {
    filter: ResizeFilter,
}

impl ImageResizer {
    /// Create a resizer with the default filter
    pub fn new() -> Self {
        Self::with_filter(ResizeFilter::default())
    }

    /// Create a resizer with custom filter
    pub fn with_filter(filter: ResizeFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> ResizeFilter {
        self.filter
    }

    /// Scale `buffer` to exactly `width x height`, leaving it untouched on failure
    pub fn resize_exact(
        &self,
        buffer: &PixelBuffer,
        width: u32,
        height: u32,
        budget: &Arc<MemoryBudget>,
    ) -> Attempt<PixelBuffer> {
        let target = match budget.reserve(pixel_bytes(width, height)) {
            Ok(reservation) => reservation,
            Err(exhausted) => return Attempt::Exhausted(exhausted),
        };

        let scratch_bytes =
            u64::from(buffer.width()) * u64::from(height) * INTERMEDIATE_BYTES_PER_PIXEL;
        let scratch = match budget.reserve(scratch_bytes) {
            Ok(reservation) => reservation,
            Err(exhausted) => return Attempt::Exhausted(exhausted),
        };

        let resized = imageops::resize(buffer.as_image(), width, height, self.filter.into());
        drop(scratch);

        Attempt::Done(PixelBuffer::from_parts(resized, target))
    }

    /// Fit `buffer` into `bound`. Never fails: on exhaustion the current buffer
    /// comes back together with the recorded degradation.
    pub fn fit_within(
        &self,
        buffer: PixelBuffer,
        bound: u32,
        budget: &Arc<MemoryBudget>,
    ) -> (PixelBuffer, Option<Degradation>) {
        let Some((width, height)) = fit_dimensions(buffer.width(), buffer.height(), bound) else {
            return (buffer, None);
        };

        debug!(
            "Resizing {}x{} -> {}x{} using {:?}",
            buffer.width(),
            buffer.height(),
            width,
            height,
            self.filter
        );

        match self.resize_exact(&buffer, width, height, budget) {
            Attempt::Done(resized) => (resized, None),
            Attempt::Exhausted(exhausted) => {
                warn!(
                    "Out of memory resizing to {}x{} ({}), keeping {}x{}",
                    width,
                    height,
                    exhausted,
                    buffer.width(),
                    buffer.height()
                );
                (buffer, Some(Degradation::ResizeSkipped))
            }
            Attempt::Failed(err) => {
                warn!("Resize to {}x{} failed: {}", width, height, err);
                (buffer, Some(Degradation::ResizeSkipped))
            }
        }
    }
}

impl Default for ImageResizer {
    fn default() -> Self {
        Self::new()
    }
}
