//! Memory ceiling accounting and owned pixel buffers
//!
//! Every pixel allocation in the pipeline first reserves its size from a
//! per-request [`MemoryBudget`]. A [`PixelBuffer`] carries its reservation, so
//! dropping the buffer is what releases it. Stages that allocate report the
//! three-way [`Attempt`] outcome instead of aborting on exhaustion.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::{RgbImage, RgbaImage};
use tracing::{debug, warn};

use crate::error::{ConvertError, Result};

/// Decoded buffers are RGBA, 8 bits per channel
pub const BYTES_PER_PIXEL: u64 = 4;

const MIN_AUTO_LIMIT_MB: u64 = 512;

/// Bytes needed for an RGBA buffer of the given size
pub fn pixel_bytes(width: u32, height: u32) -> u64 {
    u64::from(width) * u64::from(height) * BYTES_PER_PIXEL
}

/// Per-request memory ceiling
#[derive(Debug)]
pub struct MemoryBudget {
    max_bytes: u64,
    in_use: AtomicU64,
}

impl MemoryBudget {
    /// Create a budget with the given limit, or auto-detect one
    pub fn new(limit_bytes: Option<u64>) -> Arc<Self> {
        let max_bytes = limit_bytes.unwrap_or_else(Self::detect_limit);
        debug!("Memory budget: {:.2}MB", max_bytes as f64 / 1024.0 / 1024.0);
        Arc::new(Self {
            max_bytes,
            in_use: AtomicU64::new(0),
        })
    }

    /// Budget without a practical ceiling
    pub fn unlimited() -> Arc<Self> {
        Self::new(Some(u64::MAX))
    }

    /// 75% of currently available memory, at least 512MB
    pub fn detect_limit() -> u64 {
        use sysinfo::{System, SystemExt};
        let mut system = System::new();
        system.refresh_memory();
        let available_mb = system.available_memory() / 1024 / 1024;
        (available_mb * 75 / 100).max(MIN_AUTO_LIMIT_MB) * 1024 * 1024
    }

    /// Get maximum allowed memory usage
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Get current reserved bytes
    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Bytes that can still be reserved
    pub fn available(&self) -> u64 {
        self.max_bytes.saturating_sub(self.in_use())
    }

    /// Reserve `bytes`, failing if the ceiling would be crossed
    pub fn reserve(self: &Arc<Self>, bytes: u64) -> std::result::Result<Reservation, Exhausted> {
        let max = self.max_bytes;
        self.in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_add(bytes).filter(|total| *total <= max)
            })
            .map(|_| Reservation {
                budget: Arc::clone(self),
                bytes,
            })
            .map_err(|current| Exhausted {
                requested: bytes,
                available: max.saturating_sub(current),
            })
    }

    fn release(&self, bytes: u64) {
        // Saturating so a double release can never wrap.
        let _ = self
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(bytes))
            });
    }
}

/// A reserved slice of a [`MemoryBudget`], returned on drop
#[derive(Debug)]
pub struct Reservation {
    budget: Arc<MemoryBudget>,
    bytes: u64,
}

impl Reservation {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.budget.release(self.bytes);
    }
}

/// The memory ceiling could not accommodate an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub requested: u64,
    pub available: u64,
}

impl Exhausted {
    /// Escalate to a request-level error
    pub fn into_error(self, stage: &'static str) -> ConvertError {
        ConvertError::out_of_memory(stage, self.requested, self.available)
    }
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requested {} bytes with {} available",
            self.requested, self.available
        )
    }
}

/// Outcome of a stage that allocates pixel memory
#[must_use]
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    Exhausted(Exhausted),
    Failed(ConvertError),
}

impl<T> Attempt<T> {
    /// Collapse into a `Result`, reporting exhaustion as `OutOfMemory`
    pub fn into_result(self, stage: &'static str) -> Result<T> {
        match self {
            Self::Done(value) => Ok(value),
            Self::Exhausted(exhausted) => Err(exhausted.into_error(stage)),
            Self::Failed(err) => Err(err),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
}

/// Decoded RGBA raster owned by exactly one pipeline stage
pub struct PixelBuffer {
    image: RgbaImage,
    reservation: Reservation,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer against the budget
    pub fn allocate(width: u32, height: u32, budget: &Arc<MemoryBudget>) -> Attempt<Self> {
        let bytes = pixel_bytes(width, height);
        let reservation = match budget.reserve(bytes) {
            Ok(reservation) => reservation,
            Err(exhausted) => return Attempt::Exhausted(exhausted),
        };

        let Ok(len) = usize::try_from(bytes) else {
            return Attempt::Exhausted(Exhausted {
                requested: bytes,
                available: budget.available(),
            });
        };

        let mut raw = Vec::new();
        if raw.try_reserve_exact(len).is_err() {
            warn!("Allocator refused {} bytes for {}x{} buffer", bytes, width, height);
            return Attempt::Exhausted(Exhausted {
                requested: bytes,
                available: budget.available(),
            });
        }
        raw.resize(len, 0);

        match RgbaImage::from_raw(width, height, raw) {
            Some(image) => Attempt::Done(Self { image, reservation }),
            None => Attempt::Failed(ConvertError::system(format!(
                "buffer of {} bytes does not fit {}x{}",
                bytes, width, height
            ))),
        }
    }

    /// Wrap an already allocated image with the reservation that covers it
    pub fn from_parts(image: RgbaImage, reservation: Reservation) -> Self {
        debug_assert!(reservation.bytes() >= pixel_bytes(image.width(), image.height()));
        Self { image, reservation }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn as_image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    /// Bytes held against the budget
    pub fn reserved_bytes(&self) -> u64 {
        self.reservation.bytes()
    }

    /// Drop the alpha channel in place, reusing the same allocation
    pub fn into_rgb(self) -> Option<(RgbImage, Reservation)> {
        let Self { image, reservation } = self;
        let (width, height) = image.dimensions();
        let mut raw = image.into_raw();

        let pixels = raw.len() / 4;
        for i in 0..pixels {
            let src = i * 4;
            raw.copy_within(src..src + 3, i * 3);
        }
        raw.truncate(pixels * 3);

        RgbImage::from_raw(width, height, raw).map(|rgb| (rgb, reservation))
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("reserved_bytes", &self.reserved_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_budget_reserve_and_release() {
        let budget = MemoryBudget::new(Some(100));

        let first = budget.reserve(60).unwrap();
        assert_eq!(budget.in_use(), 60);
        assert_eq!(budget.available(), 40);

        let err = budget.reserve(50).unwrap_err();
        assert_eq!(err, Exhausted { requested: 50, available: 40 });

        drop(first);
        assert_eq!(budget.in_use(), 0);
        assert!(budget.reserve(100).is_ok());
    }

    #[test]
    fn test_detected_limit_has_floor() {
        assert!(MemoryBudget::detect_limit() >= MIN_AUTO_LIMIT_MB * 1024 * 1024);
    }

    #[test]
    fn test_unlimited_budget_never_overflows() {
        let budget = MemoryBudget::unlimited();
        let _a = budget.reserve(u64::MAX / 2).unwrap();
        assert!(budget.reserve(u64::MAX).is_err());
    }

    #[test]
    fn test_pixel_buffer_releases_on_drop() {
        let budget = MemoryBudget::new(Some(1024));
        let buffer = match PixelBuffer::allocate(8, 8, &budget) {
            Attempt::Done(buffer) => buffer,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(buffer.dimensions(), (8, 8));
        assert_eq!(budget.in_use(), 256);

        drop(buffer);
        assert_eq!(budget.in_use(), 0);
    }

    #[test]
    fn test_allocate_reports_exhaustion() {
        let budget = MemoryBudget::new(Some(100));
        let attempt = PixelBuffer::allocate(10, 10, &budget);
        assert!(attempt.is_exhausted());

        let err = PixelBuffer::allocate(10, 10, &budget)
            .into_result("rotate")
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::OutOfMemory { stage: "rotate", requested: 400, available: 100 }
        ));
    }

    #[test]
    fn test_into_rgb_keeps_color_channels() {
        let budget = MemoryBudget::new(Some(1024));
        let mut buffer = PixelBuffer::allocate(3, 2, &budget).into_result("test").unwrap();
        for (x, y, pixel) in buffer.as_image_mut().enumerate_pixels_mut() {
            *pixel = Rgba([x as u8, y as u8, 200, 17]);
        }

        let (rgb, reservation) = buffer.into_rgb().unwrap();
        assert_eq!(rgb.dimensions(), (3, 2));
        assert_eq!(rgb.get_pixel(2, 1).0, [2, 1, 200]);
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 200]);
        assert_eq!(reservation.bytes(), 24);
        assert_eq!(budget.in_use(), 24);

        drop(reservation);
        assert_eq!(budget.in_use(), 0);
    }
}
