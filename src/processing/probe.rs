//! Metadata-only bounds probing

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use super::decode::RasterDecoder;
use super::memory::pixel_bytes;
use crate::error::{ConvertError, Result};

/// Source dimensions read without decoding pixels. Both values are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbedDimensions {
    pub width: u32,
    pub height: u32,
}

impl ProbedDimensions {
    /// `None` when either dimension is zero
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Bytes a full-resolution RGBA decode would need
    pub fn full_decode_bytes(self) -> u64 {
        pixel_bytes(self.width, self.height)
    }
}

/// Read the source's dimensions through the decoder's header-only path
pub fn probe_bounds(decoder: &dyn RasterDecoder, path: &Path) -> Result<ProbedDimensions> {
    let (width, height) = decoder.read_dimensions(path)?;

    let dimensions = ProbedDimensions::new(width, height).ok_or_else(|| {
        ConvertError::unreadable(
            format!("reported dimensions {}x{}", width, height),
            path.to_path_buf(),
        )
    })?;

    debug!(
        "Probed {:?}: {}x{} ({} pixels, {:.2}MB full decode)",
        path,
        dimensions.width,
        dimensions.height,
        dimensions.pixel_count(),
        dimensions.full_decode_bytes() as f64 / 1024.0 / 1024.0
    );

    Ok(dimensions)
}

/// MIME type of the container according to its magic bytes
pub fn sniff_container(path: &Path) -> Option<&'static str> {
    infer::get_from_path(path)
        .ok()
        .flatten()
        .map(|kind| kind.mime_type())
}
