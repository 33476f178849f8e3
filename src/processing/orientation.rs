//! EXIF-driven orientation correction

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use image::{imageops, ImageResult, RgbaImage};
use serde::Serialize;
use tracing::{debug, warn};

use super::memory::{Attempt, MemoryBudget, PixelBuffer};
use super::Degradation;
use crate::error::ConvertError;

/// Rotation needed to display the source upright
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationTag {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl OrientationTag {
    /// Map an EXIF orientation value. Mirrored variants are treated as normal.
    pub fn from_exif(value: u32) -> Self {
        match value {
            6 => Self::Rotate90,
            3 => Self::Rotate180,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }

    /// Clockwise rotation in degrees
    pub fn degrees(self) -> u16 {
        match self {
            Self::Normal => 0,
            Self::Rotate90 => 90,
            Self::Rotate180 => 180,
            Self::Rotate270 => 270,
        }
    }

    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Rotate90 | Self::Rotate270)
    }

    fn transform(self) -> Option<RotateFn> {
        match self {
            Self::Normal => None,
            Self::Rotate90 => Some(imageops::rotate90_in),
            Self::Rotate180 => Some(imageops::rotate180_in),
            Self::Rotate270 => Some(imageops::rotate270_in),
        }
    }
}

type RotateFn = fn(&RgbaImage, &mut RgbaImage) -> ImageResult<()>;

/// Best-effort read of the primary image's orientation tag
pub fn read_orientation(path: &Path) -> Option<OrientationTag> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    debug!("EXIF orientation {} for {:?}", value, path);
    Some(OrientationTag::from_exif(value))
}

/// Rotate into a freshly allocated buffer; the input is kept on any failure.
///
/// Returns `None` when `tag` needs no rotation.
pub fn rotate(
    buffer: &PixelBuffer,
    tag: OrientationTag,
    budget: &Arc<MemoryBudget>,
) -> Option<Attempt<PixelBuffer>> {
    let apply = tag.transform()?;

    let (width, height) = buffer.dimensions();
    let (out_width, out_height) = if tag.swaps_dimensions() {
        (height, width)
    } else {
        (width, height)
    };

    let mut rotated = match PixelBuffer::allocate(out_width, out_height, budget) {
        Attempt::Done(rotated) => rotated,
        other => return Some(other),
    };

    Some(match apply(buffer.as_image(), rotated.as_image_mut()) {
        Ok(()) => Attempt::Done(rotated),
        Err(e) => Attempt::Failed(ConvertError::system(format!("rotation failed: {}", e))),
    })
}

/// Apply `tag` to `buffer`. Never fails: on exhaustion or transform failure the
/// original buffer comes back together with the recorded degradation.
pub fn correct_orientation(
    buffer: PixelBuffer,
    tag: OrientationTag,
    budget: &Arc<MemoryBudget>,
) -> (PixelBuffer, Option<Degradation>) {
    let Some(attempt) = rotate(&buffer, tag, budget) else {
        return (buffer, None);
    };

    match attempt {
        Attempt::Done(rotated) => {
            debug!(
                "Rotated {}x{} by {} degrees -> {}x{}",
                buffer.width(),
                buffer.height(),
                tag.degrees(),
                rotated.width(),
                rotated.height()
            );
            (rotated, None)
        }
        Attempt::Exhausted(exhausted) => {
            warn!(
                "Out of memory rotating by {} degrees ({}), keeping original orientation",
                tag.degrees(),
                exhausted
            );
            (buffer, Some(Degradation::RotationSkipped))
        }
        Attempt::Failed(err) => {
            warn!(
                "Rotation by {} degrees failed: {}, keeping original orientation",
                tag.degrees(),
                err
            );
            (buffer, Some(Degradation::RotationSkipped))
        }
    }
}
