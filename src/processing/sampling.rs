//! Power-of-two subsampling plan for the decode pass

use std::fmt;

use super::probe::ProbedDimensions;

/// Integer decode divisor, always a power of two
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubsampleFactor(u32);

impl SubsampleFactor {
    /// Full-resolution decode
    pub const NONE: Self = Self(1);

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_subsampled(self) -> bool {
        self.0 > 1
    }

    /// Dimensions after dividing by the factor, never below 1
    pub fn apply(self, width: u32, height: u32) -> (u32, u32) {
        ((width / self.0).max(1), (height / self.0).max(1))
    }
}

impl Default for SubsampleFactor {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for SubsampleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1/{}", self.0)
    }
}

/// Largest power of two keeping both halved dimensions at or above `bound`.
///
/// The decoded buffer is intentionally left somewhat larger than the bound;
/// the precision resizer does the exact fit. A bound of 0 means no resizing
/// and always yields [`SubsampleFactor::NONE`].
pub fn plan_subsample(dimensions: ProbedDimensions, bound: u32) -> SubsampleFactor {
    if bound == 0 {
        return SubsampleFactor::NONE;
    }

    let half_width = dimensions.width / 2;
    let half_height = dimensions.height / 2;

    let mut factor: u32 = 1;
    while half_height / factor >= bound && half_width / factor >= bound {
        match factor.checked_mul(2) {
            Some(next) => factor = next,
            None => break,
        }
    }

    SubsampleFactor(factor)
}
