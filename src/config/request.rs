//! Per-call conversion parameters

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Default JPEG quality when the caller supplies none
pub const DEFAULT_QUALITY: u8 = 90;

/// One conversion request: what to convert and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertRequest {
    /// Opaque input reference (cache name, path, `file://` or remote URL)
    pub reference: String,

    /// JPEG quality (0-100)
    pub quality: u8,

    /// Maximum output dimension on both axes (0 = no resizing)
    pub bound: u32,
}

impl ConvertRequest {
    /// Create a new request with default quality and no bound
    pub fn new<S: Into<String>>(reference: S) -> Self {
        Self {
            reference: reference.into(),
            quality: DEFAULT_QUALITY,
            bound: 0,
        }
    }

    /// Set output quality
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Set the maximum output dimension
    pub fn bound(mut self, bound: u32) -> Self {
        self.bound = bound;
        self
    }

    /// Whether bounded downscaling was requested
    pub fn has_bound(&self) -> bool {
        self.bound > 0
    }

    /// Validate request parameters
    pub fn validate(&self) -> Result<()> {
        if self.reference.trim().is_empty() {
            return Err(ConvertError::invalid_reference("reference is empty"));
        }

        if self.quality > 100 {
            return Err(ConvertError::invalid_parameters(
                format!("quality must be between 0 and 100, got {}", self.quality)
            ));
        }

        Ok(())
    }
}
