//! JPEG encoding and output artifact naming

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::codecs::jpeg::JpegEncoder;
use image::ImageError;
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, warn};

use super::memory::PixelBuffer;
use super::Degradation;
use crate::error::{ConvertError, Result};

/// File name prefix of every converted output
pub const OUTPUT_PREFIX: &str = "heic_converted_";

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A JPEG written to local storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputArtifact {
    /// Absolute path of the output file
    pub path: PathBuf,

    /// Cache-busting token (unix millis at encode time)
    pub token: u64,

    pub width: u32,
    pub height: u32,

    /// Size of the written file in bytes
    pub file_size: u64,

    /// Best-effort stages that were skipped
    pub degradations: Vec<Degradation>,
}

impl OutputArtifact {
    /// Locatable reference handed back to the caller: `file://<path>?<token>`
    pub fn reference(&self) -> String {
        match Url::from_file_path(&self.path) {
            Ok(mut url) => {
                url.set_query(Some(&self.token.to_string()));
                url.to_string()
            }
            Err(()) => format!("file://{}?{}", self.path.display(), self.token),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Turn a reference returned by [`reference`](Self::reference) back into a
    /// filesystem path, dropping the cache-busting token
    pub fn local_path(reference: &str) -> Option<PathBuf> {
        if reference.starts_with("file:") {
            let mut url = Url::parse(reference).ok()?;
            url.set_query(None);
            url.set_fragment(None);
            return url.to_file_path().ok();
        }

        let path = reference.split('?').next().unwrap_or(reference);
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

impl fmt::Display for OutputArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Create `heic_converted_<token>.jpg`, or `_<n>` variants if taken. Never
/// opens an existing file.
fn create_output_file(dir: &Path, token: u64) -> Result<(PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{}{}.jpg", OUTPUT_PREFIX, token)
        } else {
            format!("{}{}_{}.jpg", OUTPUT_PREFIX, token, attempt)
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(ConvertError::write_failed(path, e)),
        }
    }

    Err(ConvertError::write_failed(
        dir.to_path_buf(),
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free output name for token {}", token),
        ),
    ))
}

fn encode_into(file: File, buffer: PixelBuffer, quality: u8, path: &Path) -> Result<()> {
    // The reservation stays held until encoding is done.
    let (rgb, _reservation) = buffer.into_rgb().ok_or_else(|| {
        ConvertError::compression_failed("pixel buffer length does not match its dimensions")
    })?;

    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| match e {
            ImageError::IoError(source) => ConvertError::write_failed(path.to_path_buf(), source),
            other => ConvertError::compression_failed(other.to_string()),
        })?;

    writer
        .flush()
        .map_err(|e| ConvertError::write_failed(path.to_path_buf(), e))
}

/// Encode `buffer` as JPEG into a freshly named file in `dir`.
///
/// The buffer is consumed. A partially written file is removed on failure.
pub fn write_jpeg(
    buffer: PixelBuffer,
    quality: u8,
    dir: &Path,
    degradations: Vec<Degradation>,
) -> Result<OutputArtifact> {
    let token = unix_millis();
    let (width, height) = buffer.dimensions();
    let (path, file) = create_output_file(dir, token)?;

    if let Err(err) = encode_into(file, buffer, quality, &path) {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to remove partial output {:?}: {}", path, e);
        }
        return Err(err);
    }

    let file_size = std::fs::metadata(&path)
        .map_err(|e| ConvertError::write_failed(path.clone(), e))?
        .len();

    debug!(
        "Encoded {}x{} at quality {} into {:?} ({} bytes)",
        width, height, quality, path, file_size
    );

    Ok(OutputArtifact {
        path,
        token,
        width,
        height,
        file_size,
        degradations,
    })
}
