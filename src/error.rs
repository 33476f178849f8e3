//! Error types and handling for heic-convert

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Main error type for conversion operations
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The image reference was empty or malformed
    #[error("Invalid reference: {message}")]
    InvalidReference { message: String },

    /// No resolution strategy produced an existing file
    #[error("File not found: {reference}")]
    SourceNotFound { reference: String },

    /// Remote fetch failed (status, I/O or timeout)
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    /// Dimensions could not be determined from the source
    #[error("Cannot decode image bounds: {message} (file: {file:?})")]
    UnreadableImage { message: String, file: PathBuf },

    /// The decoder produced no pixel buffer
    #[error("Failed to decode image: {message} (file: {file:?})")]
    DecodeFailed { message: String, file: PathBuf },

    /// The memory ceiling could not accommodate a required allocation
    #[error("Out of memory during {stage}: requested {requested} bytes, {available} available")]
    OutOfMemory {
        stage: &'static str,
        requested: u64,
        available: u64,
    },

    /// The JPEG encoder reported failure
    #[error("Failed to compress image: {message}")]
    CompressionFailed { message: String },

    /// Writing the output file failed
    #[error("Failed to write {file:?}: {source}")]
    WriteFailed {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Request parameters out of range
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// Worker or runtime failures
    #[error("System error: {message}")]
    SystemError { message: String },
}

/// Stable, host-facing name of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidReference,
    SourceNotFound,
    DownloadFailed,
    UnreadableImage,
    DecodeFailed,
    OutOfMemory,
    CompressionFailed,
    WriteFailed,
    InvalidParameters,
    Config,
    System,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidReference => "InvalidReference",
            Self::SourceNotFound => "SourceNotFound",
            Self::DownloadFailed => "DownloadFailed",
            Self::UnreadableImage => "UnreadableImage",
            Self::DecodeFailed => "DecodeFailed",
            Self::OutOfMemory => "OutOfMemory",
            Self::CompressionFailed => "CompressionFailed",
            Self::WriteFailed => "WriteFailed",
            Self::InvalidParameters => "InvalidParameters",
            Self::Config => "Config",
            Self::System => "System",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConvertError {
    /// Create a new invalid reference error
    pub fn invalid_reference<S: Into<String>>(message: S) -> Self {
        Self::InvalidReference {
            message: message.into(),
        }
    }

    /// Create a new source not found error
    pub fn source_not_found<S: Into<String>>(reference: S) -> Self {
        Self::SourceNotFound {
            reference: reference.into(),
        }
    }

    /// Create a new download failure
    pub fn download_failed<U: Into<String>, S: Into<String>>(url: U, message: S) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new unreadable image error
    pub fn unreadable<S: Into<String>>(message: S, file: PathBuf) -> Self {
        Self::UnreadableImage {
            message: message.into(),
            file,
        }
    }

    /// Create a new decode failure
    pub fn decode_failed<S: Into<String>>(message: S, file: PathBuf) -> Self {
        Self::DecodeFailed {
            message: message.into(),
            file,
        }
    }

    /// Create a new out of memory error
    pub fn out_of_memory(stage: &'static str, requested: u64, available: u64) -> Self {
        Self::OutOfMemory {
            stage,
            requested,
            available,
        }
    }

    /// Create a new compression failure
    pub fn compression_failed<S: Into<String>>(message: S) -> Self {
        Self::CompressionFailed {
            message: message.into(),
        }
    }

    /// Create a new write failure
    pub fn write_failed(file: PathBuf, source: std::io::Error) -> Self {
        Self::WriteFailed { file, source }
    }

    /// Create a new invalid parameters error
    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new system error
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::SystemError {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidReference { .. } => ErrorKind::InvalidReference,
            Self::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            Self::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            Self::UnreadableImage { .. } => ErrorKind::UnreadableImage,
            Self::DecodeFailed { .. } => ErrorKind::DecodeFailed,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::CompressionFailed { .. } => ErrorKind::CompressionFailed,
            Self::WriteFailed { .. } => ErrorKind::WriteFailed,
            Self::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            Self::ConfigError { .. } | Self::SerdeError(_) => ErrorKind::Config,
            Self::SystemError { .. } => ErrorKind::System,
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::UnreadableImage { file, .. }
            | Self::DecodeFailed { file, .. }
            | Self::WriteFailed { file, .. } => Some(file),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidReference { .. } => "Invalid URI".to_string(),
            Self::SourceNotFound { reference } => format!("File not found: {}", reference),
            Self::UnreadableImage { .. } => {
                "Cannot decode image. File might be corrupted or in an unsupported format."
                    .to_string()
            }
            Self::DecodeFailed { .. } => {
                "Failed to decode bitmap. Format unsupported or file corrupt.".to_string()
            }
            Self::OutOfMemory { .. } => "Out of Memory".to_string(),
            Self::CompressionFailed { .. } => "Failed to compress bitmap".to_string(),
            other => format!("Conversion error: {}", other),
        }
    }
}

// Convert serde errors to our error type
impl From<toml::de::Error> for ConvertError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for ConvertError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ConvertError::config("test message");
        assert!(matches!(err, ConvertError::ConfigError { .. }));
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_out_of_memory_is_distinct_from_decode_failure() {
        let oom = ConvertError::out_of_memory("decode", 1024, 10);
        let decode = ConvertError::decode_failed("bad data", PathBuf::from("a.heic"));
        assert_eq!(oom.kind(), ErrorKind::OutOfMemory);
        assert_eq!(decode.kind(), ErrorKind::DecodeFailed);
        assert_eq!(oom.user_message(), "Out of Memory");
    }

    #[test]
    fn test_user_messages() {
        let err = ConvertError::source_not_found("content://missing.heic");
        assert_eq!(err.user_message(), "File not found: content://missing.heic");

        let err = ConvertError::invalid_parameters("quality must be 0-100");
        assert!(err.user_message().starts_with("Conversion error:"));
    }

    #[test]
    fn test_file_path() {
        let err = ConvertError::unreadable("no header", PathBuf::from("x.heic"));
        assert_eq!(err.file_path(), Some(&PathBuf::from("x.heic")));
        assert!(ConvertError::compression_failed("x").file_path().is_none());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::DownloadFailed.to_string(), "DownloadFailed");
        assert_eq!(
            ConvertError::write_failed(
                PathBuf::from("out.jpg"),
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            )
            .kind()
            .as_str(),
            "WriteFailed"
        );
    }
}
