//! Parsing of opaque image references

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use reqwest::Url;

use crate::error::{ConvertError, Result};

/// The caller-supplied input reference: a cache name, filesystem path,
/// `file://` URL, content-style URI or remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    raw: String,
}

impl ImageReference {
    /// Wrap a raw reference, rejecting empty input
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConvertError::invalid_reference("reference is empty"));
        }
        Ok(Self {
            raw: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Last non-empty path segment without query or fragment, percent-decoded.
    ///
    /// Falls back to the raw segment when decoding fails. Segments that would
    /// escape a cache directory yield `None`.
    pub fn file_name(&self) -> Option<String> {
        let segment = match Url::parse(&self.raw) {
            Ok(url) if !url.cannot_be_a_base() => url
                .path_segments()?
                .rev()
                .find(|segment| !segment.is_empty())?
                .to_string(),
            _ => {
                let without_fragment = self.raw.split('#').next().unwrap_or_default();
                let without_query = without_fragment.split('?').next().unwrap_or_default();
                without_query
                    .rsplit('/')
                    .find(|segment| !segment.is_empty())?
                    .to_string()
            }
        };

        let decoded = match percent_decode_str(&segment).decode_utf8() {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => segment.to_string(),
        };

        let escapes = decoded == "."
            || decoded == ".."
            || decoded.contains('/')
            || decoded.contains('\\')
            || decoded.contains('\0')
            || decoded.ends_with(':');
        (!escapes).then_some(decoded)
    }

    /// Path of a direct local-file reference (`file://` URL or absolute path)
    pub fn direct_path(&self) -> Option<PathBuf> {
        if self.raw.starts_with("file:") {
            return Url::parse(&self.raw).ok()?.to_file_path().ok();
        }

        let path = Path::new(&self.raw);
        path.is_absolute().then(|| path.to_path_buf())
    }

    /// The reference as a fetchable http(s) URL.
    ///
    /// Loopback hosts are excluded unless `allow_loopback` is set.
    pub fn remote_url(&self, allow_loopback: bool) -> Option<Url> {
        let url = Url::parse(&self.raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        let host = url.host_str()?;
        if !allow_loopback && is_loopback_host(host) {
            return None;
        }

        Some(url)
    }
}

fn is_loopback_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback();
    }

    let host = host.to_ascii_lowercase();
    host == "localhost" || host.ends_with(".localhost")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn reference(raw: &str) -> ImageReference {
        ImageReference::parse(raw).unwrap()
    }

    #[test]
    fn test_empty_reference_rejected() {
        assert_eq!(ImageReference::parse("").unwrap_err().kind(), ErrorKind::InvalidReference);
        assert_eq!(ImageReference::parse("  \t").unwrap_err().kind(), ErrorKind::InvalidReference);
    }

    #[test]
    fn test_file_name_extraction() {
        assert_eq!(reference("photo.heic").file_name().as_deref(), Some("photo.heic"));
        assert_eq!(
            reference("content://media/external/images/IMG_0001.HEIC").file_name().as_deref(),
            Some("IMG_0001.HEIC")
        );
        assert_eq!(
            reference("https://cdn.example.com/a/b/photo.heic?sig=abc#frag").file_name().as_deref(),
            Some("photo.heic")
        );
        assert_eq!(reference("/data/cache/dir/").file_name().as_deref(), Some("dir"));
    }

    #[test]
    fn test_file_name_percent_decoding() {
        assert_eq!(
            reference("file:///tmp/my%20photo.heic").file_name().as_deref(),
            Some("my photo.heic")
        );
        // invalid UTF-8 after decoding keeps the raw segment
        assert_eq!(reference("/tmp/bad%FF.heic").file_name().as_deref(), Some("bad%FF.heic"));
    }

    #[test]
    fn test_file_name_never_escapes() {
        assert_eq!(reference("/tmp/..").file_name(), None);
        assert_eq!(reference("https://host/%2E%2E").file_name(), None);
        assert_eq!(reference("https://host/a%2Fb.heic").file_name(), None);
        assert_eq!(reference("https://host/").file_name(), None);
        assert_eq!(reference("https:").file_name(), None);
    }

    #[test]
    fn test_direct_path() {
        assert_eq!(
            reference("file:///tmp/photo.heic").direct_path(),
            Some(PathBuf::from("/tmp/photo.heic"))
        );
        assert_eq!(
            reference("/tmp/photo.heic").direct_path(),
            Some(PathBuf::from("/tmp/photo.heic"))
        );
        assert_eq!(reference("photo.heic").direct_path(), None);
        assert_eq!(reference("https://example.com/photo.heic").direct_path(), None);
    }

    #[test]
    fn test_remote_url() {
        assert!(reference("https://example.com/photo.heic").remote_url(false).is_some());
        assert!(reference("http://example.com/photo.heic").remote_url(false).is_some());

        assert!(reference("ftp://example.com/photo.heic").remote_url(false).is_none());
        assert!(reference("file:///tmp/photo.heic").remote_url(false).is_none());
        assert!(reference("photo.heic").remote_url(false).is_none());
    }

    #[test]
    fn test_loopback_is_not_remote_by_default() {
        for raw in [
            "http://localhost:8080/photo.heic",
            "http://LOCALHOST/photo.heic",
            "http://127.0.0.1/photo.heic",
            "http://[::1]:3000/photo.heic",
            "http://app.localhost/photo.heic",
        ] {
            assert!(reference(raw).remote_url(false).is_none(), "{}", raw);
            assert!(reference(raw).remote_url(true).is_some(), "{}", raw);
        }
    }
}
