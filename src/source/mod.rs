//! Resolution of image references to local files
//!
//! A reference is tried against an ordered list of local lookup strategies
//! (primary cache, external cache, direct path). Only when none of them yields
//! an existing file is a remote reference downloaded into the cache.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempPath;
use tracing::debug;

use crate::config::ConverterConfig;
use crate::error::{ConvertError, Result};

pub mod fetch;
pub mod reference;

pub use fetch::TempFileFetcher;
pub use reference::ImageReference;

/// Where a resolved source came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    PrimaryCache,
    ExternalCache,
    DirectPath,
    Remote,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrimaryCache => "primary cache",
            Self::ExternalCache => "external cache",
            Self::DirectPath => "direct path",
            Self::Remote => "remote download",
        };
        f.write_str(name)
    }
}

/// An existing local file to convert.
///
/// Downloaded sources own their temporary file; everything else is borrowed
/// and must never be deleted.
#[derive(Debug)]
pub struct ResolvedSource {
    path: PathBuf,
    origin: SourceOrigin,
    temp: Option<TempPath>,
}

impl ResolvedSource {
    /// A pre-existing file the pipeline does not own
    pub fn local(path: PathBuf, origin: SourceOrigin) -> Self {
        Self {
            path,
            origin,
            temp: None,
        }
    }

    /// A downloaded temporary owned by the pipeline
    pub fn downloaded(temp: TempPath) -> Self {
        Self {
            path: temp.to_path_buf(),
            origin: SourceOrigin::Remote,
            temp: Some(temp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> SourceOrigin {
        self.origin
    }

    pub fn is_owned(&self) -> bool {
        self.temp.is_some()
    }

    pub(crate) fn take_temp(&mut self) -> Option<TempPath> {
        self.temp.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupStrategy {
    PrimaryCache,
    ExternalCache,
    DirectPath,
}

const LOCAL_LOOKUPS: [LookupStrategy; 3] = [
    LookupStrategy::PrimaryCache,
    LookupStrategy::ExternalCache,
    LookupStrategy::DirectPath,
];

/// Resolves references in strict priority order
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    primary_dir: PathBuf,
    external_dir: Option<PathBuf>,
    allow_loopback: bool,
    fetcher: TempFileFetcher,
}

impl ResourceLocator {
    pub fn new(config: &ConverterConfig) -> Result<Self> {
        let primary_dir = config.cache.primary_dir.clone();
        Ok(Self {
            fetcher: TempFileFetcher::new(&config.network, primary_dir.clone())?,
            primary_dir,
            external_dir: config.cache.external_dir.clone(),
            allow_loopback: config.network.allow_loopback,
        })
    }

    /// Try the local strategies only
    pub fn find_local(&self, reference: &ImageReference) -> Option<ResolvedSource> {
        let file_name = reference.file_name();
        LOCAL_LOOKUPS
            .iter()
            .find_map(|strategy| self.lookup(*strategy, reference, file_name.as_deref()))
    }

    fn lookup(
        &self,
        strategy: LookupStrategy,
        reference: &ImageReference,
        file_name: Option<&str>,
    ) -> Option<ResolvedSource> {
        let (path, origin) = match strategy {
            LookupStrategy::PrimaryCache => {
                (self.primary_dir.join(file_name?), SourceOrigin::PrimaryCache)
            }
            LookupStrategy::ExternalCache => (
                self.external_dir.as_ref()?.join(file_name?),
                SourceOrigin::ExternalCache,
            ),
            LookupStrategy::DirectPath => (reference.direct_path()?, SourceOrigin::DirectPath),
        };

        path.is_file().then(|| ResolvedSource::local(path, origin))
    }

    /// Resolve `raw` to an existing local file, downloading remote references
    pub async fn resolve(&self, raw: &str) -> Result<ResolvedSource> {
        let reference = ImageReference::parse(raw)?;

        if let Some(source) = self.find_local(&reference) {
            debug!("Resolved {} via {} to {:?}", raw, source.origin(), source.path());
            return Ok(source);
        }

        if let Some(url) = reference.remote_url(self.allow_loopback) {
            debug!("Fetching {} into {:?}", url, self.fetcher.temp_dir());
            let temp = self.fetcher.fetch(&url).await?;
            return Ok(ResolvedSource::downloaded(temp));
        }

        Err(ConvertError::source_not_found(raw))
    }
}
