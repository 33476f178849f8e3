//! Remote download into a scoped temporary file

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::{ConvertError, Result};

/// Name prefix of downloaded temporaries
pub const DOWNLOAD_PREFIX: &str = "heic_dl_";

/// Name suffix of downloaded temporaries
pub const DOWNLOAD_SUFFIX: &str = ".heic";

const MAX_REDIRECTS: usize = 10;

/// Streams a remote resource into a temporary file that is deleted when its
/// [`TempPath`] is dropped.
#[derive(Debug, Clone)]
pub struct TempFileFetcher {
    client: reqwest::Client,
    read_timeout: Duration,
    temp_dir: PathBuf,
}

impl TempFileFetcher {
    /// Create a fetcher writing into `temp_dir`
    pub fn new(network: &NetworkConfig, temp_dir: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| ConvertError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            read_timeout: Duration::from_secs(network.read_timeout_secs),
            temp_dir,
        })
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Download `url`. On any failure the partial file is already gone when
    /// this returns.
    pub async fn fetch(&self, url: &Url) -> Result<TempPath> {
        let failed = |message: String| ConvertError::download_failed(url.as_str(), message);

        let mut response = timeout(self.read_timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| failed(format!("no response within {:?}", self.read_timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status)));
        }

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| failed(format!("cannot create {:?}: {}", self.temp_dir, e)))?;

        let (file, temp_path) = tempfile::Builder::new()
            .prefix(DOWNLOAD_PREFIX)
            .suffix(DOWNLOAD_SUFFIX)
            .tempfile_in(&self.temp_dir)
            .map_err(|e| failed(format!("cannot create temporary file: {}", e)))?
            .into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut total: u64 = 0;
        loop {
            let chunk = timeout(self.read_timeout, response.chunk())
                .await
                .map_err(|_| failed(format!("body stalled for {:?}", self.read_timeout)))?
                .map_err(|e| failed(e.to_string()))?;

            let Some(chunk) = chunk else {
                break;
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| failed(format!("write to {:?} failed: {}", temp_path, e)))?;
            total = total.saturating_add(chunk.len() as u64);
        }

        file.flush()
            .await
            .map_err(|e| failed(format!("flush of {:?} failed: {}", temp_path, e)))?;
        drop(file);

        debug!("Downloaded {} bytes from {} into {:?}", total, url, temp_path);
        Ok(temp_path)
    }
}
