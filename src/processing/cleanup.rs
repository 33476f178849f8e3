//! Scoped release of the resolved source

use std::path::Path;

use tracing::{debug, warn};

use crate::source::{ResolvedSource, SourceOrigin};

/// Holds the resolved source for the duration of a conversion.
///
/// An owned temporary download is deleted when the guard is released or
/// dropped, including during a panic unwind. Borrowed sources are left alone.
/// Deletion failures are logged, never returned.
#[derive(Debug)]
pub struct SourceGuard {
    source: ResolvedSource,
}

impl SourceGuard {
    pub fn new(source: ResolvedSource) -> Self {
        Self { source }
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn origin(&self) -> SourceOrigin {
        self.source.origin()
    }

    /// Release the source now
    pub fn release(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        let Some(temp) = self.source.take_temp() else {
            return;
        };

        let path = temp.to_path_buf();
        match temp.close() {
            Ok(()) => debug!("Removed temporary download {:?}", path),
            Err(e) => warn!("Failed to remove temporary download {:?}: {}", path, e),
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}
