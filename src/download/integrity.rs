//! Post-fetch checks on a completed temp artifact.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::{debug, instrument};

use super::constants::{DEFAULT_MIN_SIZE_BYTES, GZIP_PROBE_BYTES};
use super::error::IntegrityError;
use crate::catalog::ResourceKind;

/// Thresholds applied to every fetched artifact before commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityPolicy {
    min_size_bytes: u64,
    gzip_probe_bytes: usize,
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        Self {
            min_size_bytes: DEFAULT_MIN_SIZE_BYTES,
            gzip_probe_bytes: GZIP_PROBE_BYTES,
        }
    }
}

impl IntegrityPolicy {
    /// Creates a policy with a custom size floor and the default gzip probe.
    ///
    /// The floor is clamped to at least 1 byte so an empty body never passes.
    #[must_use]
    pub fn new(min_size_bytes: u64) -> Self {
        Self {
            min_size_bytes: min_size_bytes.max(1),
            ..Self::default()
        }
    }

    /// Minimum accepted file size in bytes.
    #[must_use]
    pub fn min_size_bytes(&self) -> u64 {
        self.min_size_bytes
    }

    /// Checks the artifact at `path`, returning its size when acceptable.
    ///
    /// Plaintext payloads only need to meet the size floor. Gzip payloads must
    /// also decompress for at least the probe length (or to a clean end of
    /// stream if shorter).
    ///
    /// # Errors
    ///
    /// [`IntegrityError::TooSmall`], [`IntegrityError::CorruptArchive`], or
    /// [`IntegrityError::Io`] if the file cannot be inspected.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub async fn check(&self, path: &Path, kind: ResourceKind) -> Result<u64, IntegrityError> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| IntegrityError::io(path, e))?
            .len();

        if size < self.min_size_bytes {
            return Err(IntegrityError::TooSmall {
                path: path.to_path_buf(),
                actual_bytes: size,
                min_bytes: self.min_size_bytes,
            });
        }

        if kind == ResourceKind::Gzip {
            let owned = path.to_path_buf();
            let probe = self.gzip_probe_bytes;
            tokio::task::spawn_blocking(move || probe_gzip(&owned, probe))
                .await
                .map_err(|e| IntegrityError::io(path, std::io::Error::other(e)))??;
        }

        debug!(size, ?kind, "artifact passed integrity checks");
        Ok(size)
    }
}

fn probe_gzip(path: &Path, probe_bytes: usize) -> Result<(), IntegrityError> {
    let file = File::open(path).map_err(|e| IntegrityError::io(path, e))?;
    let mut decoded = Vec::with_capacity(probe_bytes);
    GzDecoder::new(file)
        .take(probe_bytes as u64)
        .read_to_end(&mut decoded)
        .map_err(|source| IntegrityError::CorruptArchive {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}
