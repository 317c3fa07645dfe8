//! Error types for the download module.
//!
//! Each pipeline stage has its own error enum so the retry controller can
//! decide what is retried, and every variant carries the URL or path needed
//! to make a log line actionable.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from a single fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL failed validation; no request was sent.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The attempt exceeded its deadline.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Any non-2xx response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Local write failure while streaming the body.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The temp artifact path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Maps a reqwest error, separating deadline expiry from other failures.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from inspecting a completed temp artifact.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Payload is below the minimum size threshold.
    #[error("{path} is too small: {actual_bytes} bytes, minimum {min_bytes}")]
    TooSmall {
        /// Inspected file.
        path: PathBuf,
        /// Size found on disk.
        actual_bytes: u64,
        /// Configured minimum.
        min_bytes: u64,
    },

    /// Payload declared as gzip does not decode.
    #[error("{path} is not a valid gzip stream: {source}")]
    CorruptArchive {
        /// Inspected file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be inspected at all.
    #[error("IO error inspecting {path}: {source}")]
    Io {
        /// Inspected file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl IntegrityError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from moving a validated artifact into place.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The rename onto the destination failed; the temp artifact was removed.
    #[error("failed to move {temp} into place at {destination}: {source}")]
    Rename {
        /// Temp artifact path.
        temp: PathBuf,
        /// Final destination path.
        destination: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file was renamed into place but could not be read back for its digest.
    #[error("committed {path} but failed to fingerprint it: {source}")]
    Digest {
        /// Final destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// A stale entry that could not be removed. Logged, never fatal.
#[derive(Debug, Error)]
#[error("failed to remove stale {path}: {source}")]
pub struct CleanupError {
    /// Entry that could not be removed.
    pub path: PathBuf,
    /// The underlying IO error.
    #[source]
    pub source: std::io::Error,
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs a
// URL or path that the source error does not carry.

impl CommitError {
    /// Whether the new content is already visible at the destination.
    #[must_use]
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Digest { .. })
    }
}
