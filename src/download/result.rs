//! Per-task results and the aggregate run summary.

use std::fmt;
use std::time::Duration;

use super::error::{CommitError, FetchError, IntegrityError};

/// Classification of a terminal or per-attempt failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// URL rejected before any request; never attempted.
    InvalidUrl,
    /// Timeout, connection, DNS, TLS or non-2xx response.
    Network,
    /// Local filesystem failure while writing or inspecting the temp artifact.
    Io,
    /// Payload below the minimum size threshold.
    TooSmall,
    /// Gzip payload that does not decode.
    CorruptArchive,
    /// Validated artifact could not be moved into place. Never retried.
    Commit,
    /// The worker task panicked.
    Panicked,
}

impl FailureKind {
    /// Stable label for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::Network => "network",
            Self::Io => "io",
            Self::TooSmall => "too_small",
            Self::CorruptArchive => "corrupt_archive",
            Self::Commit => "commit",
            Self::Panicked => "panicked",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task (or one attempt of it) failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    kind: FailureKind,
    message: String,
}

impl FailureReason {
    /// Creates a reason from a kind and message.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Reason for a URL rejected by validation.
    #[must_use]
    pub fn invalid_url(url: &str) -> Self {
        Self::new(FailureKind::InvalidUrl, format!("invalid URL: {url}"))
    }

    /// Failure classification.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Human-readable detail.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl From<&FetchError> for FailureReason {
    fn from(error: &FetchError) -> Self {
        let kind = match error {
            FetchError::InvalidUrl { .. } => FailureKind::InvalidUrl,
            FetchError::Network { .. }
            | FetchError::Timeout { .. }
            | FetchError::HttpStatus { .. } => FailureKind::Network,
            FetchError::Io { .. } => FailureKind::Io,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<&IntegrityError> for FailureReason {
    fn from(error: &IntegrityError) -> Self {
        let kind = match error {
            IntegrityError::TooSmall { .. } => FailureKind::TooSmall,
            IntegrityError::CorruptArchive { .. } => FailureKind::CorruptArchive,
            IntegrityError::Io { .. } => FailureKind::Io,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<&CommitError> for FailureReason {
    fn from(error: &CommitError) -> Self {
        Self::new(FailureKind::Commit, error.to_string())
    }
}

/// Outcome of one catalog entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    name: String,
    bytes_written: u64,
    content_digest: Option<String>,
    attempts_used: u32,
    failure: Option<FailureReason>,
}

impl DownloadResult {
    /// A committed download.
    pub fn committed(
        name: impl Into<String>,
        bytes_written: u64,
        content_digest: impl Into<String>,
        attempts_used: u32,
    ) -> Self {
        Self {
            name: name.into(),
            bytes_written,
            content_digest: Some(content_digest.into()),
            attempts_used,
            failure: None,
        }
    }

    /// A download that did not produce a committed file.
    pub fn failed(name: impl Into<String>, attempts_used: u32, failure: FailureReason) -> Self {
        Self {
            name: name.into(),
            bytes_written: 0,
            content_digest: None,
            attempts_used,
            failure: Some(failure),
        }
    }

    /// Destination filename.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the file was committed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Size of the committed file (0 on failure).
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Hex MD5 of the committed file; present iff the task succeeded.
    #[must_use]
    pub fn content_digest(&self) -> Option<&str> {
        self.content_digest.as_deref()
    }

    /// Fetch attempts made (0 when the URL was rejected up front).
    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Last recorded failure; present iff the task failed.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }
}

/// Aggregate of one run, with results in catalog order.
#[derive(Debug, Clone)]
pub struct RunSummary {
    succeeded: usize,
    elapsed: Duration,
    results: Vec<DownloadResult>,
}

impl RunSummary {
    /// Builds the summary, counting successes from `results`.
    #[must_use]
    pub fn new(results: Vec<DownloadResult>, elapsed: Duration) -> Self {
        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        Self {
            succeeded,
            elapsed,
            results,
        }
    }

    /// Number of catalog entries processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Number of committed downloads.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Number of failed downloads.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.total() - self.succeeded
    }

    /// Wall-clock time of the run, cleanup included.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Per-task results in catalog order.
    #[must_use]
    pub fn results(&self) -> &[DownloadResult] {
        &self.results
    }

    /// Looks up a result by destination name.
    #[must_use]
    pub fn result(&self, name: &str) -> Option<&DownloadResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// `true` when every task succeeded; drives the process exit status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.succeeded == self.total()
    }
}
