//! The fetch, validate, commit pipeline.
//!
//! Each catalog entry goes through:
//!
//! 1. URL validation (invalid entries are never attempted)
//! 2. Up to N sequential attempts of [`Fetcher::fetch`] into `<name>.part`
//!    followed by an [`IntegrityPolicy`] check
//! 3. An atomic rename onto `<name>` and an MD5 fingerprint for the logs
//!
//! [`DownloadEngine`] runs a cleanup pass over the output directory and then
//! fans the entries out over a bounded set of Tokio tasks.

mod cleanup;
mod client;
mod commit;
mod constants;
mod engine;
mod error;
mod integrity;
mod result;
mod retry;

pub use cleanup::{CleanupReport, cleanup_stale_outputs};
pub use client::{Fetcher, FetcherConfig, HttpFetcher};
pub use commit::{CommitOutcome, commit, content_digest, temp_path_for};
pub use constants::{
    ATTEMPT_TIMEOUT_SECS, CONNECT_TIMEOUT_SECS, DEFAULT_MIN_SIZE_BYTES, GZIP_PROBE_BYTES,
    TEMP_SUFFIX,
};
pub use engine::{DEFAULT_CONCURRENCY, DownloadEngine, EngineError};
pub use error::{CleanupError, CommitError, FetchError, IntegrityError};
pub use integrity::IntegrityPolicy;
pub use result::{DownloadResult, FailureKind, FailureReason, RunSummary};
pub use retry::{AttemptState, DEFAULT_MAX_ATTEMPTS, RetryController, RetryOutcome, RetryPolicy};

// Note: no module-local Result aliases; signatures spell out the error type.
