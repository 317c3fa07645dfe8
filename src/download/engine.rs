//! Download engine: cleanup, then a semaphore-bounded fan-out over the catalog.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use feedsync_core::{Catalog, DownloadEngine, HttpFetcher, IntegrityPolicy, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Arc::new(HttpFetcher::with_defaults()?);
//! let engine = DownloadEngine::new(5, RetryPolicy::default(), IntegrityPolicy::default(), fetcher)?;
//! let summary = engine.run(&Catalog::builtin(), Path::new("./lists")).await?;
//! println!("{}/{} committed", summary.succeeded(), summary.total());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::cleanup::cleanup_stale_outputs;
use super::client::Fetcher;
use super::commit::{commit, temp_path_for};
use super::integrity::IntegrityPolicy;
use super::result::{DownloadResult, FailureKind, FailureReason, RunSummary};
use super::retry::{RetryController, RetryOutcome, RetryPolicy};
use crate::catalog::{Catalog, DownloadTask, is_valid_url};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Error type for download engine operations.
///
/// Individual task failures never surface here; they are recorded in the
/// [`RunSummary`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The output directory could not be created.
    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        /// Requested directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Runs a catalog through the fetch, validate, commit pipeline.
///
/// # Concurrency Model
///
/// - Each catalog entry runs in its own Tokio task
/// - A semaphore permit is acquired before spawning, so at most
///   `concurrency` fetches are in flight
/// - Permits are released when the task finishes (RAII)
/// - `run` awaits every task before returning; a panicked task is recorded
///   as a failed result
pub struct DownloadEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
    integrity: IntegrityPolicy,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("concurrency", &self.concurrency)
            .field("retry_policy", &self.retry_policy)
            .field("integrity", &self.integrity)
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates a new engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is outside
    /// 1..=100.
    #[instrument(level = "debug", skip(retry_policy, integrity, fetcher))]
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        integrity: IntegrityPolicy,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            min_size_bytes = integrity.min_size_bytes(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            integrity,
            fetcher,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Cleans `output_dir`, downloads every catalog entry into it, and
    /// returns the per-task results in catalog order.
    ///
    /// # Errors
    ///
    /// [`EngineError::OutputDir`] if the directory cannot be created,
    /// [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    #[instrument(skip(self, catalog), fields(output_dir = %output_dir.display(), tasks = catalog.len()))]
    pub async fn run(&self, catalog: &Catalog, output_dir: &Path) -> Result<RunSummary, EngineError> {
        let started = Instant::now();
        info!(concurrency = self.concurrency, "starting run");

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| EngineError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        // Must finish before any worker writes into the directory.
        cleanup_stale_outputs(output_dir, &catalog.output_extensions()).await;

        let mut handles: Vec<(String, JoinHandle<DownloadResult>)> =
            Vec::with_capacity(catalog.len());

        for task in catalog.tasks() {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let task = task.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let retry_policy = self.retry_policy.clone();
            let integrity = self.integrity;
            let output_dir = output_dir.to_path_buf();
            let name = task.name().to_string();

            handles.push((
                name,
                tokio::spawn(async move {
                    let _permit = permit;
                    process_task(fetcher.as_ref(), &retry_policy, &integrity, &task, &output_dir)
                        .await
                }),
            ));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(name = %name, error = %e, "download task panicked");
                    DownloadResult::failed(
                        name,
                        0,
                        FailureReason::new(FailureKind::Panicked, e.to_string()),
                    )
                }
            };
            results.push(result);
        }

        let summary = RunSummary::new(results, started.elapsed());
        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            total = summary.total(),
            elapsed_ms = summary.elapsed().as_millis(),
            "run complete"
        );
        Ok(summary)
    }
}

/// Full pipeline for one task. Never fails; every outcome is a result.
#[instrument(skip_all, fields(name = %task.name()))]
async fn process_task(
    fetcher: &dyn Fetcher,
    retry_policy: &RetryPolicy,
    integrity: &IntegrityPolicy,
    task: &DownloadTask,
    output_dir: &Path,
) -> DownloadResult {
    if !is_valid_url(task.source_url()) {
        warn!(url = %task.source_url(), "invalid URL, not attempted");
        return DownloadResult::failed(task.name(), 0, FailureReason::invalid_url(task.source_url()));
    }

    let temp_path = temp_path_for(output_dir, task.name());
    let destination = output_dir.join(task.name());

    match RetryController::new(fetcher, retry_policy, integrity)
        .run(task, &temp_path)
        .await
    {
        RetryOutcome::Succeeded { attempts, .. } => match commit(&temp_path, &destination).await {
            Ok(outcome) => {
                info!(
                    path = %outcome.path.display(),
                    bytes = outcome.bytes,
                    digest = %outcome.digest,
                    attempts,
                    "download committed"
                );
                DownloadResult::committed(task.name(), outcome.bytes, outcome.digest, attempts)
            }
            Err(e) if e.is_published() => {
                error!(error = %e, attempts, "file committed but digest unavailable");
                DownloadResult::failed(task.name(), attempts, FailureReason::from(&e))
            }
            Err(e) => {
                error!(error = %e, attempts, "commit failed");
                DownloadResult::failed(task.name(), attempts, FailureReason::from(&e))
            }
        },
        RetryOutcome::Exhausted { attempts, reason } => {
            error!(url = %task.source_url(), attempts, reason = %reason, "download failed after all attempts");
            DownloadResult::failed(task.name(), attempts, reason)
        }
    }
}
