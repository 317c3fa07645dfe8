//! Bounded retry of the fetch-then-validate pair.
//!
//! Every fetch or integrity failure is retried until the attempt budget is
//! spent. There is no permanent/transient split.
//!
//! The loop is driven by [`AttemptState`], whose transitions are pure
//! functions so that exhaustion and reason propagation can be tested without
//! any I/O.
//!
//! # Example
//!
//! ```
//! use feedsync_core::download::{AttemptState, FailureKind, FailureReason};
//!
//! let reason = FailureReason::new(FailureKind::Network, "HTTP 503");
//! let state = AttemptState::after_fetch(3, 3, Err(reason));
//! assert!(matches!(state, AttemptState::Exhausted { attempts: 3, .. }));
//! ```

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::client::Fetcher;
use super::integrity::IntegrityPolicy;
use super::result::FailureReason;
use crate::catalog::DownloadTask;

/// Default maximum attempts per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (30 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Default maximum jitter added to delays (500ms).
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
/// - `max_delay`: 30 seconds
/// - `backoff_multiplier`: 2.0
/// - `max_jitter`: 500ms
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
        max_jitter: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// A policy that retries without waiting. Used by tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after attempt `attempt` (1-indexed) failed.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);

        #[allow(clippy::cast_precision_loss)]
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let capped = Duration::from_millis(capped_ms as u64);
        capped + self.jitter()
    }

    fn jitter(&self) -> Duration {
        #[allow(clippy::cast_possible_truncation)]
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Position of one task in its retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    /// About to run fetch attempt `attempt` (1-indexed).
    Attempting {
        /// Attempt number.
        attempt: u32,
    },
    /// Fetch `attempt` wrote `bytes`; the artifact awaits inspection.
    Validating {
        /// Attempt number.
        attempt: u32,
        /// Bytes the fetcher reported.
        bytes: u64,
    },
    /// A validated artifact is ready to commit.
    Succeeded {
        /// Attempts used, including the successful one.
        attempts: u32,
        /// Size of the validated artifact.
        bytes: u64,
    },
    /// Every attempt failed.
    Exhausted {
        /// Attempts used.
        attempts: u32,
        /// Reason from the final attempt.
        reason: FailureReason,
    },
}

impl AttemptState {
    /// Initial state.
    #[must_use]
    pub fn start() -> Self {
        Self::Attempting { attempt: 1 }
    }

    /// Transition out of `Attempting` once the fetch finished.
    #[must_use]
    pub fn after_fetch(attempt: u32, max_attempts: u32, outcome: Result<u64, FailureReason>) -> Self {
        match outcome {
            Ok(bytes) => Self::Validating { attempt, bytes },
            Err(reason) => Self::after_failure(attempt, max_attempts, reason),
        }
    }

    /// Transition out of `Validating` once the integrity check finished.
    #[must_use]
    pub fn after_validation(
        attempt: u32,
        max_attempts: u32,
        outcome: Result<u64, FailureReason>,
    ) -> Self {
        match outcome {
            Ok(bytes) => Self::Succeeded {
                attempts: attempt,
                bytes,
            },
            Err(reason) => Self::after_failure(attempt, max_attempts, reason),
        }
    }

    fn after_failure(attempt: u32, max_attempts: u32, reason: FailureReason) -> Self {
        if attempt >= max_attempts {
            Self::Exhausted {
                attempts: attempt,
                reason,
            }
        } else {
            Self::Attempting {
                attempt: attempt + 1,
            }
        }
    }

    /// Whether the loop has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Exhausted { .. })
    }
}

/// Terminal outcome of [`RetryController::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// A validated artifact sits at the temp path.
    Succeeded {
        /// Attempts used.
        attempts: u32,
        /// Artifact size.
        bytes: u64,
    },
    /// No attempt produced a valid artifact; nothing is left at the temp path.
    Exhausted {
        /// Attempts used.
        attempts: u32,
        /// Reason from the final attempt.
        reason: FailureReason,
    },
}

/// Drives one task through fetch and validation until success or exhaustion.
pub struct RetryController<'a> {
    fetcher: &'a dyn Fetcher,
    policy: &'a RetryPolicy,
    integrity: &'a IntegrityPolicy,
}

impl<'a> RetryController<'a> {
    /// Creates a controller borrowing the shared pipeline pieces.
    #[must_use]
    pub fn new(
        fetcher: &'a dyn Fetcher,
        policy: &'a RetryPolicy,
        integrity: &'a IntegrityPolicy,
    ) -> Self {
        Self {
            fetcher,
            policy,
            integrity,
        }
    }

    /// Runs attempts sequentially, leaving a validated artifact at
    /// `temp_path` on success and nothing there otherwise.
    pub async fn run(&self, task: &DownloadTask, temp_path: &Path) -> RetryOutcome {
        let max = self.policy.max_attempts();
        let mut state = AttemptState::start();

        loop {
            state = match state {
                AttemptState::Attempting { attempt } => {
                    debug!(name = %task.name(), attempt, max, "fetch attempt");
                    let outcome = self
                        .fetcher
                        .fetch(task.source_url(), temp_path)
                        .await
                        .map_err(|e| FailureReason::from(&e));
                    if let Err(reason) = &outcome {
                        self.log_failure(task, attempt, reason);
                    }
                    AttemptState::after_fetch(attempt, max, outcome)
                }
                AttemptState::Validating { attempt, bytes } => {
                    debug!(name = %task.name(), attempt, bytes, "validating artifact");
                    let outcome = self
                        .integrity
                        .check(temp_path, task.kind())
                        .await
                        .map_err(|e| FailureReason::from(&e));
                    if let Err(reason) = &outcome {
                        discard(temp_path).await;
                        self.log_failure(task, attempt, reason);
                    }
                    AttemptState::after_validation(attempt, max, outcome)
                }
                AttemptState::Succeeded { attempts, bytes } => {
                    info!(name = %task.name(), attempts, bytes, "artifact validated");
                    return RetryOutcome::Succeeded { attempts, bytes };
                }
                AttemptState::Exhausted { attempts, reason } => {
                    return RetryOutcome::Exhausted { attempts, reason };
                }
            };

            if let AttemptState::Attempting { attempt } = state {
                let delay = self.policy.delay_after(attempt - 1);
                if !delay.is_zero() {
                    debug!(name = %task.name(), delay_ms = delay.as_millis(), "backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn log_failure(&self, task: &DownloadTask, attempt: u32, reason: &FailureReason) {
        warn!(
            name = %task.name(),
            attempt,
            max_attempts = self.policy.max_attempts(),
            kind = %reason.kind(),
            reason = %reason.message(),
            "attempt failed"
        );
    }
}

async fn discard(temp_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %temp_path.display(), error = %e, "could not discard rejected artifact");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::download::FailureKind;
    use crate::download::error::FetchError;

    /// Fails with HTTP 503 until `succeed_on`, then writes `body`.
    struct ScriptedFetcher {
        succeed_on: u32,
        body: Vec<u8>,
        calls: AtomicU32,
        temp_seen_before_call: Mutex<Vec<bool>>,
    }

    impl ScriptedFetcher {
        fn new(succeed_on: u32, body: Vec<u8>) -> Self {
            Self {
                succeed_on,
                body,
                calls: AtomicU32::new(0),
                temp_seen_before_call: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, temp_path: &Path) -> Result<u64, FetchError> {
            self.temp_seen_before_call
                .lock()
                .unwrap()
                .push(temp_path.exists());
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.succeed_on {
                return Err(FetchError::http_status(url, 503));
            }
            std::fs::write(temp_path, &self.body).unwrap();
            Ok(self.body.len() as u64)
        }
    }

    fn task() -> DownloadTask {
        DownloadTask::new("m3u", "news.m3u", "https://feeds.example.com/news.m3u")
    }

    // ==================== RetryPolicy ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert!((policy.backoff_multiplier - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy::new(
            10,
            Duration::from_secs(1),
            Duration::from_secs(5),
            2.0,
            Duration::from_millis(500),
        );
        let first = policy.delay_after(1);
        assert!(first >= Duration::from_secs(1) && first <= Duration::from_millis(1500));
        let third = policy.delay_after(3);
        assert!(third >= Duration::from_secs(4) && third <= Duration::from_millis(4500));
        let capped = policy.delay_after(8);
        assert!(capped >= Duration::from_secs(5) && capped <= Duration::from_millis(5500));
    }

    #[test]
    fn test_immediate_policy_has_no_delay() {
        let policy = RetryPolicy::immediate(5);
        for attempt in 1..=5 {
            assert_eq!(policy.delay_after(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            assert!(policy.jitter() <= DEFAULT_MAX_JITTER);
        }
    }

    // ==================== AttemptState ====================

    #[test]
    fn test_fetch_success_moves_to_validating() {
        let state = AttemptState::after_fetch(2, 3, Ok(4096));
        assert_eq!(
            state,
            AttemptState::Validating {
                attempt: 2,
                bytes: 4096
            }
        );
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_fetch_failure_before_budget_retries() {
        let reason = FailureReason::new(FailureKind::Network, "refused");
        let state = AttemptState::after_fetch(1, 3, Err(reason));
        assert_eq!(state, AttemptState::Attempting { attempt: 2 });
    }

    #[test]
    fn test_validation_failure_on_last_attempt_exhausts_with_that_reason() {
        let reason = FailureReason::new(FailureKind::TooSmall, "12 bytes");
        let state = AttemptState::after_validation(3, 3, Err(reason.clone()));
        assert_eq!(
            state,
            AttemptState::Exhausted {
                attempts: 3,
                reason
            }
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_validation_pass_succeeds_with_attempt_count() {
        let state = AttemptState::after_validation(2, 3, Ok(2048));
        assert_eq!(
            state,
            AttemptState::Succeeded {
                attempts: 2,
                bytes: 2048
            }
        );
    }

    #[test]
    fn test_single_attempt_budget_exhausts_immediately() {
        let reason = FailureReason::new(FailureKind::Network, "503");
        let state = AttemptState::after_fetch(1, 1, Err(reason));
        assert!(matches!(state, AttemptState::Exhausted { attempts: 1, .. }));
    }

    // ==================== RetryController ====================

    #[tokio::test]
    async fn test_succeeds_on_kth_attempt_without_leftover_temp() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("news.m3u.part");
        let fetcher = ScriptedFetcher::new(3, vec![b'#'; 2048]);
        let policy = RetryPolicy::immediate(4);
        let integrity = IntegrityPolicy::default();

        let outcome = RetryController::new(&fetcher, &policy, &integrity)
            .run(&task(), &temp)
            .await;

        assert_eq!(
            outcome,
            RetryOutcome::Succeeded {
                attempts: 3,
                bytes: 2048
            }
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(
            fetcher
                .temp_seen_before_call
                .lock()
                .unwrap()
                .iter()
                .all(|seen| !seen),
            "temp artifact survived a failed attempt"
        );
    }

    #[tokio::test]
    async fn test_exhausts_with_last_reason() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("news.m3u.part");
        let fetcher = ScriptedFetcher::new(u32::MAX, Vec::new());
        let policy = RetryPolicy::immediate(3);
        let integrity = IntegrityPolicy::default();

        let outcome = RetryController::new(&fetcher, &policy, &integrity)
            .run(&task(), &temp)
            .await;

        match outcome {
            RetryOutcome::Exhausted { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert_eq!(reason.kind(), FailureKind::Network);
                assert!(reason.message().contains("503"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_too_small_artifact_is_discarded_and_retried() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("news.m3u.part");
        let fetcher = ScriptedFetcher::new(1, b"<html>oops</html>".to_vec());
        let policy = RetryPolicy::immediate(2);
        let integrity = IntegrityPolicy::default();

        let outcome = RetryController::new(&fetcher, &policy, &integrity)
            .run(&task(), &temp)
            .await;

        match outcome {
            RetryOutcome::Exhausted { attempts, reason } => {
                assert_eq!(attempts, 2);
                assert_eq!(reason.kind(), FailureKind::TooSmall);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(!temp.exists());
    }
}
