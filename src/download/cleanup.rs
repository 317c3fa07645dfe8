//! Best-effort removal of previous run output.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::constants::TEMP_SUFFIX;
use super::error::CleanupError;

/// What the cleanup pass did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Entries removed.
    pub removed: Vec<PathBuf>,
    /// Entries that matched but could not be removed.
    pub failed: Vec<CleanupError>,
}

impl CleanupReport {
    /// Number of entries removed.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Whether `file_name` is output of a previous run: it ends with one of
/// `extensions` (lowercase, with leading dot), optionally followed by the
/// temp suffix.
fn is_stale_output(file_name: &str, extensions: &[String]) -> bool {
    let lower = file_name.to_lowercase();
    let stem = lower.strip_suffix(TEMP_SUFFIX).unwrap_or(&lower);
    extensions.iter().any(|ext| stem.ends_with(ext.as_str()))
}

/// Removes every regular file in `dir` that matches the catalog's output
/// extensions, plus leftover temp artifacts of such files.
///
/// Never fails: an unreadable directory or a locked file is logged and
/// recorded in the report. A missing directory is treated as empty.
#[instrument(skip(extensions), fields(dir = %dir.display()))]
pub async fn cleanup_stale_outputs(dir: &Path, extensions: &[String]) -> CleanupReport {
    let mut report = CleanupReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("output directory does not exist yet, nothing to clean");
            return report;
        }
        Err(source) => {
            warn!(error = %source, "could not list output directory");
            report.failed.push(CleanupError {
                path: dir.to_path_buf(),
                source,
            });
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(source) => {
                warn!(error = %source, "directory listing interrupted");
                report.failed.push(CleanupError {
                    path: dir.to_path_buf(),
                    source,
                });
                break;
            }
        };

        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_stale_output(file_name, extensions) {
            continue;
        }
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => {}
            _ => continue,
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale file");
                report.removed.push(path);
            }
            Err(source) => {
                let error = CleanupError { path, source };
                warn!(error = %error, "skipping stale file");
                report.failed.push(error);
            }
        }
    }

    info!(
        removed = report.removed_count(),
        failed = report.failed.len(),
        "cleanup finished"
    );
    report
}
