//! Post-run inventory of the output directory and the JSON manifest that
//! the static index page reads.
//!
//! The manifest lists every catalog file present on disk after a run, so a
//! partially failed run still publishes whatever was committed, including
//! files kept from an earlier run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{Catalog, ResourceKind};

/// Manifest filename inside the output directory.
pub const MANIFEST_FILE_NAME: &str = "files_metadata.json";

/// Hours between scheduled runs, used for `next_update`.
pub const DEFAULT_REFRESH_HOURS: u32 = 6;

/// Errors from writing the manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest could not be serialized.
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The manifest could not be written or moved into place.
    #[error("failed to write manifest {path}: {source}")]
    Write {
        /// Target path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// One catalog file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    /// Filename.
    pub name: String,
    /// Resource kind derived from the name.
    pub kind: ResourceKind,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub updated: DateTime<Utc>,
}

/// Lists the catalog files that exist in `dir`, in catalog order.
#[instrument(level = "debug", skip(catalog), fields(dir = %dir.display()))]
pub async fn collect_inventory(catalog: &Catalog, dir: &Path) -> Vec<InventoryEntry> {
    let mut entries = Vec::new();
    for task in catalog.tasks() {
        let path = dir.join(task.name());
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(name = %task.name(), "not present");
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat output file");
                continue;
            }
        };
        let updated = metadata
            .modified()
            .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
        entries.push(InventoryEntry {
            name: task.name().to_string(),
            kind: task.kind(),
            size: metadata.len(),
            updated,
        });
    }
    entries
}

/// Logs one line per inventory entry plus a total.
pub fn log_inventory(entries: &[InventoryEntry]) {
    for entry in entries {
        info!(
            name = %entry.name,
            kind = entry.kind.manifest_label(),
            size = entry.size,
            updated = %entry.updated.to_rfc3339(),
            "available"
        );
    }
    info!(files = entries.len(), "inventory complete");
}

/// One `files[]` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Filename relative to the output directory.
    pub name: String,
    /// `"m3u"` or `"epg"`.
    #[serde(rename = "type")]
    pub file_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub updated: DateTime<Utc>,
}

/// The `metadata` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// When this manifest was built.
    pub generated_at: DateTime<Utc>,
    /// `generated_at` plus the refresh interval.
    pub next_update: DateTime<Utc>,
    /// Number of listed files.
    pub total_files: usize,
    /// Listed playlists.
    pub m3u_count: usize,
    /// Listed guide feeds.
    pub epg_count: usize,
}

/// The `files_metadata.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Files present after the run.
    pub files: Vec<ManifestFile>,
    /// Counts and schedule.
    pub metadata: ManifestMetadata,
}

impl Manifest {
    /// Builds a manifest from an inventory.
    #[must_use]
    pub fn build(inventory: &[InventoryEntry], generated_at: DateTime<Utc>, refresh: Duration) -> Self {
        let files: Vec<ManifestFile> = inventory
            .iter()
            .map(|entry| ManifestFile {
                name: entry.name.clone(),
                file_type: entry.kind.manifest_label().to_string(),
                size: entry.size,
                updated: entry.updated,
            })
            .collect();
        let epg_count = inventory
            .iter()
            .filter(|entry| entry.kind == ResourceKind::Gzip)
            .count();

        Self {
            metadata: ManifestMetadata {
                generated_at,
                next_update: generated_at + refresh,
                total_files: files.len(),
                m3u_count: files.len() - epg_count,
                epg_count,
            },
            files,
        }
    }
}

/// Writes `manifest` to `dir/files_metadata.json` through a temp file and a
/// rename, returning the final path.
///
/// # Errors
///
/// [`ManifestError::Serialize`] or [`ManifestError::Write`].
#[instrument(level = "debug", skip(manifest), fields(dir = %dir.display()))]
pub async fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<PathBuf, ManifestError> {
    let json = serde_json::to_vec_pretty(manifest)?;
    let path = dir.join(MANIFEST_FILE_NAME);
    let temp = dir.join(format!("{MANIFEST_FILE_NAME}.tmp"));

    if let Err(source) = tokio::fs::write(&temp, &json).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(ManifestError::Write { path: temp, source });
    }
    if let Err(source) = tokio::fs::rename(&temp, &path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(ManifestError::Write { path, source });
    }

    info!(
        path = %path.display(),
        files = manifest.metadata.total_files,
        "manifest written"
    );
    Ok(path)
}
