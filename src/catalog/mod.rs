//! The catalog of resources to materialize.
//!
//! A catalog maps a logical group (`m3u`, `gz`, ...) to destination
//! filenames and their source URLs. It is injected configuration: the
//! built-in default can be replaced by a JSON file of the same shape.
//!
//! ```json
//! {
//!   "m3u": { "PiauiTV.m3u": "https://gitlab.com/.../PiauiTV.m3u" },
//!   "gz":  { "epgbrasil.xml.gz": "http://m3u4u.com/epg/..." }
//! }
//! ```

mod error;
mod validate;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, instrument};

use crate::download::TEMP_SUFFIX;

pub use error::CatalogError;
pub use validate::{MAX_URL_LENGTH, is_valid_url};

/// Shape of a catalog file: group -> destination filename -> source URL.
type RawCatalog = BTreeMap<String, BTreeMap<String, String>>;

/// Content kind of a resource, derived from its destination filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Uncompressed text (M3U playlists and anything not ending in `.gz`).
    Plaintext,
    /// Gzip-compressed payload (`.gz` suffix, case-insensitive).
    Gzip,
}

impl ResourceKind {
    /// Derives the kind from a destination filename.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.to_ascii_lowercase().ends_with(".gz") {
            Self::Gzip
        } else {
            Self::Plaintext
        }
    }

    /// Label used for this kind in the published manifest.
    #[must_use]
    pub fn manifest_label(self) -> &'static str {
        match self {
            Self::Plaintext => "m3u",
            Self::Gzip => "epg",
        }
    }
}

/// One resource to download. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    group: String,
    name: String,
    source_url: String,
    kind: ResourceKind,
}

impl DownloadTask {
    /// Creates a task; the kind is derived from `name` and the URL is trimmed.
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        source_url: impl AsRef<str>,
    ) -> Self {
        let name = name.into();
        let kind = ResourceKind::from_name(&name);
        Self {
            group: group.into(),
            name,
            source_url: source_url.as_ref().trim().to_string(),
            kind,
        }
    }

    /// Catalog group this task came from.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Destination filename inside the output directory.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL to fetch.
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Content kind, which selects the integrity check.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

/// Validated list of download tasks with unique destination names.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tasks: Vec<DownloadTask>,
}

impl Catalog {
    /// The catalog shipped with the tool.
    ///
    /// Playlists use the lowercase `.m3u` naming; pass a catalog file to use
    /// a different naming convention.
    #[must_use]
    pub fn builtin() -> Self {
        const M3U: &[(&str, &str)] = &[
            ("epgbrasil.m3u", "http://m3u4u.com/m3u/3wk1y24kx7uzdevxygz7"),
            (
                "epgbrasilportugal.m3u",
                "http://m3u4u.com/m3u/782dyqdrqkh1xegen4zp",
            ),
            ("epgportugal.m3u", "http://m3u4u.com/m3u/jq2zy9epr3bwxmgwyxr5"),
            (
                "PiauiTV.m3u",
                "https://gitlab.com/josieljefferson12/playlists/-/raw/main/PiauiTV.m3u",
            ),
            (
                "m3u_proton.m3u",
                "https://gitlab.com/josieljefferson12/playlists/-/raw/main/m3u4u_proton.me.m3u",
            ),
            (
                "playlist.m3u",
                "https://gitlab.com/josieljefferson12/playlists/-/raw/main/playlist.m3u",
            ),
            (
                "playlists.m3u",
                "https://gitlab.com/josielluz/playlists/-/raw/main/playlists.m3u",
            ),
        ];
        const GZ: &[(&str, &str)] = &[
            (
                "epgbrasil.xml.gz",
                "http://m3u4u.com/epg/3wk1y24kx7uzdevxygz7",
            ),
            (
                "epgbrasilportugal.xml.gz",
                "http://m3u4u.com/epg/782dyqdrqkh1xegen4zp",
            ),
            (
                "epgportugal.xml.gz",
                "http://m3u4u.com/epg/jq2zy9epr3bwxmgwyxr5",
            ),
        ];

        let tasks = M3U
            .iter()
            .map(|(name, url)| DownloadTask::new("m3u", *name, url))
            .chain(GZ.iter().map(|(name, url)| DownloadTask::new("gz", *name, url)))
            .collect();
        Self { tasks }
    }

    /// Builds a catalog from explicit tasks, rejecting unusable or repeated names.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidName`] or [`CatalogError::DuplicateName`].
    pub fn from_tasks(tasks: Vec<DownloadTask>) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        for task in &tasks {
            validate_name(task.name())?;
            if !seen.insert(task.name().to_string()) {
                return Err(CatalogError::DuplicateName {
                    name: task.name().to_string(),
                });
            }
        }
        Ok(Self { tasks })
    }

    /// Parses a JSON catalog. Groups and names are ordered lexicographically.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] for malformed JSON, otherwise the
    /// errors of [`Catalog::from_tasks`].
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let groups: RawCatalog =
            serde_json::from_str(raw).map_err(|source| CatalogError::Parse { source })?;
        let tasks = groups
            .into_iter()
            .flat_map(|(group, files)| {
                files
                    .into_iter()
                    .map(move |(name, url)| DownloadTask::new(group.clone(), name, url))
            })
            .collect();
        Self::from_tasks(tasks)
    }

    /// Loads a JSON catalog file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Read`] if the file cannot be read, otherwise
    /// the errors of [`Catalog::from_json_str`].
    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::read(path, e))?;
        let catalog = Self::from_json_str(&raw)?;
        debug!(tasks = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Tasks in catalog order.
    #[must_use]
    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the catalog has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Lowercase final extensions (`.m3u`, `.gz`, ...) of every destination
    /// name, used to recognise stale output during cleanup.
    #[must_use]
    pub fn output_extensions(&self) -> Vec<String> {
        let extensions: BTreeSet<String> = self
            .tasks
            .iter()
            .filter_map(|task| {
                let (stem, ext) = task.name().rsplit_once('.')?;
                (!stem.is_empty() && !ext.is_empty()).then(|| format!(".{}", ext.to_ascii_lowercase()))
            })
            .collect();
        extensions.into_iter().collect()
    }
}

fn validate_name(name: &str) -> Result<(), CatalogError> {
    if name.trim().is_empty() {
        return Err(CatalogError::invalid_name(name, "name is empty"));
    }
    if name.contains(['/', '\\']) {
        return Err(CatalogError::invalid_name(
            name,
            "name must be a single path component",
        ));
    }
    if name == "." || name == ".." {
        return Err(CatalogError::invalid_name(name, "path traversal"));
    }
    if name.to_ascii_lowercase().ends_with(TEMP_SUFFIX) {
        return Err(CatalogError::invalid_name(
            name,
            "suffix is reserved for in-flight downloads",
        ));
    }
    Ok(())
}
