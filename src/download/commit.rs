//! Atomic publication of a validated artifact.
//!
//! A destination only ever holds a complete file: the artifact is written
//! under a sibling temp name and then renamed over the destination, which
//! replaces it in one step on the same filesystem.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

use super::constants::{IO_CHUNK_BYTES, TEMP_SUFFIX};
use super::error::CommitError;

/// Temp artifact path for `name` inside `dir`.
#[must_use]
pub fn temp_path_for(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{TEMP_SUFFIX}"))
}

/// A file that is now visible at its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Final path.
    pub path: PathBuf,
    /// Size on disk.
    pub bytes: u64,
    /// Lowercase hex MD5 of the committed content.
    pub digest: String,
}

/// Moves `temp` onto `destination`, replacing any previous file, then
/// fingerprints the result.
///
/// On rename failure the temp artifact is removed and the previous
/// destination (if any) is left untouched.
///
/// # Errors
///
/// [`CommitError::Rename`] if the move fails, [`CommitError::Digest`] if the
/// committed file cannot be read back.
#[instrument(level = "debug", fields(temp = %temp.display(), destination = %destination.display()))]
pub async fn commit(temp: &Path, destination: &Path) -> Result<CommitOutcome, CommitError> {
    if let Err(source) = tokio::fs::rename(temp, destination).await {
        if let Err(e) = tokio::fs::remove_file(temp).await {
            warn!(path = %temp.display(), error = %e, "could not remove temp artifact after failed commit");
        }
        return Err(CommitError::Rename {
            temp: temp.to_path_buf(),
            destination: destination.to_path_buf(),
            source,
        });
    }

    let (digest, bytes) = content_digest(destination)
        .await
        .map_err(|source| CommitError::Digest {
            path: destination.to_path_buf(),
            source,
        })?;
    debug!(bytes, %digest, "committed");

    Ok(CommitOutcome {
        path: destination.to_path_buf(),
        bytes,
        digest,
    })
}

/// Streams `path` through MD5, returning the hex digest and byte count.
///
/// # Errors
///
/// Propagates any read error.
pub async fn content_digest(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; IO_CHUNK_BYTES];
    let mut total: u64 = 0;

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), total))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tempfile::TempDir;

    #[test]
    fn test_temp_path_is_sibling_with_suffix() {
        let path = temp_path_for(Path::new("/srv/lists"), "news.m3u");
        assert_eq!(path, PathBuf::from("/srv/lists/news.m3u.part"));
    }

    #[tokio::test]
    async fn test_commit_creates_destination_and_removes_temp() {
        let dir = TempDir::new().unwrap();
        let temp = temp_path_for(dir.path(), "a.m3u");
        let destination = dir.path().join("a.m3u");
        std::fs::write(&temp, b"hello").unwrap();

        let outcome = commit(&temp, &destination).await.unwrap();

        assert!(!temp.exists());
        assert_eq!(std::fs::read(&destination).unwrap(), b"hello");
        assert_eq!(outcome.bytes, 5);
        assert_eq!(outcome.digest, "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_commit_replaces_existing_destination() {
        let dir = TempDir::new().unwrap();
        let temp = temp_path_for(dir.path(), "a.m3u");
        let destination = dir.path().join("a.m3u");
        std::fs::write(&destination, b"old content").unwrap();
        std::fs::write(&temp, b"new").unwrap();

        commit(&temp, &destination).await.unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_and_keeps_old_file() {
        let dir = TempDir::new().unwrap();
        let temp = temp_path_for(dir.path(), "a.m3u");
        std::fs::write(&temp, b"new").unwrap();
        // A directory at the destination makes the rename fail.
        let destination = dir.path().join("a.m3u");
        std::fs::create_dir(&destination).unwrap();
        std::fs::write(destination.join("keep"), b"x").unwrap();

        let result = commit(&temp, &destination).await;

        assert!(matches!(result, Err(CommitError::Rename { .. })));
        assert!(!temp.exists());
        assert!(destination.join("keep").exists());
    }

    #[tokio::test]
    async fn test_digest_is_stable_for_identical_content() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, vec![7u8; 200_000]).unwrap();
        std::fs::write(&b, vec![7u8; 200_000]).unwrap();

        let (da, na) = content_digest(&a).await.unwrap();
        let (db, nb) = content_digest(&b).await.unwrap();
        assert_eq!(da, db);
        assert_eq!(na, 200_000);
        assert_eq!(nb, 200_000);
    }

    #[tokio::test]
    async fn test_concurrent_reader_never_sees_partial_file() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("a.m3u");
        let old = vec![b'o'; 64 * 1024];
        let new = vec![b'n'; 256 * 1024];
        std::fs::write(&destination, &old).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let destination = destination.clone();
            let stop = Arc::clone(&stop);
            let (old, new) = (old.clone(), new.clone());
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let seen = std::fs::read(&destination).unwrap();
                    assert!(seen == old || seen == new, "partial read: {} bytes", seen.len());
                }
            })
        };

        for _ in 0..20 {
            let temp = temp_path_for(dir.path(), "a.m3u");
            std::fs::write(&temp, &new).unwrap();
            commit(&temp, &destination).await.unwrap();
        }

        stop.store(true, Ordering::Relaxed);
        reader.join().unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), new);
    }
}
