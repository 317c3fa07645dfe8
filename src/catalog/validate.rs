//! URL validation for catalog entries.
//!
//! Runs before any network call so a malformed catalog entry is reported
//! without ever reaching the fetcher.

use tracing::trace;
use url::Url;

/// Maximum URL length to accept (standard browser limit).
pub const MAX_URL_LENGTH: usize = 2000;

/// Returns `true` if `candidate` is an absolute `http`/`https` URL whose host
/// has at least two non-empty `.`-separated labels.
///
/// # Validation rules:
/// - Must not be empty or exceed [`MAX_URL_LENGTH`]
/// - Must be parseable by the `url` crate as an absolute URL
/// - Must use http or https scheme (no ftp, file, etc.)
/// - Must have a host containing a `.` separator (`localhost` is rejected)
///
/// # Examples
///
/// ```
/// use feedsync_core::is_valid_url;
///
/// assert!(is_valid_url("https://gitlab.com/group/playlist.m3u"));
/// assert!(!is_valid_url("/relative/playlist.m3u"));
/// assert!(!is_valid_url("ftp://files.example.com/guide.xml.gz"));
/// ```
#[must_use]
pub fn is_valid_url(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.len() > MAX_URL_LENGTH {
        return false;
    }

    let Ok(parsed) = Url::parse(candidate) else {
        trace!(url = %candidate, "URL does not parse as absolute");
        return false;
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        trace!(url = %candidate, scheme = parsed.scheme(), "unsupported scheme");
        return false;
    }

    parsed.host_str().is_some_and(|host| {
        host.contains('.') && host.split('.').filter(|label| !label.is_empty()).count() >= 2
    })
}
