//! User-Agent string sent with every feed request.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/feedsync";

/// Default User-Agent for feed requests (identifies the tool).
#[must_use]
pub(crate) fn default_fetch_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("feedsync/{version} (playlist-updater; +{PROJECT_UA_URL})")
}
