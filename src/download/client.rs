//! HTTP fetcher that streams one response body into a temp artifact.
//!
//! The [`Fetcher`] trait is the seam the retry controller drives; the
//! production implementation is [`HttpFetcher`], a thin wrapper over a
//! shared `reqwest::Client`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::constants::{ATTEMPT_TIMEOUT_SECS, CONNECT_TIMEOUT_SECS, IO_CHUNK_BYTES};
use super::error::FetchError;
use crate::catalog::is_valid_url;
use crate::user_agent;

/// One fetch attempt: download `url` into `temp_path`.
///
/// Implementations must leave `temp_path` either fully written (and return
/// the byte count) or absent (and return the error).
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs exactly one attempt.
    async fn fetch(&self, url: &str, temp_path: &Path) -> Result<u64, FetchError>;
}

/// Timeouts and identification for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// TCP/TLS connect deadline.
    pub connect_timeout: Duration,
    /// Deadline for the whole attempt, body included.
    pub attempt_timeout: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            attempt_timeout: Duration::from_secs(ATTEMPT_TIMEOUT_SECS),
            user_agent: user_agent::default_fetch_user_agent(),
        }
    }
}

/// HTTP fetcher with streaming support.
///
/// Create once and share (it is cheap to clone) so that every worker reuses
/// the same connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend or system
    /// configuration cannot be initialised.
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.attempt_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        debug!(
            connect_timeout_secs = config.connect_timeout.as_secs(),
            attempt_timeout_secs = config.attempt_timeout.as_secs(),
            user_agent = %config.user_agent,
            "HTTP fetcher ready"
        );
        Ok(Self { client })
    }

    /// Builds a fetcher with default timeouts and User-Agent.
    ///
    /// # Errors
    ///
    /// See [`HttpFetcher::new`].
    pub fn with_defaults() -> Result<Self, reqwest::Error> {
        Self::new(&FetcherConfig::default())
    }

    async fn send_request(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    async fn fetch_inner(&self, url: &str, temp_path: &Path) -> Result<u64, FetchError> {
        let response = self.send_request(url).await?;
        let file = File::create(temp_path)
            .await
            .map_err(|e| FetchError::io(temp_path, e))?;
        stream_to_file(file, response, url, temp_path).await
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &str, temp_path: &Path) -> Result<u64, FetchError> {
        if !is_valid_url(url) {
            return Err(FetchError::invalid_url(url));
        }

        let result = self.fetch_inner(url, temp_path).await;
        if result.is_err() {
            debug!(path = %temp_path.display(), "cleaning up partial temp file after error");
            let _ = tokio::fs::remove_file(temp_path).await;
        }
        result
    }
}

/// Streams the response body to `file`, returning bytes written.
///
/// The file is synced before returning so a later rename publishes complete
/// data.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, FetchError> {
    let mut writer = BufWriter::with_capacity(IO_CHUNK_BYTES, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::from_reqwest(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| FetchError::io(file_path, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| FetchError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::with_defaults().unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_writes_body() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/list.m3u"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"#EXTM3U\n#EXTINF:-1,One\n"))
            .mount(&mock_server)
            .await;

        let temp_path = temp_dir.path().join("list.m3u.part");
        let url = format!("{}/list.m3u", mock_server.uri());
        let bytes = fetcher().fetch(&url, &temp_path).await.unwrap();

        assert_eq!(bytes, 23);
        assert_eq!(std::fs::read(&temp_path).unwrap(), b"#EXTM3U\n#EXTINF:-1,One\n");
    }

    #[tokio::test]
    async fn test_fetch_sends_identifying_user_agent() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(header("user-agent", user_agent::default_fetch_user_agent().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let temp_path = temp_dir.path().join("ua.part");
        let url = format!("{}/ua", mock_server.uri());
        fetcher().fetch(&url, &temp_path).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_http_status_and_leaves_nothing() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/missing.m3u"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let temp_path = temp_dir.path().join("missing.m3u.part");
        let url = format!("{}/missing.m3u", mock_server.uri());
        let result = fetcher().fetch(&url, &temp_path).await;

        match result {
            Err(FetchError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert!(entries.is_empty(), "no temp artifact expected: {entries:?}");
    }

    #[tokio::test]
    async fn test_fetch_timeout_removes_temp_file() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"data")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&FetcherConfig {
            attempt_timeout: Duration::from_secs(1),
            ..FetcherConfig::default()
        })
        .unwrap();
        let temp_path = temp_dir.path().join("slow.part");
        let url = format!("{}/slow", mock_server.uri());
        let result = fetcher.fetch(&url, &temp_path).await;

        assert!(
            matches!(result, Err(FetchError::Timeout { .. })),
            "expected timeout, got {result:?}"
        );
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_sends_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().join("x.part");

        let result = fetcher().fetch("not-a-valid-url", &temp_path).await;

        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().join("x.part");

        // Port 9 (discard) on loopback is closed on test machines.
        let result = fetcher().fetch("http://127.0.0.1:9/feed.m3u", &temp_path).await;

        assert!(
            matches!(result, Err(FetchError::Network { .. } | FetchError::Timeout { .. })),
            "expected network failure, got {result:?}"
        );
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn test_fetch_large_body_streams_to_disk() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        let large_content = vec![b'#'; 1024 * 1024];

        Mock::given(method("GET"))
            .and(path("/large.m3u"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(large_content))
            .mount(&mock_server)
            .await;

        let temp_path = temp_dir.path().join("large.m3u.part");
        let url = format!("{}/large.m3u", mock_server.uri());
        let bytes = fetcher().fetch(&url, &temp_path).await.unwrap();

        assert_eq!(bytes, 1024 * 1024);
        assert_eq!(std::fs::metadata(&temp_path).unwrap().len(), 1024 * 1024);
    }
}
