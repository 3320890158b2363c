//! HTTP fetcher with per-domain rate limiting and retry.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, FailureType, RetryDecision,
    RetryPolicy, classify_error,
};
use super::FetchError;
use crate::user_agent;

/// Default total request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TCP connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default minimum delay between requests to one domain.
const DEFAULT_PER_DOMAIN_DELAY: Duration = Duration::from_secs(1);

/// Default domain block after a 429 without a usable Retry-After header.
const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Fetcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Total time allowed for one request, body included.
    pub timeout: Duration,
    /// Time allowed to establish the connection.
    pub connect_timeout: Duration,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on each further retry.
    pub backoff_base: Duration,
    /// Upper bound on the backoff.
    pub max_backoff: Duration,
    /// Minimum delay between requests to the same domain.
    pub per_domain_delay: Duration,
    /// Domain block after a 429 without a usable Retry-After header.
    pub rate_limit_delay: Duration,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BASE_DELAY,
            max_backoff: DEFAULT_MAX_DELAY,
            per_domain_delay: DEFAULT_PER_DOMAIN_DELAY,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            user_agent: user_agent::default_scraper_user_agent(),
        }
    }
}

/// Result of [`Fetcher::download_to_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The file was fetched and written.
    Downloaded {
        /// Final path of the file.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },
    /// A non-empty file already existed at the destination; nothing was fetched.
    AlreadyPresent {
        /// Path of the existing file.
        path: PathBuf,
    },
}

impl DownloadOutcome {
    /// Path of the file on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Downloaded { path, .. } | Self::AlreadyPresent { path } => path,
        }
    }
}

/// Rate-limited HTTP fetcher with retry and backoff.
///
/// Cheap to clone; clones share the connection pool, the rate limiter and
/// the retry counter.
///
/// # Example
///
/// ```no_run
/// use paperscrape_core::fetch::{FetchConfig, Fetcher};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = Fetcher::new(FetchConfig::default())?;
/// let html = fetcher.fetch_text("https://papers.nips.cc/paper_files/paper/2023").await?;
/// println!("{} bytes", html.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    rate_limiter: Arc<RateLimiter>,
    rate_limit_delay: Duration,
    retries: Arc<AtomicUsize>,
}

impl Fetcher {
    /// Creates a fetcher with its own rate limiter.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let rate_limiter = if config.per_domain_delay.is_zero() {
            Arc::new(RateLimiter::disabled())
        } else {
            Arc::new(RateLimiter::new(config.per_domain_delay))
        };
        Self::with_rate_limiter(config, rate_limiter)
    }

    /// Creates a fetcher sharing an existing rate limiter.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the HTTP client cannot be built.
    #[instrument(skip_all, fields(timeout_ms = config.timeout.as_millis(), max_retries = config.max_retries))]
    pub fn with_rate_limiter(
        config: FetchConfig,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .gzip(true)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|source| FetchError::ClientBuild { source })?;

        debug!(
            rate_limited = !rate_limiter.is_disabled(),
            per_domain_delay_ms = rate_limiter.default_delay().as_millis(),
            "fetcher ready"
        );
        Ok(Self {
            client,
            policy: RetryPolicy::with_retries(
                config.max_retries,
                config.backoff_base,
                config.max_backoff,
            ),
            rate_limiter,
            rate_limit_delay: config.rate_limit_delay,
            retries: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of retries performed so far by this fetcher and its clones.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    /// Fetches `url` and returns the response body.
    ///
    /// Transient failures (network errors, timeouts, 408, 5xx) are retried
    /// with exponential backoff; 429 blocks the domain for the Retry-After
    /// period and is retried; other 4xx responses fail immediately.
    ///
    /// # Errors
    ///
    /// Returns the last [`FetchError`] once retries are exhausted or the
    /// failure is permanent.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        let this = self;
        self.with_retry(url, move || async move {
            let response = this.send_request(url).await?;
            let body = response
                .bytes()
                .await
                .map_err(|e| map_transport_error(url, e))?;
            Ok(body.to_vec())
        })
        .await
    }

    /// Fetches `url` and decodes the body as UTF-8, replacing invalid sequences.
    ///
    /// # Errors
    ///
    /// Same as [`Fetcher::fetch`].
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Streams `url` to `dest`, with the same retry rules as [`Fetcher::fetch`].
    ///
    /// The body is written to `<dest>.part` and renamed into place once
    /// complete, so `dest` never holds a truncated file. A non-empty existing
    /// `dest` is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Io`] for local filesystem failures and the last
    /// HTTP/network error otherwise.
    #[instrument(skip(self), fields(dest = %dest.display()))]
    pub async fn download_to_file(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<DownloadOutcome, FetchError> {
        if tokio::fs::metadata(dest)
            .await
            .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
        {
            debug!("destination already present, skipping download");
            return Ok(DownloadOutcome::AlreadyPresent {
                path: dest.to_path_buf(),
            });
        }

        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }

        let part_path = part_path_for(dest);
        let part = part_path.as_path();
        let this = self;
        let bytes = self
            .with_retry(url, move || async move {
                let response = this.send_request(url).await?;
                let result = stream_to_file(response, url, part).await;
                if result.is_err() {
                    debug!(path = %part.display(), "cleaning up partial file after error");
                    let _ = tokio::fs::remove_file(part).await;
                }
                result
            })
            .await?;

        tokio::fs::rename(&part_path, dest)
            .await
            .map_err(|e| FetchError::io(dest, e))?;

        info!(path = %dest.display(), bytes, "download complete");
        Ok(DownloadOutcome::Downloaded {
            path: dest.to_path_buf(),
            bytes,
        })
    }

    /// Runs `operation` under the rate limiter until it succeeds or the
    /// retry policy gives up.
    async fn with_retry<T, F, Fut>(&self, url: &str, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.rate_limiter.acquire(url).await;

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            match self.policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    self.retries.fetch_add(1, Ordering::SeqCst);
                    if failure_type == FailureType::RateLimited {
                        let pause = retry_after_delay(&error).unwrap_or(self.rate_limit_delay);
                        info!(
                            url = %url,
                            attempt = next_attempt,
                            max_attempts = self.policy.max_attempts(),
                            pause_ms = pause.as_millis(),
                            "rate limited, retrying after pause"
                        );
                        self.rate_limiter.block_domain(url, pause).await;
                    } else {
                        info!(
                            url = %url,
                            attempt = next_attempt,
                            max_attempts = self.policy.max_attempts(),
                            delay_ms = backoff_delay.as_millis(),
                            error = %error,
                            "retrying request"
                        );
                        tokio::time::sleep(backoff_delay).await;
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    if failure_type == FailureType::Permanent {
                        debug!(url = %url, %reason, error = %error, "not retrying request");
                    } else {
                        warn!(url = %url, attempts = attempt, error = %error, "giving up after retries");
                    }
                    return Err(error);
                }
            }
        }
    }

    async fn send_request(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(FetchError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        Ok(response)
    }
}

fn map_transport_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}

fn retry_after_delay(error: &FetchError) -> Option<Duration> {
    match error {
        FetchError::HttpStatus {
            retry_after: Some(value),
            ..
        } => parse_retry_after(value),
        _ => None,
    }
}

/// `paper.pdf` -> `paper.pdf.part`
fn part_path_for(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Streams the response body into a fresh file at `path`, returning bytes written.
async fn stream_to_file(
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<u64, FetchError> {
    let file = File::create(path)
        .await
        .map_err(|e| FetchError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| map_transport_error(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| FetchError::io(path, e))?;
    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn fast_config() -> FetchConfig {
        FetchConfig {
            max_retries: 2,
            backoff_base: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            per_domain_delay: Duration::ZERO,
            rate_limit_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
            ..FetchConfig::default()
        }
    }

    #[test]
    fn test_part_path_appends_suffix() {
        assert_eq!(
            part_path_for(Path::new("/data/papers/x.pdf")),
            PathBuf::from("/data/papers/x.pdf.part")
        );
    }

    #[test]
    fn test_fetch_config_default_values() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.per_domain_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_domain_delay_disables_rate_limiter() {
        let fetcher = Fetcher::new(fast_config()).unwrap();
        assert!(fetcher.rate_limiter.is_disabled());

        let fetcher = Fetcher::new(FetchConfig {
            per_domain_delay: Duration::from_millis(250),
            ..fast_config()
        })
        .unwrap();
        assert!(!fetcher.rate_limiter.is_disabled());
        assert_eq!(fetcher.rate_limiter.default_delay(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_is_permanent() {
        let fetcher = Fetcher::new(fast_config()).unwrap();
        let result = fetcher.fetch("not a url").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
        assert_eq!(fetcher.retries(), 0);
    }

    #[test]
    fn test_download_invalid_url_writes_nothing() {
        let fetcher = Fetcher::new(fast_config()).unwrap();
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("paper.pdf");

        let result = tokio_test::block_on(fetcher.download_to_file("not-a-valid-url", &dest));
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_success_returns_body() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(fast_config()).unwrap();
        let body = fetcher
            .fetch_text(&format!("{}/index.html", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_fetch_404_is_not_retried() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(fast_config()).unwrap();
        let result = fetcher.fetch(&format!("{}/missing", server.uri())).await;
        assert_eq!(result.unwrap_err().status(), Some(404));
        assert_eq!(fetcher.retries(), 0);
    }

    #[tokio::test]
    async fn test_fetch_503_exhausts_retries() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(fast_config()).unwrap();
        let result = fetcher.fetch(&format!("{}/busy", server.uri())).await;
        assert_eq!(result.unwrap_err().status(), Some(503));
        assert_eq!(fetcher.retries(), 2);
    }

    #[tokio::test]
    async fn test_download_to_file_writes_and_leaves_no_part_file() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/paper.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 body".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("paper.pdf");
        let fetcher = Fetcher::new(fast_config()).unwrap();
        let outcome = fetcher
            .download_to_file(&format!("{}/paper.pdf", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DownloadOutcome::Downloaded {
                path: dest.clone(),
                bytes: 13
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4 body");
        assert!(!part_path_for(&dest).exists());
    }

    #[tokio::test]
    async fn test_download_to_file_skips_existing_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("paper.pdf");
        std::fs::write(&dest, b"already here").unwrap();

        let fetcher = Fetcher::new(fast_config()).unwrap();
        // No server: a request would fail.
        let outcome = fetcher
            .download_to_file("http://127.0.0.1:9/paper.pdf", &dest)
            .await
            .unwrap();
        assert_eq!(outcome, DownloadOutcome::AlreadyPresent { path: dest.clone() });
        assert_eq!(std::fs::read(&dest).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_download_to_file_404_leaves_nothing_behind() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("gone.pdf");
        let fetcher = Fetcher::new(fast_config()).unwrap();
        let result = fetcher
            .download_to_file(&format!("{}/gone.pdf", server.uri()), &dest)
            .await;

        assert_eq!(result.unwrap_err().status(), Some(404));
        assert!(!dest.exists());
        assert!(!part_path_for(&dest).exists());
    }
}
