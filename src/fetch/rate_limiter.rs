//! Per-domain rate limiting.
//!
//! [`RateLimiter`] enforces a minimum delay between requests to the same
//! domain and honours server-mandated pauses (HTTP 429 + `Retry-After`) by
//! blocking the whole domain until the pause expires. Requests to different
//! domains never wait for each other.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use paperscrape_core::fetch::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_secs(1));
//!
//! // First request proceeds immediately
//! limiter.acquire("https://papers.nips.cc/paper_files/paper/2023").await;
//!
//! // Second request to the same domain waits for the delay
//! limiter.acquire("https://papers.nips.cc/paper_files/paper/2022").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative delay per domain (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value (1 hour).
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Per-domain rate limiter.
///
/// `Send + Sync`; share it behind an `Arc` when several fetchers talk to the
/// same hosts.
#[derive(Debug)]
pub struct RateLimiter {
    default_delay: Duration,
    disabled: bool,
    /// Arc'd so the `DashMap` shard lock is released before awaiting the inner Mutex.
    domains: DashMap<String, Arc<DomainState>>,
}

#[derive(Debug, Default)]
struct DomainTiming {
    /// `None` until the first request, which is never delayed.
    last_request: Option<Instant>,
    /// Set after a 429; no request to the domain starts before this instant.
    blocked_until: Option<Instant>,
}

#[derive(Debug, Default)]
struct DomainState {
    timing: Mutex<DomainTiming>,
    cumulative_delay_ms: AtomicU64,
}

impl DomainState {
    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

impl RateLimiter {
    /// Creates a rate limiter with the given minimum per-domain delay.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = default_delay.as_millis()))]
    pub fn new(default_delay: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            default_delay,
            disabled: false,
            domains: DashMap::new(),
        }
    }

    /// Creates a rate limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            default_delay: Duration::ZERO,
            disabled: true,
            domains: DashMap::new(),
        }
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the minimum delay between requests to one domain.
    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    fn state_for(&self, domain: &str) -> Arc<DomainState> {
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(DomainState::default()))
            .clone()
    }

    /// Waits until a request to `url`'s domain is allowed, then records it.
    ///
    /// The first request to a domain proceeds immediately unless the domain
    /// is blocked by an earlier 429.
    #[instrument(skip(self), fields(domain))]
    pub async fn acquire(&self, url: &str) {
        let domain = extract_domain(url);
        tracing::Span::current().record("domain", &domain);

        let state = self.state_for(&domain);
        let mut timing = state.timing.lock().await;

        if let Some(until) = timing.blocked_until.take() {
            let now = Instant::now();
            if until > now {
                let wait = until - now;
                let cumulative = state.add_cumulative_delay(wait);
                debug!(
                    domain = %domain,
                    wait_ms = wait.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "domain blocked by server rate limit"
                );
                tokio::time::sleep_until(until).await;
            }
        }

        if !self.disabled {
            if let Some(last_request) = timing.last_request {
                let elapsed = last_request.elapsed();
                if elapsed < self.default_delay {
                    let delay = self.default_delay.saturating_sub(elapsed);
                    let cumulative = state.add_cumulative_delay(delay);

                    debug!(
                        domain = %domain,
                        delay_ms = delay.as_millis(),
                        cumulative_ms = cumulative.as_millis(),
                        "applying rate limit delay"
                    );

                    if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                        warn!(
                            domain = %domain,
                            cumulative_delay_secs = cumulative.as_secs(),
                            "excessive rate limiting - consider reducing request volume to this domain"
                        );
                    }

                    tokio::time::sleep(delay).await;
                }
            } else {
                debug!(domain = %domain, "first request to domain - no delay");
            }
        }

        timing.last_request = Some(Instant::now());
    }

    /// Blocks `url`'s domain for `delay`, as mandated by a 429 response.
    ///
    /// Applies even when the limiter is disabled: a server-mandated pause is
    /// not a politeness setting.
    #[instrument(skip(self), fields(domain))]
    pub async fn block_domain(&self, url: &str, delay: Duration) {
        let domain = extract_domain(url);
        tracing::Span::current().record("domain", &domain);

        let state = self.state_for(&domain);
        let mut timing = state.timing.lock().await;
        let until = Instant::now() + delay;
        if timing.blocked_until.is_none_or(|existing| existing < until) {
            timing.blocked_until = Some(until);
        }

        warn!(
            domain = %domain,
            delay_secs = delay.as_secs_f64(),
            "server rate limit - pausing requests to domain"
        );
    }
}

/// Extracts the lowercase host from a URL, or `"unknown"` when it has none.
///
/// ```
/// use paperscrape_core::fetch::extract_domain;
///
/// assert_eq!(extract_domain("https://Proceedings.MLR.press/v202/"), "proceedings.mlr.press");
/// assert_eq!(extract_domain("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value (integer seconds or HTTP-date).
///
/// Returns `None` when unparseable; caps values at one hour; past dates give zero.
///
/// ```
/// use std::time::Duration;
/// use paperscrape_core::fetch::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }

    match httpdate::parse_http_date(header_value) {
        Ok(datetime) => Some(
            datetime
                .duration_since(std::time::SystemTime::now())
                .map_or(Duration::ZERO, |duration| duration.min(MAX_RETRY_AFTER)),
        ),
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}
