//! HTTP fetching for proceedings pages and PDFs.
//!
//! Every request goes through a single [`Fetcher`], which applies:
//! - a per-domain minimum delay ([`RateLimiter`])
//! - retry with exponential backoff for transient failures ([`RetryPolicy`])
//! - Retry-After handling for 429 responses
//!
//! PDFs are streamed to a `.part` file and renamed into place by
//! [`Fetcher::download_to_file`].

mod client;
mod error;
mod rate_limiter;
mod retry;

pub use client::{DownloadOutcome, FetchConfig, Fetcher};
pub use error::FetchError;
pub use rate_limiter::{RateLimiter, extract_domain, parse_retry_after};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
