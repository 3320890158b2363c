//! User-Agent strings for scraper HTTP traffic.
//!
//! Proceedings sites commonly serve reduced pages (or 403) to obvious bots, so
//! the default identifies as a desktop browser while still naming the tool.

/// Browser-like prefix accepted by the proceedings sites.
const BROWSER_PREFIX: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Default User-Agent for page and PDF requests.
#[must_use]
pub(crate) fn default_scraper_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{BROWSER_PREFIX} paperscrape/{version}")
}
