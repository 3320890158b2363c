//! Proceedings sources: one parser per site family.
//!
//! A [`Source`] turns fetched pages into [`PaperEntry`]s and
//! [`PaperRecord`]s. It never performs I/O; the pipeline fetches every
//! page it asks for, which keeps rate limiting and retry in one place.
//!
//! Index discovery is a short loop: the pipeline fetches each URL from
//! [`Source::index_urls`], and [`Source::parse_index`] answers either with
//! the papers on that page or with further pages to follow (for example
//! the PMLR volume of a given year).
//!
//! # Example
//!
//! ```
//! use paperscrape_core::sources::{SourceContext, build_default_source_registry};
//!
//! let registry = build_default_source_registry();
//! let source = registry.source_for("neurips", 2023).unwrap();
//! let ctx = SourceContext::new("neurips", 2023, "https://papers.nips.cc/");
//! let urls = source.index_urls(&ctx).unwrap();
//! assert_eq!(urls, vec!["https://papers.nips.cc/paper_files/paper/2023".to_string()]);
//! ```

mod auai;
mod cvf;
mod jmlr;
mod neurips;
mod openreview;
mod pmlr;
mod registry;
pub(crate) mod utils;

pub use auai::AuaiSource;
pub use cvf::CvfSource;
pub use jmlr::JmlrSource;
pub use neurips::NeuripsSource;
pub use openreview::OpenReviewSource;
pub use pmlr::PmlrSource;
pub use registry::{SourceRegistry, build_default_source_registry};

use thiserror::Error;

use crate::paper::{PaperEntry, PaperRecord};

/// Errors raised by source lookup and page parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// No source is registered under this conference id.
    #[error("unknown conference '{name}' (available: {})", available.join(", "))]
    UnknownConference {
        /// Requested conference id.
        name: String,
        /// Registered conference ids.
        available: Vec<String>,
    },

    /// The source cannot serve this year.
    #[error("{conference} {year} is not supported: {reason}")]
    UnsupportedYear {
        /// Conference id.
        conference: String,
        /// Requested year.
        year: u16,
        /// Why.
        reason: String,
    },

    /// The page did not have the expected structure.
    #[error("failed to parse {url}: {reason}")]
    Parse {
        /// Page URL.
        url: String,
        /// What was missing or unexpected.
        reason: String,
    },
}

impl SourceError {
    /// Creates a parse error.
    pub fn parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unsupported-year error.
    pub fn unsupported_year(
        conference: impl Into<String>,
        year: u16,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedYear {
            conference: conference.into(),
            year,
            reason: reason.into(),
        }
    }
}

/// What a source needs to know about the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    /// Conference id, e.g. `icml`.
    pub conference: String,
    /// Proceedings year.
    pub year: u16,
    /// Configured site root, ending in `/`.
    pub base_url: String,
}

impl SourceContext {
    /// Creates a context.
    pub fn new(conference: impl Into<String>, year: u16, base_url: impl Into<String>) -> Self {
        Self {
            conference: conference.into(),
            year,
            base_url: base_url.into(),
        }
    }
}

/// Result of parsing an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStep {
    /// The page lists papers.
    Papers(Vec<PaperEntry>),
    /// The page points at the real listing page(s).
    Follow(Vec<String>),
}

/// A proceedings site parser.
///
/// Implementations are stateless and cheap to share.
pub trait Source: Send + Sync {
    /// Short name used in logs (e.g. "pmlr").
    fn name(&self) -> &str;

    /// First pages to fetch for `ctx.year`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnsupportedYear`] when the site has no
    /// proceedings for the year.
    fn index_urls(&self, ctx: &SourceContext) -> Result<Vec<String>, SourceError>;

    /// Parses a fetched index page.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Parse`] when the page has neither papers nor
    /// a page to follow.
    fn parse_index(
        &self,
        raw: &str,
        page_url: &str,
        ctx: &SourceContext,
    ) -> Result<IndexStep, SourceError>;

    /// Parses a paper's detail page into a record.
    ///
    /// Only called for entries with a `detail_url`. The default builds the
    /// record from the index entry alone.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Parse`] when no title can be found.
    fn parse_paper(
        &self,
        raw: &str,
        entry: &PaperEntry,
        ctx: &SourceContext,
    ) -> Result<PaperRecord, SourceError> {
        let _ = raw;
        let page_url = entry.detail_url.as_deref().unwrap_or(&ctx.base_url);
        entry
            .to_record(&ctx.conference, ctx.year, page_url)
            .ok_or_else(|| SourceError::parse(page_url, "index entry has no title"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct IndexOnly;

    impl Source for IndexOnly {
        fn name(&self) -> &str {
            "index-only"
        }

        fn index_urls(&self, ctx: &SourceContext) -> Result<Vec<String>, SourceError> {
            Ok(vec![ctx.base_url.clone()])
        }

        fn parse_index(
            &self,
            _raw: &str,
            _page_url: &str,
            _ctx: &SourceContext,
        ) -> Result<IndexStep, SourceError> {
            Ok(IndexStep::Papers(Vec::new()))
        }
    }

    #[test]
    fn test_unknown_conference_lists_available() {
        let err = SourceError::UnknownConference {
            name: "nope".to_string(),
            available: vec!["icml".to_string(), "neurips".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "unknown conference 'nope' (available: icml, neurips)"
        );
    }

    #[test]
    fn test_default_parse_paper_uses_entry_fields() {
        let ctx = SourceContext::new("uai", 2016, "https://www.auai.org/");
        let mut entry = PaperEntry::new("17");
        entry.title = Some("Bounded Rationality".to_string());
        entry.detail_url = Some("https://www.auai.org/uai2016/17.html".to_string());

        let record = IndexOnly.parse_paper("", &entry, &ctx).unwrap();
        assert_eq!(record.title, "Bounded Rationality");
        assert_eq!(record.url, "https://www.auai.org/uai2016/17.html");
    }

    #[test]
    fn test_default_parse_paper_without_title_is_parse_error() {
        let ctx = SourceContext::new("uai", 2016, "https://www.auai.org/");
        let err = IndexOnly
            .parse_paper("", &PaperEntry::new("17"), &ctx)
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }
}
