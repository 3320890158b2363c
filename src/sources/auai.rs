//! auai.org accepted-papers pages (UAI 2015 to 2018).
//!
//! Every paper sits in one `<tr>` of a single page, so entries come out of
//! the index complete and no detail page is fetched.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::utils::{
    clean_text, compile_static_regex, compile_static_selector, element_text, first_text, join_url,
};
use super::{IndexStep, Source, SourceContext, SourceError};
use crate::paper::PaperEntry;

const DEFAULT_BASE_URL: &str = "https://www.auai.org/";

/// Names this short are initials or separators, not authors.
const MIN_AUTHOR_CHARS: usize = 3;

static PAPER_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"ID:\s*(\d+)"));

static ROW: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("tr"));
static TD: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("td"));
static TD_LINK: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("td a[href]"));
static LINK: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));
static H4: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("h4"));
static H5: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("h5"));
static ITALIC: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("i"));
static BOLD: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("b"));
static DIV_BOLD: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("div b"));
static COLLAPSE: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("div.collapse"));
static COLLAPSE_INNER: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.collapse div"));

/// Parser for the UAI pages hosted on auai.org.
#[derive(Debug, Clone)]
pub struct AuaiSource {
    base_url: String,
}

impl Default for AuaiSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AuaiSource {
    /// Creates a parser for `https://www.auai.org/`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a parser against another host (used by tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { base_url }
    }

    fn year_url(&self, year: u16) -> Option<String> {
        let page = match year {
            2015 => "acceptedPapers.shtml",
            2016 => "proceedings.php",
            y if y >= 2017 => "accepted.php",
            _ => return None,
        };
        Some(format!("{}uai{year}/{page}", self.base_url))
    }
}

fn extract_id(text: &str) -> Option<String> {
    PAPER_ID_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 2017 onwards: `<h4>` title, authors as the bare text right after it.
fn parse_modern_row(row: ElementRef<'_>, page_url: &str) -> Option<PaperEntry> {
    let h4 = row.select(&H4).next()?;
    let title = element_text(h4);
    if title.chars().count() <= 3 {
        return None;
    }

    let id = first_text(row, &H5).and_then(|text| extract_id(&text));
    let mut entry = PaperEntry::new(id.clone().unwrap_or_else(|| title.clone()));
    entry.id = id;
    entry.authors = h4
        .next_sibling()
        .and_then(|node| node.value().as_text().map(|text| clean_text(text)))
        .map(|text| {
            text.split(',')
                .map(str::trim)
                .filter(|name| name.chars().count() >= MIN_AUTHOR_CHARS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    entry.abstract_text = first_text(row, &COLLAPSE).filter(|text| text.chars().count() > 3);
    entry.pdf_url = row
        .select(&TD_LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| join_url(page_url, href));
    entry.title = Some(title);
    Some(entry)
}

/// 2015 and 2016: title in the second cell, authors as `Last, First; ...`.
fn parse_legacy_row(row: ElementRef<'_>, year_root: &str) -> Option<PaperEntry> {
    let mut cells = row.select(&TD);
    let first_cell = cells.next()?;
    let title = cells
        .next()
        .and_then(|cell| first_text(cell, &DIV_BOLD))
        .filter(|title| !title.is_empty())?;

    let id = first_text(first_cell, &BOLD).and_then(|text| extract_id(&text));
    let mut entry = PaperEntry::new(id.clone().unwrap_or_else(|| title.clone()));
    entry.id = id;
    entry.authors = first_text(row, &ITALIC)
        .map(|text| {
            text.split(';')
                .map(|part| part.split(',').next().unwrap_or_default().trim())
                .filter(|name| name.chars().count() >= MIN_AUTHOR_CHARS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    entry.abstract_text = first_text(row, &COLLAPSE_INNER).filter(|text| text.chars().count() > 3);
    entry.pdf_url = first_cell
        .select(&LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| join_url(year_root, href));
    entry.title = Some(title);
    Some(entry)
}

impl Source for AuaiSource {
    fn name(&self) -> &str {
        "auai"
    }

    fn index_urls(&self, ctx: &SourceContext) -> Result<Vec<String>, SourceError> {
        self.year_url(ctx.year).map(|url| vec![url]).ok_or_else(|| {
            SourceError::unsupported_year(&ctx.conference, ctx.year, "no auai.org page before 2015")
        })
    }

    fn parse_index(
        &self,
        raw: &str,
        page_url: &str,
        ctx: &SourceContext,
    ) -> Result<IndexStep, SourceError> {
        let doc = Html::parse_document(raw);
        let year_root = format!("{}uai{}/", self.base_url, ctx.year);
        let mut seen_titles = HashSet::new();
        let mut entries = Vec::new();

        for row in doc.select(&ROW) {
            let entry = if ctx.year <= 2016 {
                parse_legacy_row(row, &year_root)
            } else {
                parse_modern_row(row, page_url)
            };
            let Some(entry) = entry else {
                continue;
            };
            let title = entry.title.clone().unwrap_or_default();
            if seen_titles.insert(title) {
                entries.push(entry);
            }
        }

        if entries.is_empty() {
            return Err(SourceError::parse(page_url, "no paper rows found"));
        }
        Ok(IndexStep::Papers(entries))
    }
}
