//! jmlr.org
//!
//! One volume per year (`v<year - 1999>`); the volume page lists papers as
//! `<dl>` blocks whose `<dd>` carries the `abs` and `pdf` links.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::utils::{
    clean_text, compile_static_regex, compile_static_selector, element_text, find_by_text,
    first_text, join_url, split_authors,
};
use super::{IndexStep, Source, SourceContext, SourceError};
use crate::paper::{PaperEntry, PaperRecord};

/// Volume 1 was published in 2000.
const FIRST_VOLUME_YEAR: u16 = 2000;

static PAPER_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"v\d+/([^/]+)\.html"));

static DL: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("dl"));
static DT: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("dt"));
static DD: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("dd"));
static LINK: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("h1, h2, .title, .paper-title, #title"));
static ITALIC: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("i"));
static ABSTRACT: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("p.abstract"));
static H3: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("h3"));

/// Elements that end the loose abstract text of old volumes.
const ABSTRACT_STOP_TAGS: [&str; 6] = ["font", "p", "h3", "h2", "h1", "div"];

/// JMLR parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct JmlrSource;

/// First link under `scope` whose text contains `needle` (case-insensitive).
fn link_containing(scope: ElementRef<'_>, needle: &str, page_url: &str) -> Option<String> {
    scope
        .select(&LINK)
        .find(|a| element_text(*a).to_lowercase().contains(needle))
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| join_url(page_url, href))
}

/// Volumes up to 5 put the abstract as loose text after `<h3>Abstract</h3>`.
fn loose_abstract(root: ElementRef<'_>) -> Option<String> {
    let h3 = find_by_text(root, &H3, "abstract")?;
    let mut parts = Vec::new();
    for node in h3.next_siblings() {
        if let Some(el) = ElementRef::wrap(node) {
            if ABSTRACT_STOP_TAGS.contains(&el.value().name()) {
                break;
            }
            parts.push(element_text(el));
        } else if let Some(text) = node.value().as_text() {
            parts.push(clean_text(text));
        }
    }
    let text = clean_text(&parts.join(" "));
    (!text.is_empty()).then_some(text)
}

impl Source for JmlrSource {
    fn name(&self) -> &str {
        "jmlr"
    }

    fn index_urls(&self, ctx: &SourceContext) -> Result<Vec<String>, SourceError> {
        if ctx.year < FIRST_VOLUME_YEAR {
            return Err(SourceError::unsupported_year(
                &ctx.conference,
                ctx.year,
                "JMLR volumes start in 2000",
            ));
        }
        let volume = ctx.year - (FIRST_VOLUME_YEAR - 1);
        Ok(vec![format!("{}papers/v{volume}/", ctx.base_url)])
    }

    fn parse_index(
        &self,
        raw: &str,
        page_url: &str,
        _ctx: &SourceContext,
    ) -> Result<IndexStep, SourceError> {
        let doc = Html::parse_document(raw);
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for dl in doc.select(&DL) {
            let Some(dd) = dl.select(&DD).next() else {
                continue;
            };
            let Some(abs_url) = link_containing(dd, "abs", page_url) else {
                continue;
            };
            let id = PAPER_ID_RE
                .captures(&abs_url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
            let mut entry = PaperEntry::for_detail_page(abs_url, id);
            if !seen.insert(entry.key.clone()) {
                continue;
            }
            entry.title = first_text(dl, &DT);
            entry.pdf_url = link_containing(dd, "pdf", page_url);
            entries.push(entry);
        }

        if entries.is_empty() {
            return Err(SourceError::parse(page_url, "no abs links found"));
        }
        Ok(IndexStep::Papers(entries))
    }

    fn parse_paper(
        &self,
        raw: &str,
        entry: &PaperEntry,
        ctx: &SourceContext,
    ) -> Result<PaperRecord, SourceError> {
        let doc = Html::parse_document(raw);
        let root = doc.root_element();
        let url = entry.detail_url.clone().unwrap_or_default();

        let title = root
            .select(&TITLE)
            .map(element_text)
            .find(|t| t.chars().count() > 3)
            .or_else(|| entry.title.clone())
            .ok_or_else(|| SourceError::parse(&url, "missing title"))?;

        let mut record = PaperRecord::new(&ctx.conference, ctx.year, title, url.as_str());
        record.id.clone_from(&entry.id);
        record.authors = first_text(root, &ITALIC)
            .map(|text| split_authors(&text, ','))
            .unwrap_or_default();
        record.abstract_text = first_text(root, &ABSTRACT).or_else(|| loose_abstract(root));
        record.pdf_url = link_containing(root, "pdf", &url);
        entry.fill_missing(&mut record);
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ctx(year: u16) -> SourceContext {
        SourceContext::new("jmlr", year, "https://www.jmlr.org/")
    }

    #[test]
    fn test_index_url_maps_year_to_volume() {
        assert_eq!(
            JmlrSource.index_urls(&ctx(2023)).unwrap(),
            vec!["https://www.jmlr.org/papers/v24/"]
        );
        assert_eq!(
            JmlrSource.index_urls(&ctx(2000)).unwrap(),
            vec!["https://www.jmlr.org/papers/v1/"]
        );
        assert!(JmlrSource.index_urls(&ctx(1999)).is_err());
    }

    #[test]
    fn test_parse_index_reads_abs_and_pdf_links() {
        let html = r#"<html><body><div id="content">
            <dl><dt>Sparse Things</dt>
                <dd><b><i>Ada Lovelace</i></b>; (1):1-30, 2023.
                <br>[<a href="/papers/v24/21-0001.html">abs</a>][<a href="/papers/volume24/21-0001/21-0001.pdf">pdf</a>][<a href="/papers/v24/21-0001.bib">bib</a>]</dd></dl>
            <dl><dt>Erratum</dt><dd>no links</dd></dl>
        </div></body></html>"#;
        let step = JmlrSource
            .parse_index(html, "https://www.jmlr.org/papers/v24/", &ctx(2023))
            .unwrap();
        let IndexStep::Papers(entries) = step else {
            panic!("expected papers");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "21-0001");
        assert_eq!(entries[0].title.as_deref(), Some("Sparse Things"));
        assert_eq!(
            entries[0].pdf_url.as_deref(),
            Some("https://www.jmlr.org/papers/volume24/21-0001/21-0001.pdf")
        );
    }

    #[test]
    fn test_parse_paper_modern_layout() {
        let html = r#"<html><body><div id="content">
            <h2>Sparse Things</h2>
            <p><b><i>Ada Lovelace, Alan Turing</i></b>; 24(1):1-30, 2023.</p>
            <h3>Abstract</h3>
            <p class="abstract">We make things sparse.</p>
            <p>[<a href="/papers/volume24/21-0001/21-0001.pdf">pdf</a>]</p>
        </div></body></html>"#;
        let entry = PaperEntry::for_detail_page(
            "https://www.jmlr.org/papers/v24/21-0001.html",
            Some("21-0001".to_string()),
        );
        let record = JmlrSource.parse_paper(html, &entry, &ctx(2023)).unwrap();
        assert_eq!(record.title, "Sparse Things");
        assert_eq!(record.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(record.abstract_text.as_deref(), Some("We make things sparse."));
        assert_eq!(
            record.pdf_url.as_deref(),
            Some("https://www.jmlr.org/papers/volume24/21-0001/21-0001.pdf")
        );
    }

    #[test]
    fn test_parse_paper_old_volume_loose_abstract() {
        let html = r#"<html><body>
            <h2>Early Learning</h2>
            <i>Grace Hopper</i>
            <h3>Abstract</h3>
            Loose text about <b>early</b> learning.
            <p>[<a href="/papers/volume1/x.pdf">pdf</a>]</p>
        </body></html>"#;
        let entry = PaperEntry::for_detail_page("https://www.jmlr.org/papers/v1/x.html", None);
        let record = JmlrSource.parse_paper(html, &entry, &ctx(2000)).unwrap();
        assert_eq!(
            record.abstract_text.as_deref(),
            Some("Loose text about early learning.")
        );
        assert_eq!(record.authors, vec!["Grace Hopper"]);
    }
}
