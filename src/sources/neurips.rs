//! papers.nips.cc
//!
//! The year page links every paper's abstract page
//! (`/paper_files/paper/<year>/hash/<hash>-Abstract[-<track>].html`); the
//! PDF lives at the matching `/file/<hash>-Paper[-<track>].pdf`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::utils::{
    compile_static_regex, compile_static_selector, element_text, find_by_text, first_text,
    following_elements, join_url, split_authors,
};
use super::{IndexStep, Source, SourceContext, SourceError};
use crate::paper::{PaperEntry, PaperRecord};

static HASH_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"/hash/([a-f0-9]+)"));
static ABSTRACT_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"-Abstract(-\w+)?\.html$"));

static LINK: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("div.col.p-3 h4"));
static H4: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("h4"));
static ITALIC: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("i"));

/// Minimum length for a paragraph to count as the abstract.
const MIN_ABSTRACT_CHARS: usize = 50;

/// NeurIPS proceedings parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeuripsSource;

/// Abstract page URL -> PDF URL. `None` for URLs that are not abstract pages.
fn pdf_url_for(abstract_url: &str) -> Option<String> {
    if !abstract_url.contains("/hash/") {
        return None;
    }
    let caps = ABSTRACT_SUFFIX_RE.captures(abstract_url)?;
    let track = caps.get(1).map_or("", |m| m.as_str());
    let replaced = ABSTRACT_SUFFIX_RE.replace(abstract_url, format!("-Paper{track}.pdf"));
    Some(replaced.replacen("/hash/", "/file/", 1))
}

impl Source for NeuripsSource {
    fn name(&self) -> &str {
        "neurips"
    }

    fn index_urls(&self, ctx: &SourceContext) -> Result<Vec<String>, SourceError> {
        Ok(vec![format!(
            "{}paper_files/paper/{}",
            ctx.base_url, ctx.year
        )])
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

        for link in doc.select(&LINK) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !href.contains("/hash/") || !ABSTRACT_SUFFIX_RE.is_match(href) {
                continue;
            }
            let Some(detail_url) = join_url(page_url, href) else {
                continue;
            };
            let id = HASH_RE
                .captures(&detail_url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
            let mut entry = PaperEntry::for_detail_page(detail_url, id);
            if !seen.insert(entry.key.clone()) {
                continue;
            }
            let title = element_text(link);
            entry.title = (!title.is_empty()).then_some(title);
            entry.pdf_url = entry.detail_url.as_deref().and_then(pdf_url_for);
            entries.push(entry);
        }

        if entries.is_empty() {
            return Err(SourceError::parse(page_url, "no paper links found"));
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

        let title = first_text(root, &TITLE)
            .or_else(|| entry.title.clone())
            .ok_or_else(|| SourceError::parse(&url, "missing title"))?;

        let authors = find_by_text(root, &H4, "Authors")
            .and_then(|h4| following_elements(h4).find(|el| el.value().name() == "p"))
            .and_then(|p| first_text(p, &ITALIC))
            .map(|text| split_authors(&text, ','))
            .unwrap_or_default();

        let abstract_text = find_by_text(root, &H4, "Abstract").and_then(|h4| {
            following_elements(h4)
                .filter(|el| el.value().name() == "p")
                .map(element_text)
                .find(|text| text.chars().count() > MIN_ABSTRACT_CHARS)
        });

        let mut record = PaperRecord::new(&ctx.conference, ctx.year, title, url.as_str());
        record.id.clone_from(&entry.id);
        record.authors = authors;
        record.abstract_text = abstract_text;
        record.pdf_url = pdf_url_for(&url);
        entry.fill_missing(&mut record);
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
        <html><body><div class="container-fluid"><ul class="paper-list">
          <li><a title="paper title" href="/paper_files/paper/2023/hash/0a1b2c-Abstract-Conference.html">Attention Again</a>
              <i>Ada Lovelace, Alan Turing</i></li>
          <li><a href="/paper_files/paper/2023/hash/ffee99-Abstract-Datasets_and_Benchmarks.html">A Benchmark</a></li>
          <li><a href="/paper_files/paper/2023/hash/0a1b2c-Abstract-Conference.html">Attention Again</a></li>
          <li><a href="/paper_files/paper/2022">2022</a></li>
        </ul></div></body></html>"#;

    const DETAIL: &str = r#"
        <html><body><div class="container-fluid"><div class="col p-3">
          <h4>Attention Again: A Sequel</h4>
          <h4>Authors</h4>
          <p><i>Ada Lovelace, Alan Turing</i></p>
          <h4>Abstract</h4>
          <p></p>
          <p>We revisit attention and show that it is, in fact, still all you need for most tasks.</p>
        </div></div></body></html>"#;

    fn ctx() -> SourceContext {
        SourceContext::new("neurips", 2023, "https://papers.nips.cc/")
    }

    #[test]
    fn test_index_url_for_year() {
        assert_eq!(
            NeuripsSource.index_urls(&ctx()).unwrap(),
            vec!["https://papers.nips.cc/paper_files/paper/2023"]
        );
    }

    #[test]
    fn test_parse_index_collects_unique_abstract_links() {
        let step = NeuripsSource
            .parse_index(INDEX, "https://papers.nips.cc/paper_files/paper/2023", &ctx())
            .unwrap();
        let IndexStep::Papers(entries) = step else {
            panic!("expected papers");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "0a1b2c");
        assert_eq!(entries[0].title.as_deref(), Some("Attention Again"));
        assert_eq!(
            entries[0].pdf_url.as_deref(),
            Some("https://papers.nips.cc/paper_files/paper/2023/file/0a1b2c-Paper-Conference.pdf")
        );
        assert_eq!(
            entries[1].pdf_url.as_deref(),
            Some(
                "https://papers.nips.cc/paper_files/paper/2023/file/ffee99-Paper-Datasets_and_Benchmarks.pdf"
            )
        );
    }

    #[test]
    fn test_parse_index_without_links_is_error() {
        let err = NeuripsSource
            .parse_index("<html></html>", "https://papers.nips.cc/x", &ctx())
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[test]
    fn test_parse_paper_extracts_fields() {
        let entry = PaperEntry::for_detail_page(
            "https://papers.nips.cc/paper_files/paper/2023/hash/0a1b2c-Abstract-Conference.html",
            Some("0a1b2c".to_string()),
        );
        let record = NeuripsSource.parse_paper(DETAIL, &entry, &ctx()).unwrap();

        assert_eq!(record.id.as_deref(), Some("0a1b2c"));
        assert_eq!(record.title, "Attention Again: A Sequel");
        assert_eq!(record.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert!(record.abstract_text.unwrap().starts_with("We revisit attention"));
        assert_eq!(
            record.pdf_url.as_deref(),
            Some("https://papers.nips.cc/paper_files/paper/2023/file/0a1b2c-Paper-Conference.pdf")
        );
    }

    #[test]
    fn test_pdf_url_for_legacy_abstract_page() {
        assert_eq!(
            pdf_url_for("https://papers.nips.cc/paper_files/paper/2019/hash/abc-Abstract.html")
                .as_deref(),
            Some("https://papers.nips.cc/paper_files/paper/2019/file/abc-Paper.pdf")
        );
        assert!(pdf_url_for("https://papers.nips.cc/paper/123-title.html").is_none());
    }
}
