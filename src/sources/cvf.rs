//! openaccess.thecvf.com (CVPR, ICCV).
//!
//! Each conference year has an `?day=all` listing (or one page per day for
//! a few older years) whose `<dt>` items link the paper pages. Paper pages
//! carry `#papertitle`, `#authors` and `#abstract`; the PDF path mirrors the
//! HTML path with `/html/` -> `/papers/`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::utils::{
    compile_static_regex, compile_static_selector, element_text, first_text, join_url,
    split_authors,
};
use super::{IndexStep, Source, SourceContext, SourceError};
use crate::paper::{PaperEntry, PaperRecord};

static PAPER_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"/([^/]+)\.html$"));

static DT_LINK: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("dt a[href]"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("#papertitle"));
static AUTHORS: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("#authors b i"));
static ABSTRACT: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("#abstract"));

/// CVF open-access parser for one conference series.
#[derive(Debug, Clone)]
pub struct CvfSource {
    acronym: &'static str,
}

impl CvfSource {
    /// CVPR.
    #[must_use]
    pub fn cvpr() -> Self {
        Self { acronym: "CVPR" }
    }

    /// ICCV.
    #[must_use]
    pub fn iccv() -> Self {
        Self { acronym: "ICCV" }
    }

    /// Days of years published as one listing per conference day.
    fn day_pages(&self, year: u16) -> &'static [&'static str] {
        match (self.acronym, year) {
            ("CVPR", 2018) => &["2018-06-19", "2018-06-20", "2018-06-21"],
            ("CVPR", 2019) => &["2019-06-18", "2019-06-19", "2019-06-20"],
            ("CVPR", 2020) => &["2020-06-16", "2020-06-17", "2020-06-18"],
            ("ICCV", 2019) => &["2019-10-29", "2019-10-30", "2019-10-31", "2019-11-01"],
            _ => &[],
        }
    }
}

/// Paper page URL -> PDF URL.
fn pdf_url_for(page_url: &str) -> String {
    page_url
        .replace("/html/", "/papers/")
        .replace(".html", ".pdf")
        // The 2017 ICCV papers are served from a capitalised directory.
        .replace("content_iccv_2017", "content_ICCV_2017")
}

impl Source for CvfSource {
    fn name(&self) -> &str {
        "cvf"
    }

    fn index_urls(&self, ctx: &SourceContext) -> Result<Vec<String>, SourceError> {
        let listing = format!("{}{}{}", ctx.base_url, self.acronym, ctx.year);
        let days = self.day_pages(ctx.year);
        if days.is_empty() {
            return Ok(vec![format!("{listing}?day=all")]);
        }
        Ok(days
            .iter()
            .map(|day| format!("{listing}?day={day}"))
            .collect())
    }

    fn parse_index(
        &self,
        raw: &str,
        page_url: &str,
        ctx: &SourceContext,
    ) -> Result<IndexStep, SourceError> {
        let doc = Html::parse_document(raw);
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for link in doc.select(&DT_LINK) {
            let Some(detail_url) = link
                .value()
                .attr("href")
                .and_then(|href| join_url(&ctx.base_url, href))
            else {
                continue;
            };
            let id = PAPER_ID_RE
                .captures(&detail_url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
            let mut entry = PaperEntry::for_detail_page(detail_url, id);
            if !seen.insert(entry.key.clone()) {
                continue;
            }
            let title = element_text(link);
            entry.title = (!title.is_empty()).then_some(title);
            entry.pdf_url = entry.detail_url.as_deref().map(pdf_url_for);
            entries.push(entry);
        }

        if entries.is_empty() {
            return Err(SourceError::parse(page_url, "no <dt> paper links found"));
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
            .filter(|t| t.chars().count() > 3)
            .ok_or_else(|| SourceError::parse(&url, "missing #papertitle"))?;

        let mut record = PaperRecord::new(&ctx.conference, ctx.year, title, url.as_str());
        record.id.clone_from(&entry.id);
        record.authors = first_text(root, &AUTHORS)
            .map(|text| split_authors(&text, ','))
            .unwrap_or_default();
        record.abstract_text = first_text(root, &ABSTRACT);
        record.pdf_url = Some(pdf_url_for(&url));
        Ok(record)
    }
}
