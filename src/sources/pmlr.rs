//! proceedings.mlr.press (ICML, COLT, UAI, AISTATS).
//!
//! The site root lists every volume as `<li>` items; the item whose text
//! names the conference and year links the volume (`v202/`). A volume
//! page holds one `div.paper` per paper with title, authors and the
//! abstract/PDF links, so most of the record comes from the index. The
//! abstract page contributes only the abstract.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::utils::{
    compile_static_regex, compile_static_selector, element_text, first_text, join_url,
    split_authors,
};
use super::{IndexStep, Source, SourceContext, SourceError};
use crate::paper::{PaperEntry, PaperRecord};

static VOLUME_HREF_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"^/?(v\d+)"));
static PAPER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/v\d+/([^/]+)\.html"));

static LIST_ITEM: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("li"));
static LINK: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));
static PAPER: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("div.paper"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("p.title"));
static AUTHORS: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("p.details span.authors"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("p.links a[href]"));
static ABSTRACT: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div#abstract, div.abstract"));

/// Builds the volume-matching pattern for a year.
type VolumePattern = fn(u16) -> String;

/// PMLR proceedings parser for one conference series.
#[derive(Debug, Clone)]
pub struct PmlrSource {
    acronym: &'static str,
    volume_pattern: VolumePattern,
    /// Volumes missing from or mislabelled on the site root.
    known_volumes: &'static [(u16, &'static str)],
}

impl PmlrSource {
    /// ICML: "Proceedings of ICML 2023" or "ICML 2023 Proceedings" at the end of the item.
    #[must_use]
    pub fn icml() -> Self {
        Self {
            acronym: "ICML",
            volume_pattern: |year| {
                format!(
                    r"(?i)\b(?:Proceedings\s+of\s+ICML\s+{year}|ICML\s+{year}\s+Proceedings)\b\s*$"
                )
            },
            known_volumes: &[],
        }
    }

    /// COLT.
    #[must_use]
    pub fn colt() -> Self {
        Self {
            acronym: "COLT",
            volume_pattern: |year| {
                format!(
                    r"(?i)Proceedings\s+of.*?COLT\s+{year}\b|\bCOLT\s+{year}.*?Proceedings|\bCOLT\s+{year}\b"
                )
            },
            known_volumes: &[(2025, "v291")],
        }
    }

    /// UAI (2019 onwards; earlier years live on auai.org).
    #[must_use]
    pub fn uai() -> Self {
        Self {
            acronym: "UAI",
            volume_pattern: |year| format!(r"(?i)\bProceedings\s+of.*?UAI\s+{year}\b"),
            known_volumes: &[],
        }
    }

    /// AISTATS.
    #[must_use]
    pub fn aistats() -> Self {
        Self {
            acronym: "AISTATS",
            volume_pattern: |year| {
                format!(r"(?i)\bProceedings\s+of.*?AISTATS\s+{year}\b|\bAISTATS\s+{year}\b")
            },
            known_volumes: &[],
        }
    }

    /// Finds the volume id (`v202`) for `year` on the site root page.
    fn find_volume(
        &self,
        doc: &Html,
        year: u16,
        page_url: &str,
    ) -> Result<Option<String>, SourceError> {
        let pattern = Regex::new(&(self.volume_pattern)(year))
            .map_err(|e| SourceError::parse(page_url, format!("bad volume pattern: {e}")))?;

        Ok(doc.select(&LIST_ITEM).find_map(|li| {
            if !pattern.is_match(&element_text(li)) {
                return None;
            }
            let href = li.select(&LINK).next()?.value().attr("href")?;
            VOLUME_HREF_RE
                .captures(href)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        }))
    }
}

/// Reads one `div.paper` block into an entry.
fn parse_paper_div(div: ElementRef<'_>, page_url: &str) -> Option<PaperEntry> {
    let mut abs_url = None;
    let mut pdf_url = None;
    for link in div.select(&LINKS) {
        let text = element_text(link);
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if abs_url.is_none() && text == "abs" {
            abs_url = join_url(page_url, href);
        } else if pdf_url.is_none() && (text.contains("Download PDF") || text == "pdf") {
            pdf_url = join_url(page_url, href);
        }
    }

    let abs_url = abs_url?;
    let id = PAPER_ID_RE
        .captures(&abs_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let mut entry = PaperEntry::for_detail_page(abs_url, id);
    entry.title = first_text(div, &TITLE);
    entry.authors = first_text(div, &AUTHORS)
        .map(|text| split_authors(&text, ','))
        .unwrap_or_default();
    entry.pdf_url = pdf_url;
    Some(entry)
}

impl Source for PmlrSource {
    fn name(&self) -> &str {
        "pmlr"
    }

    fn index_urls(&self, ctx: &SourceContext) -> Result<Vec<String>, SourceError> {
        let known = self
            .known_volumes
            .iter()
            .find(|(year, _)| *year == ctx.year)
            .map(|(_, volume)| format!("{}{volume}/", ctx.base_url));
        Ok(vec![known.unwrap_or_else(|| ctx.base_url.clone())])
    }

    fn parse_index(
        &self,
        raw: &str,
        page_url: &str,
        ctx: &SourceContext,
    ) -> Result<IndexStep, SourceError> {
        let doc = Html::parse_document(raw);

        let paper_divs: Vec<_> = doc.select(&PAPER).collect();
        if !paper_divs.is_empty() {
            let mut seen = HashSet::new();
            let entries: Vec<_> = paper_divs
                .into_iter()
                .filter_map(|div| parse_paper_div(div, page_url))
                .filter(|entry| seen.insert(entry.key.clone()))
                .collect();
            return Ok(IndexStep::Papers(entries));
        }

        match self.find_volume(&doc, ctx.year, page_url)? {
            Some(volume) => {
                let volume_url = join_url(page_url, &format!("{volume}/"))
                    .ok_or_else(|| SourceError::parse(page_url, "cannot build volume URL"))?;
                Ok(IndexStep::Follow(vec![volume_url]))
            }
            None => Err(SourceError::unsupported_year(
                &ctx.conference,
                ctx.year,
                format!("no {} {} volume listed at {page_url}", self.acronym, ctx.year),
            )),
        }
    }

    fn parse_paper(
        &self,
        raw: &str,
        entry: &PaperEntry,
        ctx: &SourceContext,
    ) -> Result<PaperRecord, SourceError> {
        let url = entry.detail_url.as_deref().unwrap_or(&ctx.base_url);
        let mut record = entry
            .to_record(&ctx.conference, ctx.year, url)
            .ok_or_else(|| SourceError::parse(url, "volume entry has no title"))?;

        let doc = Html::parse_document(raw);
        record.abstract_text = first_text(doc.root_element(), &ABSTRACT);
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ROOT: &str = r#"
        <html><body><ul class="proceedings-list">
          <li><a href="v201/">Volume 201</a> Algorithmic Learning Theory 2023</li>
          <li><a href="v202/">Volume 202</a> International Conference on Machine Learning, 23-29 July 2023, Honolulu, Hawaii, USA Published as Volume 202 by the Proceedings of Machine Learning Research on 03 July 2023. Volume Edited by: Andreas Krause Series Editors: Neil D. Lawrence Proceedings of ICML 2023</li>
          <li><a href="v216/">Volume 216</a> Uncertainty in Artificial Intelligence, Proceedings of the Thirty-Ninth Conference on UAI 2023</li>
        </ul></body></html>"#;

    const VOLUME: &str = r#"
        <html><body>
          <div class="paper">
            <p class="title">Learning Things Quickly</p>
            <p class="details"><span class="authors">Ada&nbsp;Lovelace,&nbsp;Alan&nbsp;Turing</span>; PMLR 202:1-20</p>
            <p class="links">[<a href="https://proceedings.mlr.press/v202/lovelace23a.html">abs</a>][<a href="https://proceedings.mlr.press/v202/lovelace23a/lovelace23a.pdf" target="_blank">Download PDF</a>]</p>
          </div>
          <div class="paper">
            <p class="title">No Links Here</p>
          </div>
          <div class="paper">
            <p class="title">Relative Links</p>
            <p class="links"><a href="turing23b.html">abs</a> <a href="turing23b/turing23b.pdf">pdf</a></p>
          </div>
        </body></html>"#;

    fn ctx(conference: &str, year: u16) -> SourceContext {
        SourceContext::new(conference, year, "https://proceedings.mlr.press/")
    }

    #[test]
    fn test_index_urls_default_to_root() {
        assert_eq!(
            PmlrSource::icml().index_urls(&ctx("icml", 2023)).unwrap(),
            vec!["https://proceedings.mlr.press/"]
        );
    }

    #[test]
    fn test_index_urls_use_known_volume() {
        assert_eq!(
            PmlrSource::colt().index_urls(&ctx("colt", 2025)).unwrap(),
            vec!["https://proceedings.mlr.press/v291/"]
        );
    }

    #[test]
    fn test_root_page_follows_matching_volume() {
        let step = PmlrSource::icml()
            .parse_index(ROOT, "https://proceedings.mlr.press/", &ctx("icml", 2023))
            .unwrap();
        assert_eq!(
            step,
            IndexStep::Follow(vec!["https://proceedings.mlr.press/v202/".to_string()])
        );

        let step = PmlrSource::uai()
            .parse_index(ROOT, "https://proceedings.mlr.press/", &ctx("uai", 2023))
            .unwrap();
        assert_eq!(
            step,
            IndexStep::Follow(vec!["https://proceedings.mlr.press/v216/".to_string()])
        );
    }

    #[test]
    fn test_root_page_without_volume_is_unsupported_year() {
        let err = PmlrSource::icml()
            .parse_index(ROOT, "https://proceedings.mlr.press/", &ctx("icml", 2031))
            .unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedYear { year: 2031, .. }));
    }

    #[test]
    fn test_volume_page_yields_entries_with_pdf_links() {
        let step = PmlrSource::icml()
            .parse_index(
                VOLUME,
                "https://proceedings.mlr.press/v202/",
                &ctx("icml", 2023),
            )
            .unwrap();
        let IndexStep::Papers(entries) = step else {
            panic!("expected papers");
        };
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.key, "lovelace23a");
        assert_eq!(first.title.as_deref(), Some("Learning Things Quickly"));
        assert_eq!(first.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(
            first.pdf_url.as_deref(),
            Some("https://proceedings.mlr.press/v202/lovelace23a/lovelace23a.pdf")
        );

        assert_eq!(entries[1].key, "turing23b");
        assert_eq!(
            entries[1].detail_url.as_deref(),
            Some("https://proceedings.mlr.press/v202/turing23b.html")
        );
    }

    #[test]
    fn test_parse_paper_adds_abstract_to_volume_fields() {
        let mut entry = PaperEntry::for_detail_page(
            "https://proceedings.mlr.press/v202/lovelace23a.html",
            Some("lovelace23a".to_string()),
        );
        entry.title = Some("Learning Things Quickly".to_string());
        entry.pdf_url =
            Some("https://proceedings.mlr.press/v202/lovelace23a/lovelace23a.pdf".to_string());

        let html = r#"<html><body><div id="abstract" class="abstract"> We learn   things. </div></body></html>"#;
        let record = PmlrSource::icml()
            .parse_paper(html, &entry, &ctx("icml", 2023))
            .unwrap();
        assert_eq!(record.abstract_text.as_deref(), Some("We learn things."));
        assert_eq!(record.id.as_deref(), Some("lovelace23a"));
        assert!(record.pdf_url.is_some());
    }
}
