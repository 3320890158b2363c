//! Paper records and index entries.
//!
//! A [`PaperEntry`] is what a source index yields; a [`PaperRecord`] is the
//! normalized metadata persisted to `<conference>_<year>.json`.

use serde::{Deserialize, Serialize};

use crate::resume::ItemStatus;

/// Maximum number of title characters kept in a PDF file name.
const PDF_TITLE_CHARS: usize = 50;

/// Normalized metadata for one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Source-provided identifier, when the source has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Conference id, e.g. `neurips`.
    pub conference: String,
    /// Proceedings year.
    pub year: u16,
    /// Paper title.
    pub title: String,
    /// Authors in listed order.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Abstract text.
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    /// Page the record was scraped from.
    pub url: String,
    /// Direct PDF link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Where the PDF was saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    /// Pipeline status at the time of the last flush.
    pub status: ItemStatus,
}

impl PaperRecord {
    /// Creates a record in `FETCHED` state with no optional fields set.
    pub fn new(
        conference: impl Into<String>,
        year: u16,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            conference: conference.into(),
            year,
            title: title.into(),
            authors: Vec::new(),
            abstract_text: None,
            url: url.into(),
            pdf_url: None,
            local_path: None,
            status: ItemStatus::Fetched,
        }
    }

    /// Identity used to deduplicate records within a metadata file.
    ///
    /// The source id when present, otherwise conference, year and the
    /// normalized title.
    #[must_use]
    pub fn identity(&self) -> String {
        match self.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => format!("id:{id}"),
            None => format!(
                "title:{}:{}:{}",
                self.conference,
                self.year,
                normalize_title(&self.title)
            ),
        }
    }

    /// File name for this record's PDF: `<id>_<title[..50]>.pdf`.
    #[must_use]
    pub fn pdf_filename(&self) -> String {
        let id = self
            .id
            .as_deref()
            .map(sanitize_filename_component)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let title: String = sanitize_filename_component(&self.title)
            .chars()
            .take(PDF_TITLE_CHARS)
            .collect();
        let title = title.trim_end_matches(['_', '.']);

        if title.is_empty() {
            format!("{id}.pdf")
        } else {
            format!("{id}_{title}.pdf")
        }
    }
}

/// One row of a source index.
///
/// `key` identifies the work item before the detail page is parsed. Fields
/// other than `key` are whatever the index page already revealed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperEntry {
    /// Work-item key: the source id, otherwise the detail URL.
    pub key: String,
    /// Detail page to fetch; `None` when the index row is already complete.
    pub detail_url: Option<String>,
    /// Public page of a complete index row, used as the record URL.
    pub landing_url: Option<String>,
    /// Source id.
    pub id: Option<String>,
    /// Title from the index.
    pub title: Option<String>,
    /// Authors from the index.
    pub authors: Vec<String>,
    /// Abstract from the index.
    pub abstract_text: Option<String>,
    /// PDF link from the index.
    pub pdf_url: Option<String>,
}

impl PaperEntry {
    /// Creates an entry keyed by `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Creates an entry pointing at a detail page, keyed by the source id
    /// when given, otherwise by the URL.
    pub fn for_detail_page(detail_url: impl Into<String>, id: Option<String>) -> Self {
        let detail_url = detail_url.into();
        Self {
            key: id.clone().unwrap_or_else(|| detail_url.clone()),
            detail_url: Some(detail_url),
            id,
            ..Self::default()
        }
    }

    /// Builds a record from the index fields alone. Returns `None` without a title.
    #[must_use]
    pub fn to_record(&self, conference: &str, year: u16, page_url: &str) -> Option<PaperRecord> {
        let title = self.title.as_deref().filter(|t| !t.trim().is_empty())?;
        let mut record = PaperRecord::new(
            conference,
            year,
            title.trim(),
            self.detail_url
                .as_deref()
                .or(self.landing_url.as_deref())
                .unwrap_or(page_url),
        );
        record.id.clone_from(&self.id);
        record.authors.clone_from(&self.authors);
        record.abstract_text.clone_from(&self.abstract_text);
        record.pdf_url.clone_from(&self.pdf_url);
        Some(record)
    }

    /// Fills fields the detail page left empty from the index entry.
    pub fn fill_missing(&self, record: &mut PaperRecord) {
        if record.id.is_none() {
            record.id.clone_from(&self.id);
        }
        if record.pdf_url.is_none() {
            record.pdf_url.clone_from(&self.pdf_url);
        }
        if record.authors.is_empty() {
            record.authors.clone_from(&self.authors);
        }
        if record.abstract_text.is_none() {
            record.abstract_text.clone_from(&self.abstract_text);
        }
        if record.title.trim().is_empty() {
            if let Some(title) = &self.title {
                record.title.clone_from(title);
            }
        }
    }
}

/// Lowercases and keeps only alphanumerics separated by single spaces.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replaces characters that are unsafe in file names with `_`, collapsing runs.
#[must_use]
pub fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        let keep = ch.is_alphanumeric() || matches!(ch, '-' | '.');
        if keep {
            out.push(ch);
            prev_sep = false;
        } else if !prev_sep {
            out.push('_');
            prev_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}
