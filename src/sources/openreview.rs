//! OpenReview (API v1), used for ICLR 2017-2023.
//!
//! Submissions are listed as JSON notes. With `details=directReplies` each
//! note carries its replies, so the decision is read from the same page and
//! rejected submissions never become work items. Index rows are complete;
//! there is no detail page to fetch.

use serde::Deserialize;
use url::Url;

use super::utils::{clean_text, join_url};
use super::{IndexStep, Source, SourceContext, SourceError};
use crate::paper::PaperEntry;

/// Notes per request; the API caps `limit` at 1000.
const PAGE_SIZE: usize = 1000;

/// Submission pages requested per year. Pages past the end come back empty.
const SUBMISSION_PAGES: usize = 6;

const FIRST_YEAR: u16 = 2017;
const LAST_YEAR: u16 = 2023;

#[derive(Debug, Deserialize)]
struct NotesPage {
    notes: Vec<Note>,
}

#[derive(Debug, Deserialize)]
struct Note {
    #[serde(default)]
    id: String,
    #[serde(default)]
    invitation: String,
    #[serde(default)]
    content: NoteContent,
    #[serde(default)]
    details: NoteDetails,
}

#[derive(Debug, Default, Deserialize)]
struct NoteContent {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    pdf: Option<String>,
    decision: Option<String>,
    recommendation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteDetails {
    #[serde(default)]
    direct_replies: Vec<Note>,
}

impl Note {
    /// Decision text from the first decision or meta-review reply.
    fn decision(&self) -> Option<&str> {
        self.details
            .direct_replies
            .iter()
            .filter(|reply| is_decision_invitation(&reply.invitation))
            .find_map(|reply| {
                reply
                    .content
                    .decision
                    .as_deref()
                    .or(reply.content.recommendation.as_deref())
            })
    }

    fn is_accepted(&self) -> bool {
        self.decision()
            .is_some_and(|decision| decision.to_lowercase().contains("accept"))
    }
}

/// 2017 used `/acceptance`, 2018 `Acceptance_Decision`, 2019 meta-reviews,
/// later years `/-/Decision`.
fn is_decision_invitation(invitation: &str) -> bool {
    invitation.ends_with("Decision")
        || invitation.ends_with("/acceptance")
        || invitation.ends_with("Meta_Review")
}

/// Submission invitation for an ICLR year.
fn submission_invitation(year: u16) -> String {
    if year == FIRST_YEAR {
        format!("ICLR.cc/{year}/conference/-/submission")
    } else {
        format!("ICLR.cc/{year}/Conference/-/Blind_Submission")
    }
}

/// The website serving forums and PDFs: the API host without its `api.` prefix.
fn site_root(base_url: &str) -> String {
    let Ok(mut url) = Url::parse(base_url) else {
        return base_url.to_string();
    };
    let site_host = url
        .host_str()
        .and_then(|host| host.strip_prefix("api.").or_else(|| host.strip_prefix("api2.")))
        .map(str::to_string);
    if let Some(host) = site_host {
        if url.set_host(Some(&host)).is_err() {
            return base_url.to_string();
        }
    }
    url.to_string()
}

/// OpenReview parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenReviewSource;

impl Source for OpenReviewSource {
    fn name(&self) -> &str {
        "openreview"
    }

    fn index_urls(&self, ctx: &SourceContext) -> Result<Vec<String>, SourceError> {
        if !(FIRST_YEAR..=LAST_YEAR).contains(&ctx.year) {
            return Err(SourceError::unsupported_year(
                &ctx.conference,
                ctx.year,
                "OpenReview API v1 covers 2017-2023",
            ));
        }
        let notes = Url::parse(&ctx.base_url)
            .and_then(|base| base.join("notes"))
            .map_err(|e| SourceError::parse(&ctx.base_url, format!("invalid base URL: {e}")))?;
        let invitation = submission_invitation(ctx.year);

        Ok((0..SUBMISSION_PAGES)
            .map(|page| {
                let mut url = notes.clone();
                url.query_pairs_mut()
                    .append_pair("invitation", &invitation)
                    .append_pair("details", "directReplies")
                    .append_pair("offset", &(page * PAGE_SIZE).to_string())
                    .append_pair("limit", &PAGE_SIZE.to_string());
                url.to_string()
            })
            .collect())
    }

    fn parse_index(
        &self,
        raw: &str,
        page_url: &str,
        ctx: &SourceContext,
    ) -> Result<IndexStep, SourceError> {
        let page: NotesPage = serde_json::from_str(raw)
            .map_err(|e| SourceError::parse(page_url, format!("invalid notes JSON: {e}")))?;
        let site = site_root(&ctx.base_url);

        let entries = page
            .notes
            .into_iter()
            .filter(|note| !note.id.is_empty() && note.is_accepted())
            .map(|note| {
                let mut entry = PaperEntry::new(note.id.as_str());
                entry.landing_url = join_url(&site, &format!("forum?id={}", note.id));
                entry.id = Some(note.id);
                entry.title = note.content.title.map(|t| clean_text(&t));
                entry.authors = note
                    .content
                    .authors
                    .iter()
                    .map(String::as_str)
                    .map(clean_text)
                    .filter(|a| !a.is_empty())
                    .collect();
                entry.abstract_text = note
                    .content
                    .abstract_text
                    .map(|a| clean_text(&a))
                    .filter(|a| !a.is_empty());
                entry.pdf_url = note.content.pdf.and_then(|pdf| join_url(&site, &pdf));
                entry
            })
            .collect();
        Ok(IndexStep::Papers(entries))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ctx(year: u16) -> SourceContext {
        SourceContext::new("iclr", year, "https://api.openreview.net/")
    }

    fn papers(step: IndexStep) -> Vec<PaperEntry> {
        match step {
            IndexStep::Papers(entries) => entries,
            IndexStep::Follow(_) => panic!("expected papers"),
        }
    }

    const NOTES: &str = r#"{"notes": [
        {"id": "rJx1", "number": 12, "invitation": "ICLR.cc/2020/Conference/-/Blind_Submission",
         "content": {"title": "Deep  Things", "authors": ["Ada Lovelace", " Alan Turing "],
                     "abstract": "We go deep.", "pdf": "/pdf/abc123.pdf"},
         "details": {"directReplies": [
            {"id": "c1", "invitation": "ICLR.cc/2020/Conference/Paper12/-/Official_Comment",
             "content": {"comment": "nice"}},
            {"id": "d1", "invitation": "ICLR.cc/2020/Conference/Paper12/-/Decision",
             "content": {"decision": "Accept (Poster)"}}]}},
        {"id": "rJx2", "invitation": "ICLR.cc/2020/Conference/-/Blind_Submission",
         "content": {"title": "Shallow Things"},
         "details": {"directReplies": [
            {"id": "d2", "invitation": "ICLR.cc/2020/Conference/Paper13/-/Decision",
             "content": {"decision": "Reject"}}]}},
        {"id": "rJx3", "invitation": "ICLR.cc/2020/Conference/-/Blind_Submission",
         "content": {"title": "Undecided Things"}}
    ], "count": 3}"#;

    #[test]
    fn test_index_urls_page_through_submissions() {
        let urls = OpenReviewSource.index_urls(&ctx(2020)).unwrap();
        assert_eq!(urls.len(), SUBMISSION_PAGES);
        assert_eq!(
            urls[0],
            "https://api.openreview.net/notes?invitation=ICLR.cc%2F2020%2FConference%2F-%2FBlind_Submission&details=directReplies&offset=0&limit=1000"
        );
        assert!(urls[1].contains("offset=1000"));
    }

    #[test]
    fn test_index_urls_use_2017_invitation() {
        let urls = OpenReviewSource.index_urls(&ctx(2017)).unwrap();
        assert!(urls[0].contains("ICLR.cc%2F2017%2Fconference%2F-%2Fsubmission"));
    }

    #[test]
    fn test_index_urls_reject_years_outside_api_v1() {
        for year in [2016, 2024] {
            let err = OpenReviewSource.index_urls(&ctx(year)).unwrap_err();
            assert!(matches!(err, SourceError::UnsupportedYear { .. }));
        }
    }

    #[test]
    fn test_parse_index_keeps_accepted_submissions_only() {
        let entries = papers(
            OpenReviewSource
                .parse_index(NOTES, "https://api.openreview.net/notes", &ctx(2020))
                .unwrap(),
        );
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.key, "rJx1");
        assert_eq!(entry.detail_url, None);
        assert_eq!(entry.title.as_deref(), Some("Deep Things"));
        assert_eq!(entry.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(entry.abstract_text.as_deref(), Some("We go deep."));
        assert_eq!(
            entry.pdf_url.as_deref(),
            Some("https://openreview.net/pdf/abc123.pdf")
        );
        assert_eq!(
            entry.landing_url.as_deref(),
            Some("https://openreview.net/forum?id=rJx1")
        );
    }

    #[test]
    fn test_parse_index_reads_older_decision_notes() {
        let raw = r#"{"notes": [
            {"id": "a", "content": {"title": "Old Acceptance"},
             "details": {"directReplies": [
                {"invitation": "ICLR.cc/2018/Conference/-/Acceptance_Decision",
                 "content": {"decision": "Accept (Oral)"}}]}},
            {"id": "b", "content": {"title": "Meta Reviewed"},
             "details": {"directReplies": [
                {"invitation": "ICLR.cc/2019/Conference/-/Paper7/Meta_Review",
                 "content": {"recommendation": "Accept (Poster)"}}]}}
        ]}"#;
        let entries = papers(
            OpenReviewSource
                .parse_index(raw, "https://api.openreview.net/notes", &ctx(2019))
                .unwrap(),
        );
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_index_empty_page_past_the_end() {
        let entries = papers(
            OpenReviewSource
                .parse_index(r#"{"notes": [], "count": 0}"#, "https://api.openreview.net/notes", &ctx(2020))
                .unwrap(),
        );
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_index_malformed_json_is_parse_error() {
        let err = OpenReviewSource
            .parse_index("<html>busy</html>", "https://api.openreview.net/notes", &ctx(2020))
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[test]
    fn test_record_url_is_forum_page() {
        let entries = papers(
            OpenReviewSource
                .parse_index(NOTES, "https://api.openreview.net/notes", &ctx(2020))
                .unwrap(),
        );
        let record = entries[0]
            .to_record("iclr", 2020, "https://api.openreview.net/notes")
            .unwrap();
        assert_eq!(record.url, "https://openreview.net/forum?id=rJx1");
        assert_eq!(record.id.as_deref(), Some("rJx1"));
    }

    #[test]
    fn test_site_root_strips_api_prefix() {
        assert_eq!(site_root("https://api.openreview.net/"), "https://openreview.net/");
        assert_eq!(site_root("https://api2.openreview.net/"), "https://openreview.net/");
        assert_eq!(site_root("http://127.0.0.1:8080/"), "http://127.0.0.1:8080/");
    }
}
