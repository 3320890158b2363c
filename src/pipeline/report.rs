//! Per-year and per-job outcome reports.

use std::fmt;

/// Category of a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemErrorKind {
    /// Connection problems, timeouts, 5xx and 429 responses.
    Network,
    /// Non-retryable 4xx responses such as 403 or 404.
    HttpClient,
    /// The page did not have the structure the source expects.
    Parse,
    /// Writing metadata or a PDF to disk failed.
    Filesystem,
}

impl ItemErrorKind {
    /// Lowercase name stored in the resume database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::HttpClient => "http_client",
            Self::Parse => "parse",
            Self::Filesystem => "filesystem",
        }
    }

    /// Network errors may clear up on their own; the others need a change
    /// on the server or on disk.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }
}

impl fmt::Display for ItemErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item that ended this run in `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Work-item key.
    pub key: String,
    /// Failure category.
    pub kind: ItemErrorKind,
    /// Error message as recorded in the resume database.
    pub message: String,
}

/// Outcome of one (conference, year).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearReport {
    /// Conference id.
    pub conference: String,
    /// Proceedings year.
    pub year: u16,
    /// Entries found on the index page(s).
    pub discovered: usize,
    /// Items that reached `DONE` in this run.
    pub completed: usize,
    /// Items left in `FETCHED` because PDFs were disabled.
    pub metadata_only: usize,
    /// Items skipped: already `DONE`, or out of retry budget.
    pub skipped: usize,
    /// Items that failed in this run.
    pub failed: usize,
    /// Details for each failed item.
    pub failures: Vec<ItemFailure>,
    /// Set when the year could not be processed at all.
    pub year_error: Option<String>,
}

impl YearReport {
    /// Creates an empty report.
    pub fn new(conference: impl Into<String>, year: u16) -> Self {
        Self {
            conference: conference.into(),
            year,
            ..Self::default()
        }
    }

    /// Records a failed item.
    pub fn record_failure(&mut self, failure: ItemFailure) {
        self.failed += 1;
        self.failures.push(failure);
    }

    /// Items that ended this run in a good state.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.completed + self.metadata_only + self.skipped
    }

    /// True when the year ran and nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.year_error.is_none() && self.failed == 0
    }
}

/// Outcome of a whole job, one [`YearReport`] per requested year.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    /// Conference id.
    pub conference: String,
    /// Reports in the order the years were run.
    pub years: Vec<YearReport>,
}

impl JobReport {
    /// Creates an empty report.
    pub fn new(conference: impl Into<String>) -> Self {
        Self {
            conference: conference.into(),
            years: Vec::new(),
        }
    }

    /// Sum of [`YearReport::succeeded`] over all years.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.years.iter().map(YearReport::succeeded).sum()
    }

    /// Sum of [`YearReport::completed`] over all years.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.years.iter().map(|y| y.completed).sum()
    }

    /// Failed items plus years that could not be processed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.years
            .iter()
            .map(|y| y.failed + usize::from(y.year_error.is_some()))
            .sum()
    }

    /// True when every year ran and no item failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.years.iter().all(YearReport::is_clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_kind_strings() {
        assert_eq!(ItemErrorKind::HttpClient.as_str(), "http_client");
        assert_eq!(ItemErrorKind::Filesystem.to_string(), "filesystem");
        assert!(ItemErrorKind::Network.is_retryable());
        assert!(!ItemErrorKind::Parse.is_retryable());
    }

    #[test]
    fn test_job_report_totals() {
        let mut first = YearReport::new("icml", 2022);
        first.completed = 3;
        first.skipped = 2;
        first.record_failure(ItemFailure {
            key: "a".to_string(),
            kind: ItemErrorKind::HttpClient,
            message: "HTTP 404".to_string(),
        });
        let mut second = YearReport::new("icml", 2023);
        second.year_error = Some("index unreachable".to_string());

        let job = JobReport {
            conference: "icml".to_string(),
            years: vec![first, second],
        };
        assert_eq!(job.succeeded(), 5);
        assert_eq!(job.completed(), 3);
        assert_eq!(job.failed(), 2);
        assert!(!job.is_clean());
    }

    #[test]
    fn test_empty_year_is_clean() {
        assert!(YearReport::new("jmlr", 2020).is_clean());
        assert!(JobReport::new("jmlr").is_clean());
    }
}
