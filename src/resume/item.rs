//! Work item types and the per-item state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Status of a work item.
///
/// ```text
/// PENDING -> FETCHING -> FETCHED -> DOWNLOADING -> DONE
///     \          \           \            \
///      +----------+-----------+------------+--> FAILED
/// ```
///
/// `FAILED` is left only by an explicit requeue on a later run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Discovered, nothing fetched yet.
    Pending,
    /// Detail page request in flight.
    Fetching,
    /// Metadata persisted; PDF not yet downloaded.
    Fetched,
    /// PDF download in flight.
    Downloading,
    /// Finished; skipped on later runs.
    Done,
    /// Last attempt failed; see `last_error`.
    Failed,
}

impl ItemStatus {
    /// All statuses, in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Fetching,
        Self::Fetched,
        Self::Downloading,
        Self::Done,
        Self::Failed,
    ];

    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
            Self::Downloading => "downloading",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true if `self -> next` is an edge of the state machine.
    ///
    /// Besides the forward path and `* -> FAILED`, this allows:
    /// - `FETCHING -> DOWNLOADING` (detail page failed, PDF URL known from the index)
    /// - `FETCHING -> PENDING` and `DOWNLOADING -> FETCHED` (crash recovery)
    /// - `FAILED -> PENDING | FETCHED` (requeue)
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ItemStatus::{Done, Downloading, Failed, Fetched, Fetching, Pending};
        matches!(
            (self, next),
            (Pending, Fetching | Failed)
                | (Fetching, Fetched | Downloading | Pending | Failed)
                | (Fetched, Downloading | Done | Failed)
                | (Downloading, Done | Fetched | Failed)
                | (Failed, Pending | Fetched)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid item status: {s}"))
    }
}

/// Identifies one work item: a paper within a (conference, year).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    /// Conference id, e.g. `icml`.
    pub conference: String,
    /// Proceedings year.
    pub year: u16,
    /// Paper key within the year (source id or detail URL).
    pub paper_key: String,
}

impl ItemKey {
    /// Creates a key.
    pub fn new(conference: impl Into<String>, year: u16, paper_key: impl Into<String>) -> Self {
        Self {
            conference: conference.into(),
            year,
            paper_key: paper_key.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.conference, self.year, self.paper_key)
    }
}

/// A row of the `work_items` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkItem {
    /// Conference id.
    pub conference: String,
    /// Proceedings year (stored as INTEGER).
    #[sqlx(rename = "year")]
    pub year_num: i64,
    /// Paper key within the year.
    pub paper_key: String,
    /// Page the item was discovered from.
    pub source_url: Option<String>,
    /// Status text, parsed via `status()`.
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Metadata has been persisted.
    pub fetched: bool,
    /// PDF is on disk.
    pub downloaded: bool,
    /// Failed runs so far.
    pub attempts: i64,
    /// Last error message.
    pub last_error: Option<String>,
    /// Last error kind (`network`, `http_client`, `parse`, `filesystem`).
    pub error_kind: Option<String>,
    /// Row creation time.
    pub created_at: String,
    /// Last update time.
    pub updated_at: String,
}

impl WorkItem {
    /// Returns the parsed status, falling back to `Pending` for unknown text.
    #[must_use]
    pub fn status(&self) -> ItemStatus {
        self.status_str.parse().unwrap_or(ItemStatus::Pending)
    }

    /// Returns the key identifying this row.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(
            self.conference.clone(),
            u16::try_from(self.year_num).unwrap_or_default(),
            self.paper_key.clone(),
        )
    }

    /// Failed runs so far, clamped to `u32`.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        u32::try_from(self.attempts).unwrap_or(u32::MAX)
    }
}
