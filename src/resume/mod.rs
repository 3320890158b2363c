//! Resume state for scraped papers.
//!
//! Each paper of a (conference, year) is a work item in the `work_items`
//! table. Items move through [`ItemStatus`]; every transition is committed
//! immediately, so a crash loses at most the in-flight item.
//!
//! # Example
//!
//! ```no_run
//! use paperscrape_core::Database;
//! use paperscrape_core::resume::{ItemKey, ResumeStore};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("data/metadata/resume_state.db")).await?;
//! let store = ResumeStore::new(db);
//!
//! let key = ItemKey::new("icml", 2023, "smith23a");
//! store.ensure(&key, Some("https://proceedings.mlr.press/v202/smith23a.html")).await?;
//! store.mark_fetching(&key).await?;
//! store.mark_fetched(&key).await?;
//! store.mark_done(&key, false).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod item;
mod repository;

pub use error::{ResumeDbErrorKind, ResumeError};
pub use item::{ItemKey, ItemStatus, WorkItem};
pub use repository::ResumeRepository;

use tracing::{debug, instrument};

use crate::db::Database;

/// Result type for resume operations.
pub type Result<T> = std::result::Result<T, ResumeError>;

/// `SQLite`-backed resume state.
#[derive(Debug, Clone)]
pub struct ResumeStore {
    db: Database,
}

impl ResumeStore {
    /// Creates a store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the item for `key`, inserting a `PENDING` row if none exists.
    ///
    /// An existing row keeps its status; only a missing `source_url` is filled in.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::Database`] if a query fails.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn ensure(&self, key: &ItemKey, source_url: Option<&str>) -> Result<WorkItem> {
        sqlx::query(
            r"INSERT INTO work_items (conference, year, paper_key, source_url, status)
              VALUES (?, ?, ?, ?, ?)
              ON CONFLICT (conference, year, paper_key)
              DO UPDATE SET source_url = COALESCE(work_items.source_url, excluded.source_url)",
        )
        .bind(&key.conference)
        .bind(i64::from(key.year))
        .bind(&key.paper_key)
        .bind(source_url)
        .bind(ItemStatus::Pending.as_str())
        .execute(self.db.pool())
        .await?;

        self.get(key)
            .await?
            .ok_or_else(|| ResumeError::ItemNotFound(key.to_string()))
    }

    /// Gets a single item.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::Database`] if the query fails.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get(&self, key: &ItemKey) -> Result<Option<WorkItem>> {
        let item = sqlx::query_as::<_, WorkItem>(
            r"SELECT * FROM work_items WHERE conference = ? AND year = ? AND paper_key = ?",
        )
        .bind(&key.conference)
        .bind(i64::from(key.year))
        .bind(&key.paper_key)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(item)
    }

    /// Loads every item of a (conference, year), oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn load_state(&self, conference: &str, year: u16) -> Result<Vec<WorkItem>> {
        let items = sqlx::query_as::<_, WorkItem>(
            r"SELECT * FROM work_items
              WHERE conference = ? AND year = ?
              ORDER BY created_at ASC, paper_key ASC",
        )
        .bind(conference)
        .bind(i64::from(year))
        .fetch_all(self.db.pool())
        .await?;

        Ok(items)
    }

    /// `PENDING -> FETCHING`.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::ItemNotFound`], [`ResumeError::InvalidTransition`]
    /// or [`ResumeError::Database`].
    pub async fn mark_fetching(&self, key: &ItemKey) -> Result<()> {
        let from = self.guard(key, ItemStatus::Fetching).await?;
        self.set_status(key, from, ItemStatus::Fetching).await
    }

    /// `FETCHING -> FETCHED`, recording that metadata is persisted.
    ///
    /// # Errors
    ///
    /// Same as [`ResumeStore::mark_fetching`].
    #[instrument(skip(self), fields(key = %key))]
    pub async fn mark_fetched(&self, key: &ItemKey) -> Result<()> {
        let from = self.guard(key, ItemStatus::Fetched).await?;
        let result = sqlx::query(
            r"UPDATE work_items
              SET status = ?, fetched = 1, updated_at = datetime('now')
              WHERE conference = ? AND year = ? AND paper_key = ? AND status = ?",
        )
        .bind(ItemStatus::Fetched.as_str())
        .bind(&key.conference)
        .bind(i64::from(key.year))
        .bind(&key.paper_key)
        .bind(from.as_str())
        .execute(self.db.pool())
        .await?;

        check_affected(key, result.rows_affected())
    }

    /// `FETCHED -> DOWNLOADING` (or `FETCHING -> DOWNLOADING` when only the
    /// index entry is known).
    ///
    /// # Errors
    ///
    /// Same as [`ResumeStore::mark_fetching`].
    pub async fn mark_downloading(&self, key: &ItemKey) -> Result<()> {
        let from = self.guard(key, ItemStatus::Downloading).await?;
        self.set_status(key, from, ItemStatus::Downloading).await
    }

    /// `FETCHED | DOWNLOADING -> DONE`.
    ///
    /// # Errors
    ///
    /// Same as [`ResumeStore::mark_fetching`].
    #[instrument(skip(self), fields(key = %key))]
    pub async fn mark_done(&self, key: &ItemKey, downloaded: bool) -> Result<()> {
        let from = self.guard(key, ItemStatus::Done).await?;
        let result = sqlx::query(
            r"UPDATE work_items
              SET status = ?, downloaded = ?, last_error = NULL, error_kind = NULL,
                  updated_at = datetime('now')
              WHERE conference = ? AND year = ? AND paper_key = ? AND status = ?",
        )
        .bind(ItemStatus::Done.as_str())
        .bind(downloaded)
        .bind(&key.conference)
        .bind(i64::from(key.year))
        .bind(&key.paper_key)
        .bind(from.as_str())
        .execute(self.db.pool())
        .await?;

        check_affected(key, result.rows_affected())
    }

    /// Moves the item to `FAILED`, recording the error and counting the attempt.
    ///
    /// `downloaded` records a PDF that made it to disk before the failure.
    ///
    /// # Errors
    ///
    /// Same as [`ResumeStore::mark_fetching`].
    #[instrument(skip(self, error), fields(key = %key, error_kind))]
    pub async fn mark_failed(
        &self,
        key: &ItemKey,
        error_kind: &str,
        error: &str,
        downloaded: bool,
    ) -> Result<()> {
        let from = self.guard(key, ItemStatus::Failed).await?;
        let result = sqlx::query(
            r"UPDATE work_items
              SET status = ?, attempts = attempts + 1, last_error = ?, error_kind = ?,
                  downloaded = MAX(downloaded, ?), updated_at = datetime('now')
              WHERE conference = ? AND year = ? AND paper_key = ? AND status = ?",
        )
        .bind(ItemStatus::Failed.as_str())
        .bind(error)
        .bind(error_kind)
        .bind(downloaded)
        .bind(&key.conference)
        .bind(i64::from(key.year))
        .bind(&key.paper_key)
        .bind(from.as_str())
        .execute(self.db.pool())
        .await?;

        check_affected(key, result.rows_affected())
    }

    /// Puts a `FAILED` item back in line: `FETCHED` when its metadata was
    /// already persisted, `PENDING` otherwise. Returns the new status.
    ///
    /// # Errors
    ///
    /// Same as [`ResumeStore::mark_fetching`].
    #[instrument(skip(self), fields(key = %key))]
    pub async fn requeue(&self, key: &ItemKey) -> Result<ItemStatus> {
        let item = self
            .get(key)
            .await?
            .ok_or_else(|| ResumeError::ItemNotFound(key.to_string()))?;
        let to = if item.fetched {
            ItemStatus::Fetched
        } else {
            ItemStatus::Pending
        };
        let from = item.status();
        if !from.can_transition_to(to) {
            return Err(ResumeError::InvalidTransition {
                key: key.to_string(),
                from,
                to,
            });
        }
        self.set_status(key, from, to).await?;
        Ok(to)
    }

    /// Crash recovery: `FETCHING -> PENDING` and `DOWNLOADING -> FETCHED`.
    ///
    /// Returns the number of items reset.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::Database`] if an update fails.
    #[instrument(skip(self))]
    pub async fn recover_in_flight(&self, conference: &str, year: u16) -> Result<u64> {
        let mut recovered = 0;
        for (from, to) in [
            (ItemStatus::Fetching, ItemStatus::Pending),
            (ItemStatus::Downloading, ItemStatus::Fetched),
        ] {
            let result = sqlx::query(
                r"UPDATE work_items
                  SET status = ?, updated_at = datetime('now')
                  WHERE conference = ? AND year = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(conference)
            .bind(i64::from(year))
            .bind(from.as_str())
            .execute(self.db.pool())
            .await?;
            recovered += result.rows_affected();
        }

        if recovered > 0 {
            debug!(recovered, "reset interrupted work items");
        }
        Ok(recovered)
    }

    /// Deletes all state for a (conference, year). Returns rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn reset(&self, conference: &str, year: u16) -> Result<u64> {
        let result = sqlx::query(r"DELETE FROM work_items WHERE conference = ? AND year = ?")
            .bind(conference)
            .bind(i64::from(year))
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts items of a (conference, year) in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_by_status(
        &self,
        conference: &str,
        year: u16,
        status: ItemStatus,
    ) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r"SELECT COUNT(*) FROM work_items WHERE conference = ? AND year = ? AND status = ?",
        )
        .bind(conference)
        .bind(i64::from(year))
        .bind(status.as_str())
        .fetch_one(self.db.pool())
        .await?;

        Ok(count.0)
    }

    /// Checks that `key` exists and may move to `to`; returns its current status.
    async fn guard(&self, key: &ItemKey, to: ItemStatus) -> Result<ItemStatus> {
        let item = self
            .get(key)
            .await?
            .ok_or_else(|| ResumeError::ItemNotFound(key.to_string()))?;
        let from = item.status();
        if from.can_transition_to(to) {
            Ok(from)
        } else {
            Err(ResumeError::InvalidTransition {
                key: key.to_string(),
                from,
                to,
            })
        }
    }

    #[instrument(skip(self), fields(key = %key, %from, %to))]
    async fn set_status(&self, key: &ItemKey, from: ItemStatus, to: ItemStatus) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE work_items
              SET status = ?, updated_at = datetime('now')
              WHERE conference = ? AND year = ? AND paper_key = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(&key.conference)
        .bind(i64::from(key.year))
        .bind(&key.paper_key)
        .bind(from.as_str())
        .execute(self.db.pool())
        .await?;

        check_affected(key, result.rows_affected())
    }
}

/// Returns `Ok(())` if a row changed; otherwise [`ResumeError::ItemNotFound`].
fn check_affected(key: &ItemKey, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(ResumeError::ItemNotFound(key.to_string()))
    } else {
        Ok(())
    }
}
