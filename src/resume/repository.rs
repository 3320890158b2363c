//! Repository seam over resume-state persistence.
//!
//! The pipeline and the progress display depend on this trait rather than
//! on [`ResumeStore`] directly.

use async_trait::async_trait;

use super::{ItemKey, ItemStatus, Result, ResumeStore, WorkItem};

/// Data-access contract for per-item resume state.
#[async_trait]
pub trait ResumeRepository: Send + Sync {
    /// Returns the item, inserting it as pending if unknown.
    async fn ensure(&self, key: &ItemKey, source_url: Option<&str>) -> Result<WorkItem>;

    /// Loads all items of a (conference, year).
    async fn load_state(&self, conference: &str, year: u16) -> Result<Vec<WorkItem>>;

    /// `PENDING -> FETCHING`.
    async fn mark_fetching(&self, key: &ItemKey) -> Result<()>;

    /// `FETCHING -> FETCHED`.
    async fn mark_fetched(&self, key: &ItemKey) -> Result<()>;

    /// `-> DOWNLOADING`.
    async fn mark_downloading(&self, key: &ItemKey) -> Result<()>;

    /// `-> DONE`.
    async fn mark_done(&self, key: &ItemKey, downloaded: bool) -> Result<()>;

    /// `-> FAILED`, counting the attempt.
    async fn mark_failed(
        &self,
        key: &ItemKey,
        error_kind: &str,
        error: &str,
        downloaded: bool,
    ) -> Result<()>;

    /// `FAILED -> PENDING | FETCHED`.
    async fn requeue(&self, key: &ItemKey) -> Result<ItemStatus>;

    /// Rewinds interrupted items one step.
    async fn recover_in_flight(&self, conference: &str, year: u16) -> Result<u64>;

    /// Deletes all state of a (conference, year).
    async fn reset(&self, conference: &str, year: u16) -> Result<u64>;

    /// Counts items in a status.
    async fn count_by_status(&self, conference: &str, year: u16, status: ItemStatus)
    -> Result<i64>;
}

#[async_trait]
impl ResumeRepository for ResumeStore {
    async fn ensure(&self, key: &ItemKey, source_url: Option<&str>) -> Result<WorkItem> {
        ResumeStore::ensure(self, key, source_url).await
    }

    async fn load_state(&self, conference: &str, year: u16) -> Result<Vec<WorkItem>> {
        ResumeStore::load_state(self, conference, year).await
    }

    async fn mark_fetching(&self, key: &ItemKey) -> Result<()> {
        ResumeStore::mark_fetching(self, key).await
    }

    async fn mark_fetched(&self, key: &ItemKey) -> Result<()> {
        ResumeStore::mark_fetched(self, key).await
    }

    async fn mark_downloading(&self, key: &ItemKey) -> Result<()> {
        ResumeStore::mark_downloading(self, key).await
    }

    async fn mark_done(&self, key: &ItemKey, downloaded: bool) -> Result<()> {
        ResumeStore::mark_done(self, key, downloaded).await
    }

    async fn mark_failed(
        &self,
        key: &ItemKey,
        error_kind: &str,
        error: &str,
        downloaded: bool,
    ) -> Result<()> {
        ResumeStore::mark_failed(self, key, error_kind, error, downloaded).await
    }

    async fn requeue(&self, key: &ItemKey) -> Result<ItemStatus> {
        ResumeStore::requeue(self, key).await
    }

    async fn recover_in_flight(&self, conference: &str, year: u16) -> Result<u64> {
        ResumeStore::recover_in_flight(self, conference, year).await
    }

    async fn reset(&self, conference: &str, year: u16) -> Result<u64> {
        ResumeStore::reset(self, conference, year).await
    }

    async fn count_by_status(
        &self,
        conference: &str,
        year: u16,
        status: ItemStatus,
    ) -> Result<i64> {
        ResumeStore::count_by_status(self, conference, year, status).await
    }
}
