//! Resumable fetch-and-persist pipeline.
//!
//! For each (conference, year) of a [`JobSpec`] the pipeline:
//!
//! 1. rewinds items a crashed run left in flight (or wipes the state when
//!    `force_fresh` is set)
//! 2. fetches the source's index page(s), following at most
//!    [`MAX_FOLLOW_DEPTH`] redirections to the real listing
//! 3. walks every entry through the resume state machine, fetching the
//!    detail page, persisting metadata and downloading the PDF
//!
//! Metadata and resume state are flushed after every item, so an interrupted
//! run loses at most the item in flight. Item failures are recorded and the
//! batch moves on; only setup problems (unknown conference, unreachable
//! index, database errors) end a year early, and even those are reported in
//! the [`YearReport`] rather than returned.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use paperscrape_core::config::AppConfig;
//! use paperscrape_core::pipeline::{JobSpec, Pipeline};
//! use paperscrape_core::resume::ResumeStore;
//! use paperscrape_core::sources::build_default_source_registry;
//! use paperscrape_core::Database;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! let db = Database::new(&config.resume_db_path()).await?;
//! let resume = Arc::new(ResumeStore::new(db));
//! let pipeline = Pipeline::new(config, build_default_source_registry(), resume);
//!
//! let report = pipeline.run_job(&JobSpec::new("icml", vec![2023])).await?;
//! println!("{} done, {} failed", report.completed(), report.failed());
//! # Ok(())
//! # }
//! ```

mod error;
mod report;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::config::{AppConfig, ConferenceSettings};
use crate::fetch::{FetchError, Fetcher};
use crate::metadata::{MetadataError, MetadataStore};
use crate::paper::{PaperEntry, PaperRecord};
use crate::resume::{ItemKey, ItemStatus, ResumeError, ResumeRepository, WorkItem};
use crate::sources::{IndexStep, Source, SourceContext, SourceError, SourceRegistry};

use error::ItemError;
pub use error::PipelineError;
pub use report::{ItemErrorKind, ItemFailure, JobReport, YearReport};

/// Maximum number of `Follow` hops from an index URL to a listing page.
pub const MAX_FOLLOW_DEPTH: usize = 2;

/// What to scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Conference id (case-insensitive).
    pub conference: String,
    /// Years to process, in order.
    pub years: Vec<u16>,
    /// Stop after metadata; items stay `FETCHED`.
    pub skip_pdfs: bool,
    /// Forget resume state and back up existing metadata first.
    pub force_fresh: bool,
}

impl JobSpec {
    /// Creates a job with PDFs enabled and resume on.
    pub fn new(conference: impl Into<String>, years: Vec<u16>) -> Self {
        Self {
            conference: conference.into(),
            years,
            skip_pdfs: false,
            force_fresh: false,
        }
    }
}

/// An index entry and the page it was listed on.
#[derive(Debug)]
struct Discovered {
    entry: PaperEntry,
    page_url: String,
}

enum ItemOutcome {
    Completed,
    MetadataOnly,
    Skipped,
    Failed(ItemFailure),
}

/// State for one (conference, year) while its items are processed.
struct YearRun<'a> {
    conference: &'a str,
    year: u16,
    source: &'a dyn Source,
    fetcher: &'a Fetcher,
    ctx: SourceContext,
    papers_dir: PathBuf,
    metadata: MetadataStore,
    skip_pdfs: bool,
}

impl YearRun<'_> {
    /// Builds the record for `found`, fetching the detail page when there is one.
    async fn fetch_record(&self, found: &Discovered) -> Result<PaperRecord, ItemError> {
        let entry = &found.entry;
        let mut record = match &entry.detail_url {
            Some(url) => {
                let raw = self.fetcher.fetch_text(url).await?;
                self.source.parse_paper(&raw, entry, &self.ctx)?
            }
            None => entry
                .to_record(self.conference, self.year, &found.page_url)
                .ok_or_else(|| SourceError::parse(&found.page_url, "index entry has no title"))?,
        };
        record.status = ItemStatus::Fetched;
        Ok(record)
    }

    async fn store(&mut self, record: PaperRecord) -> Result<(), MetadataError> {
        self.metadata.upsert(record);
        self.metadata.flush().await
    }

    /// Record used to name a PDF saved before the detail page could be parsed.
    fn provisional_record(&self, found: &Discovered) -> PaperRecord {
        let entry = &found.entry;
        let mut record = PaperRecord::new(
            self.conference,
            self.year,
            entry.title.clone().unwrap_or_default(),
            entry.detail_url.as_deref().unwrap_or(&found.page_url),
        );
        record.id.clone_from(&entry.id);
        record
    }

    /// Moves a PDF saved under the provisional name to `dest`, the name built
    /// from the detail page. A leftover provisional copy is removed.
    async fn adopt_provisional_pdf(&self, found: &Discovered, dest: &Path) {
        let provisional = self.papers_dir.join(self.provisional_record(found).pdf_filename());
        if provisional == dest || !tokio::fs::try_exists(&provisional).await.unwrap_or(false) {
            return;
        }
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_file(&provisional).await {
                warn!(path = %provisional.display(), error = %e, "could not remove duplicate PDF");
            }
            return;
        }
        match tokio::fs::rename(&provisional, dest).await {
            Ok(()) => debug!(from = %provisional.display(), to = %dest.display(), "renamed provisional PDF"),
            Err(e) => warn!(path = %provisional.display(), error = %e, "could not rename provisional PDF"),
        }
    }
}

/// Runs [`JobSpec`]s against a source registry and a resume store.
pub struct Pipeline {
    config: AppConfig,
    registry: SourceRegistry,
    resume: Arc<dyn ResumeRepository>,
    fetchers: HashMap<String, Fetcher>,
}

impl Pipeline {
    /// Creates a pipeline. Fetchers are built per conference from `config`.
    pub fn new(
        config: AppConfig,
        registry: SourceRegistry,
        resume: Arc<dyn ResumeRepository>,
    ) -> Self {
        Self {
            config,
            registry,
            resume,
            fetchers: HashMap::new(),
        }
    }

    /// Uses `fetcher` for `conference` instead of building one from settings.
    #[must_use]
    pub fn with_fetcher(mut self, conference: &str, fetcher: Fetcher) -> Self {
        self.fetchers
            .insert(conference.to_ascii_lowercase(), fetcher);
        self
    }

    /// Run-wide configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registered sources.
    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Runs every year of `job` in order, pausing between years.
    ///
    /// A failing year is recorded in its [`YearReport`] and the next year
    /// still runs.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only when the job cannot start: unknown
    /// conference, missing settings or an HTTP client that cannot be built.
    #[instrument(skip(self, job), fields(conference = %job.conference, years = ?job.years))]
    pub async fn run_job(&self, job: &JobSpec) -> Result<JobReport, PipelineError> {
        let conference = job.conference.to_ascii_lowercase();
        let settings = self.settings_for(&conference)?;
        let fetcher = self.fetcher_for(&conference, settings)?;

        let mut report = JobReport::new(&conference);
        for (index, &year) in job.years.iter().enumerate() {
            if index > 0 && !self.config.year_pause.is_zero() {
                debug!(pause_ms = self.config.year_pause.as_millis(), "pausing between years");
                tokio::time::sleep(self.config.year_pause).await;
            }
            let year_report = self
                .execute_year(&conference, settings, &fetcher, year, job)
                .await;
            report.years.push(year_report);
        }

        info!(
            completed = report.completed(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            retries = fetcher.retries(),
            "job finished"
        );
        Ok(report)
    }

    /// Runs a single year of `job`.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::run_job`].
    pub async fn run_year(&self, job: &JobSpec, year: u16) -> Result<YearReport, PipelineError> {
        let conference = job.conference.to_ascii_lowercase();
        let settings = self.settings_for(&conference)?;
        let fetcher = self.fetcher_for(&conference, settings)?;
        Ok(self
            .execute_year(&conference, settings, &fetcher, year, job)
            .await)
    }

    fn settings_for(&self, conference: &str) -> Result<&ConferenceSettings, PipelineError> {
        if !self.registry.contains(conference) {
            return Err(SourceError::UnknownConference {
                name: conference.to_string(),
                available: self
                    .registry
                    .conferences()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            }
            .into());
        }
        self.config
            .conference(conference)
            .ok_or_else(|| PipelineError::MissingSettings(conference.to_string()))
    }

    fn fetcher_for(
        &self,
        conference: &str,
        settings: &ConferenceSettings,
    ) -> Result<Fetcher, FetchError> {
        if let Some(fetcher) = self.fetchers.get(conference) {
            return Ok(fetcher.clone());
        }
        Fetcher::new(settings.fetch_config(&self.config.user_agent))
    }

    #[instrument(skip_all, fields(conference = %conference, year = year))]
    async fn execute_year(
        &self,
        conference: &str,
        settings: &ConferenceSettings,
        fetcher: &Fetcher,
        year: u16,
        job: &JobSpec,
    ) -> YearReport {
        let mut report = YearReport::new(conference, year);
        if let Err(e) = self
            .try_execute_year(conference, settings, fetcher, year, job, &mut report)
            .await
        {
            error!(error = %e, "year aborted");
            report.year_error = Some(e.to_string());
        }

        info!(
            discovered = report.discovered,
            completed = report.completed,
            metadata_only = report.metadata_only,
            skipped = report.skipped,
            failed = report.failed,
            "year finished"
        );
        report
    }

    async fn try_execute_year(
        &self,
        conference: &str,
        settings: &ConferenceSettings,
        fetcher: &Fetcher,
        year: u16,
        job: &JobSpec,
        report: &mut YearReport,
    ) -> Result<(), PipelineError> {
        if !settings.supports_year(year) {
            warn!(name = %settings.name, "year is not in the configured list, trying anyway");
        }
        let source = self.registry.source_for(conference, year)?;
        let ctx = SourceContext::new(conference, year, settings.base_url.as_str());
        let metadata_path = self.config.metadata_file(conference, year);

        if job.force_fresh {
            let removed = self.resume.reset(conference, year).await?;
            MetadataStore::backup(&metadata_path).await?;
            info!(removed, "starting fresh");
        } else {
            let recovered = self.resume.recover_in_flight(conference, year).await?;
            if recovered > 0 {
                info!(recovered, "resuming items interrupted by a previous run");
            }
        }

        let metadata = open_metadata(&metadata_path).await?;
        let mut state: HashMap<String, WorkItem> = self
            .resume
            .load_state(conference, year)
            .await?
            .into_iter()
            .map(|item| (item.paper_key.clone(), item))
            .collect();
        debug!(known_items = state.len(), papers = metadata.len(), "loaded resume state");

        let discovered = discover(source, fetcher, &ctx).await?;
        report.discovered = discovered.len();
        info!(source = source.name(), papers = discovered.len(), "discovered papers");

        let mut run = YearRun {
            conference,
            year,
            source,
            fetcher,
            ctx,
            papers_dir: self.config.papers_year_dir(conference, year),
            metadata,
            skip_pdfs: job.skip_pdfs,
        };

        for found in &discovered {
            match self.process_item(&mut run, &mut state, found).await? {
                ItemOutcome::Completed => report.completed += 1,
                ItemOutcome::MetadataOnly => report.metadata_only += 1,
                ItemOutcome::Skipped => report.skipped += 1,
                ItemOutcome::Failed(failure) => report.record_failure(failure),
            }
        }
        Ok(())
    }

    /// Moves one entry as far along the state machine as this run allows.
    async fn process_item(
        &self,
        run: &mut YearRun<'_>,
        state: &mut HashMap<String, WorkItem>,
        found: &Discovered,
    ) -> Result<ItemOutcome, ResumeError> {
        let entry = &found.entry;
        let key = ItemKey::new(run.conference, run.year, entry.key.as_str());
        let item = match state.remove(&entry.key) {
            Some(item) => item,
            None => {
                self.resume
                    .ensure(&key, entry.detail_url.as_deref())
                    .await?
            }
        };

        let pdf_on_disk = item.downloaded;
        let mut status = item.status();
        match status {
            ItemStatus::Done => {
                debug!(key = %key, "already done");
                return Ok(ItemOutcome::Skipped);
            }
            ItemStatus::Failed => {
                if item.attempts() >= self.config.item_retry_budget {
                    warn!(
                        key = %key,
                        attempts = item.attempts(),
                        last_error = item.last_error.as_deref().unwrap_or_default(),
                        "retry budget exhausted, skipping"
                    );
                    return Ok(ItemOutcome::Skipped);
                }
                status = self.resume.requeue(&key).await?;
                debug!(key = %key, resumed_as = %status, "retrying failed item");
            }
            _ => {}
        }

        let mut record = if status == ItemStatus::Pending {
            self.resume.mark_fetching(&key).await?;
            let fetched = match run.fetch_record(found).await {
                Ok(record) => record,
                Err(err) => return self.fetch_failed(run, found, &key, err).await,
            };
            if let Err(e) = run.store(fetched.clone()).await {
                return self.fail(&key, &ItemError::from(e), false).await;
            }
            self.resume.mark_fetched(&key).await?;
            fetched
        } else if let Some(record) = run.metadata.find_by_key(&entry.key) {
            record.clone()
        } else {
            // The resume state says FETCHED but the metadata file lost the record.
            debug!(key = %key, "rebuilding missing metadata record");
            let rebuilt = match run.fetch_record(found).await {
                Ok(record) => record,
                Err(err) => return self.fail(&key, &err, false).await,
            };
            if let Err(e) = run.store(rebuilt.clone()).await {
                return self.fail(&key, &ItemError::from(e), false).await;
            }
            rebuilt
        };

        if run.skip_pdfs {
            return Ok(ItemOutcome::MetadataOnly);
        }

        let Some(pdf_url) = record.pdf_url.clone() else {
            debug!(key = %key, "no PDF link");
            record.status = ItemStatus::Done;
            if let Err(e) = run.store(record).await {
                return self.fail(&key, &ItemError::from(e), false).await;
            }
            self.resume.mark_done(&key, false).await?;
            return Ok(ItemOutcome::Completed);
        };

        self.resume.mark_downloading(&key).await?;
        let dest = run.papers_dir.join(record.pdf_filename());
        if pdf_on_disk {
            run.adopt_provisional_pdf(found, &dest).await;
        }
        match run.fetcher.download_to_file(&pdf_url, &dest).await {
            Ok(outcome) => {
                record.local_path = Some(outcome.path().display().to_string());
                record.status = ItemStatus::Done;
                if let Err(e) = run.store(record).await {
                    return self.fail(&key, &ItemError::from(e), true).await;
                }
                self.resume.mark_done(&key, true).await?;
                Ok(ItemOutcome::Completed)
            }
            Err(e) => {
                let err = ItemError::from(e);
                record.status = ItemStatus::Failed;
                if let Err(store_err) = run.store(record).await {
                    warn!(key = %key, error = %store_err, "could not record failed download in metadata");
                }
                self.fail(&key, &err, false).await
            }
        }
    }

    /// Detail page failed. If the index already gave a PDF link, the PDF is
    /// still downloaded before the item is marked failed.
    async fn fetch_failed(
        &self,
        run: &YearRun<'_>,
        found: &Discovered,
        key: &ItemKey,
        err: ItemError,
    ) -> Result<ItemOutcome, ResumeError> {
        let pdf_url = found.entry.pdf_url.as_deref().filter(|_| !run.skip_pdfs);
        let Some(pdf_url) = pdf_url else {
            return self.fail(key, &err, false).await;
        };

        self.resume.mark_downloading(key).await?;
        let dest = run.papers_dir.join(run.provisional_record(found).pdf_filename());
        let downloaded = match run.fetcher.download_to_file(pdf_url, &dest).await {
            Ok(_) => {
                info!(key = %key, path = %dest.display(), "saved PDF despite metadata failure");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "PDF download failed too");
                false
            }
        };
        self.fail(key, &err, downloaded).await
    }

    async fn fail(
        &self,
        key: &ItemKey,
        error: &ItemError,
        downloaded: bool,
    ) -> Result<ItemOutcome, ResumeError> {
        let kind = error.kind();
        let message = error.to_string();
        warn!(
            key = %key,
            kind = %kind,
            retryable = kind.is_retryable(),
            error = %message,
            "item failed"
        );
        self.resume
            .mark_failed(key, kind.as_str(), &message, downloaded)
            .await?;
        Ok(ItemOutcome::Failed(ItemFailure {
            key: key.paper_key.clone(),
            kind,
            message,
        }))
    }
}

/// Opens the metadata file. A malformed file is moved aside and replaced by
/// an empty store.
async fn open_metadata(path: &Path) -> Result<MetadataStore, PipelineError> {
    match MetadataStore::open(path).await {
        Ok(store) => Ok(store),
        Err(MetadataError::Parse { source, .. }) => {
            warn!(path = %path.display(), error = %source, "metadata file is malformed, starting empty");
            MetadataStore::backup(path).await?;
            Ok(MetadataStore::empty(path))
        }
        Err(e) => Err(e.into()),
    }
}

/// Fetches and parses index pages until the source yields papers.
///
/// Entries are deduplicated by key across pages. A failing page is logged
/// and skipped; the last error is returned only if no page produced papers.
async fn discover(
    source: &dyn Source,
    fetcher: &Fetcher,
    ctx: &SourceContext,
) -> Result<Vec<Discovered>, PipelineError> {
    let mut queue: VecDeque<(String, usize)> = source
        .index_urls(ctx)?
        .into_iter()
        .map(|url| (url, 0))
        .collect();
    let mut visited = HashSet::new();
    let mut seen_keys = HashSet::new();
    let mut found = Vec::new();
    let mut last_error: Option<PipelineError> = None;

    while let Some((url, depth)) = queue.pop_front() {
        if !visited.insert(url.clone()) {
            continue;
        }
        let step = match fetcher.fetch_text(&url).await {
            Ok(raw) => source
                .parse_index(&raw, &url, ctx)
                .map_err(PipelineError::from),
            Err(e) => Err(e.into()),
        };

        match step {
            Ok(IndexStep::Papers(entries)) => {
                debug!(page = %url, count = entries.len(), "parsed index page");
                for entry in entries {
                    if seen_keys.insert(entry.key.clone()) {
                        found.push(Discovered {
                            entry,
                            page_url: url.clone(),
                        });
                    }
                }
            }
            Ok(IndexStep::Follow(next)) => {
                if depth >= MAX_FOLLOW_DEPTH {
                    warn!(page = %url, "too many index redirections");
                    last_error = Some(SourceError::parse(&url, "too many index redirections").into());
                    continue;
                }
                debug!(page = %url, next = ?next, "following index page");
                queue.extend(next.into_iter().map(|next_url| (next_url, depth + 1)));
            }
            Err(e) => {
                warn!(page = %url, error = %e, "index page failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if found.is_empty() => Err(e),
        _ => Ok(found),
    }
}
