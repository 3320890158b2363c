//! Application and per-conference configuration.
//!
//! Configuration is an explicit value passed down through the pipeline:
//! [`AppConfig`] owns the data root, the run-wide knobs and a table of
//! [`ConferenceSettings`], each of which derives the [`FetchConfig`] used for
//! that conference's HTTP traffic.
//!
//! Built-in conference settings can be overridden from a TOML file:
//!
//! ```toml
//! item_retry_budget = 5
//!
//! [conferences.neurips]
//! request_delay = 0.5
//!
//! [conferences.iccv]
//! name = "ICCV"
//! base_url = "https://openaccess.thecvf.com/"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::fetch::FetchConfig;
use crate::user_agent;

/// Environment variable naming the data root directory.
pub const DATA_ROOT_ENV: &str = "SCRAPER_DATA_ROOT";

/// Data root used when neither the environment nor a config file sets one.
pub const DEFAULT_DATA_ROOT: &str = "./data";

/// Default log file name, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "scraper.log";

/// Default number of failed runs after which a FAILED item is no longer retried.
pub const DEFAULT_ITEM_RETRY_BUDGET: u32 = 3;

/// Default pause between consecutive years of one job.
pub const DEFAULT_YEAR_PAUSE: Duration = Duration::from_secs(2);

const DEFAULT_REQUEST_DELAY_SECS: f64 = 1.0;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RATE_LIMIT_DELAY_SECS: u64 = 60;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for the expected schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value failed validation.
    #[error("invalid configuration for {field}: {reason}")]
    Invalid {
        /// Dotted name of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Settings for one conference.
#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceSettings {
    /// Display name (e.g. "NeurIPS").
    pub name: String,
    /// Root URL of the proceedings site, always ending in `/`.
    pub base_url: String,
    /// Minimum delay between requests to the same domain.
    pub request_delay: Duration,
    /// Retries per request for transient failures.
    pub retry_attempts: u32,
    /// Total request timeout.
    pub timeout: Duration,
    /// Domain block applied after HTTP 429 when the server gives no Retry-After.
    pub rate_limit_delay: Duration,
    /// Years the proceedings site is known to carry, if restricted.
    pub years: Option<Vec<u16>>,
}

impl ConferenceSettings {
    /// Creates settings with default timing for the given site.
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: normalize_base_url(&base_url.into()),
            request_delay: Duration::from_secs_f64(DEFAULT_REQUEST_DELAY_SECS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            rate_limit_delay: Duration::from_secs(DEFAULT_RATE_LIMIT_DELAY_SECS),
            years: None,
        }
    }

    fn with_timing(mut self, delay_secs: f64, retries: u32, timeout_secs: u64, rate_limit_secs: u64) -> Self {
        self.request_delay = Duration::from_secs_f64(delay_secs);
        self.retry_attempts = retries;
        self.timeout = Duration::from_secs(timeout_secs);
        self.rate_limit_delay = Duration::from_secs(rate_limit_secs);
        self
    }

    fn with_years(mut self, years: impl IntoIterator<Item = u16>) -> Self {
        self.years = Some(years.into_iter().collect());
        self
    }

    /// Returns true when `year` is within the known year list (or no list is set).
    #[must_use]
    pub fn supports_year(&self, year: u16) -> bool {
        self.years.as_ref().is_none_or(|years| years.contains(&year))
    }

    /// Builds the fetcher configuration for this conference.
    #[must_use]
    pub fn fetch_config(&self, user_agent: &str) -> FetchConfig {
        FetchConfig {
            timeout: self.timeout,
            max_retries: self.retry_attempts,
            per_domain_delay: self.request_delay,
            rate_limit_delay: self.rate_limit_delay,
            user_agent: user_agent.to_string(),
            ..FetchConfig::default()
        }
    }
}

/// Ensures the base URL has a scheme and a trailing slash so relative joins work.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    if with_scheme.ends_with('/') {
        with_scheme
    } else {
        format!("{with_scheme}/")
    }
}

/// Built-in conference table.
#[must_use]
pub fn builtin_conferences() -> BTreeMap<String, ConferenceSettings> {
    let pmlr = "https://proceedings.mlr.press/";
    let cvf = "https://openaccess.thecvf.com/";
    let entries = [
        (
            "neurips",
            ConferenceSettings::new("NeurIPS", "https://papers.nips.cc/").with_timing(0.1, 3, 30, 60),
        ),
        ("icml", ConferenceSettings::new("ICML", pmlr).with_timing(0.15, 3, 45, 120)),
        ("colt", ConferenceSettings::new("COLT", pmlr).with_timing(0.15, 3, 45, 120)),
        (
            "uai",
            ConferenceSettings::new("UAI", pmlr)
                .with_timing(0.15, 3, 45, 120)
                .with_years(2015..=2025),
        ),
        ("aistats", ConferenceSettings::new("AISTATS", pmlr).with_timing(0.15, 3, 45, 120)),
        ("cvpr", ConferenceSettings::new("CVPR", cvf).with_timing(0.1, 3, 30, 60)),
        ("iccv", ConferenceSettings::new("ICCV", cvf).with_timing(0.1, 3, 30, 60)),
        (
            "jmlr",
            ConferenceSettings::new("JMLR", "https://www.jmlr.org/").with_timing(0.15, 3, 45, 120),
        ),
        (
            "iclr",
            ConferenceSettings::new("ICLR", "https://api.openreview.net/")
                .with_timing(1.5, 5, 30, 120)
                .with_years(2017..=2023),
        ),
    ];
    entries
        .into_iter()
        .map(|(key, settings)| (key.to_string(), settings))
        .collect()
}

/// Per-conference override as it appears in the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConferenceOverride {
    name: Option<String>,
    base_url: Option<String>,
    request_delay: Option<f64>,
    retry_attempts: Option<u32>,
    timeout: Option<u64>,
    rate_limit_delay: Option<u64>,
    years: Option<Vec<u16>>,
}

/// Shape of the TOML config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_root: Option<PathBuf>,
    user_agent: Option<String>,
    item_retry_budget: Option<u32>,
    year_pause_secs: Option<f64>,
    #[serde(default)]
    conferences: BTreeMap<String, ConferenceOverride>,
}

/// Run-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the `metadata/` and `papers/` trees.
    pub data_root: PathBuf,
    /// User-Agent sent with every request.
    pub user_agent: String,
    /// Failed runs after which a FAILED item is skipped.
    pub item_retry_budget: u32,
    /// Pause between consecutive years of a multi-year job.
    pub year_pause: Duration,
    /// Conference settings keyed by lowercase conference id.
    pub conferences: BTreeMap<String, ConferenceSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            user_agent: user_agent::default_scraper_user_agent(),
            item_retry_budget: DEFAULT_ITEM_RETRY_BUDGET,
            year_pause: DEFAULT_YEAR_PAUSE,
            conferences: builtin_conferences(),
        }
    }
}

impl AppConfig {
    /// Loads configuration: built-in defaults, then the optional TOML file,
    /// then `SCRAPER_DATA_ROOT` from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or validated.
    #[instrument(skip_all, fields(config_path = ?config_path))]
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            config.apply_toml(&raw).map_err(|error| match error {
                ConfigError::Parse { source, .. } => ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                },
                other => other,
            })?;
            debug!(path = %path.display(), "applied config file");
        }

        if let Some(root) = std::env::var_os(DATA_ROOT_ENV).filter(|value| !value.is_empty()) {
            config.data_root = PathBuf::from(root);
        }

        config.validate()?;
        Ok(config)
    }

    /// Applies a TOML document on top of the current values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Invalid`] when a new conference lacks a base URL.
    pub fn apply_toml(&mut self, raw: &str) -> Result<(), ConfigError> {
        let file: FileConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;

        if let Some(root) = file.data_root {
            self.data_root = root;
        }
        if let Some(ua) = file.user_agent {
            self.user_agent = ua;
        }
        if let Some(budget) = file.item_retry_budget {
            self.item_retry_budget = budget;
        }
        if let Some(pause) = file.year_pause_secs {
            self.year_pause = Duration::try_from_secs_f64(pause).map_err(|_| {
                ConfigError::invalid("year_pause_secs", "must be a non-negative number of seconds")
            })?;
        }

        for (key, patch) in file.conferences {
            let key = key.to_ascii_lowercase();
            let mut settings = match self.conferences.remove(&key) {
                Some(existing) => existing,
                None => {
                    let base_url = patch.base_url.clone().ok_or_else(|| {
                        ConfigError::invalid(
                            format!("conferences.{key}.base_url"),
                            "required for a conference without built-in settings",
                        )
                    })?;
                    ConferenceSettings::new(patch.name.clone().unwrap_or_else(|| key.to_uppercase()), base_url)
                }
            };
            apply_override(&key, &mut settings, patch)?;
            self.conferences.insert(key, settings);
        }
        Ok(())
    }

    /// Checks cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_root.as_os_str().is_empty() {
            return Err(ConfigError::invalid("data_root", "must not be empty"));
        }
        for (key, settings) in &self.conferences {
            if Url::parse(&settings.base_url).is_err() {
                return Err(ConfigError::invalid(
                    format!("conferences.{key}.base_url"),
                    format!("'{}' is not a valid URL", settings.base_url),
                ));
            }
            if settings.timeout.is_zero() {
                return Err(ConfigError::invalid(
                    format!("conferences.{key}.timeout"),
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }

    /// Looks up settings for a conference id (case-insensitive).
    #[must_use]
    pub fn conference(&self, key: &str) -> Option<&ConferenceSettings> {
        self.conferences.get(&key.to_ascii_lowercase())
    }

    /// `<data_root>/metadata`
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.data_root.join("metadata")
    }

    /// `<data_root>/papers`
    #[must_use]
    pub fn papers_dir(&self) -> PathBuf {
        self.data_root.join("papers")
    }

    /// `<data_root>/metadata/<conf>/<conf>_<year>.json`
    #[must_use]
    pub fn metadata_file(&self, conference: &str, year: u16) -> PathBuf {
        self.metadata_dir()
            .join(conference)
            .join(format!("{conference}_{year}.json"))
    }

    /// `<data_root>/papers/<conf>/<year>`
    #[must_use]
    pub fn papers_year_dir(&self, conference: &str, year: u16) -> PathBuf {
        self.papers_dir().join(conference).join(year.to_string())
    }

    /// Location of the resume-state database.
    #[must_use]
    pub fn resume_db_path(&self) -> PathBuf {
        self.metadata_dir().join("resume_state.db")
    }
}

fn apply_override(
    key: &str,
    settings: &mut ConferenceSettings,
    patch: ConferenceOverride,
) -> Result<(), ConfigError> {
    if let Some(name) = patch.name {
        settings.name = name;
    }
    if let Some(base_url) = patch.base_url {
        settings.base_url = normalize_base_url(&base_url);
    }
    if let Some(delay) = patch.request_delay {
        settings.request_delay = Duration::try_from_secs_f64(delay).map_err(|_| {
            ConfigError::invalid(
                format!("conferences.{key}.request_delay"),
                "must be a non-negative number of seconds",
            )
        })?;
    }
    if let Some(retries) = patch.retry_attempts {
        settings.retry_attempts = retries;
    }
    if let Some(timeout) = patch.timeout {
        settings.timeout = Duration::from_secs(timeout);
    }
    if let Some(rate_limit) = patch.rate_limit_delay {
        settings.rate_limit_delay = Duration::from_secs(rate_limit);
    }
    if let Some(years) = patch.years {
        settings.years = Some(years);
    }
    Ok(())
}
