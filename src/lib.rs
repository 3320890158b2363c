//! Paperscrape Core Library
//!
//! Resumable, rate-limited scraping of conference proceedings: paper
//! metadata goes to per-year JSON files and PDFs to a per-year directory,
//! with per-item progress kept in SQLite so interrupted runs pick up where
//! they stopped.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Run-wide settings and the per-conference table
//! - [`db`] - Database connection and schema management
//! - [`fetch`] - HTTP fetcher with retry, backoff and per-domain delay
//! - [`sources`] - Per-site index and paper page parsers, and their registry
//! - [`paper`] - Paper records and index entries
//! - [`metadata`] - Per-year metadata JSON files
//! - [`resume`] - Work-item state machine persisted in SQLite
//! - [`pipeline`] - Orchestration of the above per (conference, year)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod fetch;
pub mod metadata;
pub mod paper;
pub mod pipeline;
pub mod resume;
pub mod sources;
#[cfg(test)]
pub(crate) mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{AppConfig, ConferenceSettings};
pub use db::Database;
pub use fetch::{FetchConfig, FetchError, Fetcher};
pub use paper::{PaperEntry, PaperRecord};
pub use pipeline::{
    ItemErrorKind, ItemFailure, JobReport, JobSpec, Pipeline, PipelineError, YearReport,
};
pub use resume::{ItemKey, ItemStatus, ResumeRepository, ResumeStore};
pub use sources::{Source, SourceError, SourceRegistry, build_default_source_registry};
