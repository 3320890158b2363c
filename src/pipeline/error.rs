//! Pipeline errors and their mapping onto [`ItemErrorKind`].

use thiserror::Error;

use super::report::ItemErrorKind;
use crate::fetch::FetchError;
use crate::metadata::MetadataError;
use crate::resume::ResumeError;
use crate::sources::SourceError;

/// Errors that stop a job or a year.
///
/// Per-item problems never surface here; they are recorded as
/// [`ItemFailure`](super::ItemFailure)s instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unknown conference or unsupported year.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Index page could not be fetched, or the fetcher could not be built.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Resume database failure.
    #[error("resume state error: {0}")]
    Resume(#[from] ResumeError),

    /// Metadata file could not be read or backed up.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A conference is registered but has no settings, or the reverse.
    #[error("conference '{0}' has no settings")]
    MissingSettings(String),
}

/// Failure of a single work item.
#[derive(Debug, Error)]
pub(crate) enum ItemError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl ItemError {
    pub(crate) fn kind(&self) -> ItemErrorKind {
        match self {
            Self::Fetch(error) => fetch_error_kind(error),
            Self::Source(_) => ItemErrorKind::Parse,
            Self::Metadata(_) => ItemErrorKind::Filesystem,
        }
    }
}

pub(crate) fn fetch_error_kind(error: &FetchError) -> ItemErrorKind {
    match error {
        FetchError::HttpStatus { status, .. } => match status {
            408 | 429 | 500..=599 => ItemErrorKind::Network,
            _ => ItemErrorKind::HttpClient,
        },
        FetchError::Network { .. } | FetchError::Timeout { .. } | FetchError::ClientBuild { .. } => {
            ItemErrorKind::Network
        }
        FetchError::Io { .. } => ItemErrorKind::Filesystem,
        FetchError::InvalidUrl { .. } => ItemErrorKind::Parse,
    }
}
