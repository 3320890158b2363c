//! Exit code logic for the paperscrape process.
//!
//! Single responsibility: map succeeded/failed counts to the process exit outcome.

use crate::ProcessExit;

/// Determines the process exit outcome from succeeded and failed item counts.
///
/// A year that could not be processed at all counts as one failure.
pub(crate) fn determine_exit_outcome(succeeded: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
