//! Progress UI (spinner) for scrape runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use paperscrape_core::{ItemStatus, ResumeRepository};

/// Whether a spinner should be drawn.
pub(crate) fn should_use_spinner(stderr_is_terminal: bool, quiet: bool) -> bool {
    let dumb_terminal = std::env::var("TERM").is_ok_and(|value| value.eq_ignore_ascii_case("dumb"));
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    resume: Arc<dyn ResumeRepository>,
    conference: String,
    years: Vec<u16>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(resume, conference, years, Arc::clone(&stop));
    (Some(handle), stop)
}

/// Counts of (done, fetched, failed) summed over `years`.
async fn count_progress(
    resume: &dyn ResumeRepository,
    conference: &str,
    years: &[u16],
) -> (i64, i64, i64) {
    let mut totals = (0, 0, 0);
    for &year in years {
        let count = |status| resume.count_by_status(conference, year, status);
        totals.0 += count(ItemStatus::Done).await.unwrap_or(0);
        totals.1 += count(ItemStatus::Fetched).await.unwrap_or(0);
        totals.2 += count(ItemStatus::Failed).await.unwrap_or(0);
    }
    totals
}

fn spawn_spinner_inner(
    resume: Arc<dyn ResumeRepository>,
    conference: String,
    years: Vec<u16>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let (done, fetched, failed) = count_progress(&*resume, &conference, &years).await;
            spinner.set_message(format!(
                "[{conference}] {done} done, {fetched} metadata only, {failed} failed"
            ));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}
