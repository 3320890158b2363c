//! CLI entry point for paperscrape.

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use paperscrape_core::{
    AppConfig, Database, JobSpec, Pipeline, ResumeRepository, ResumeStore, SourceError,
    SourceRegistry, build_default_source_registry,
};
use tracing::{debug, error, info, warn};

mod app;
mod cli;

use app::exit_handler::determine_exit_outcome;
use app::progress::{should_use_spinner, spawn_progress_ui};
use app::summary::format_job_summary;
use cli::Args;

/// Process outcome, mapped to the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every item succeeded or was skipped.
    Success,
    /// Some items failed.
    Partial,
    /// Nothing could be processed, or setup failed.
    Failure,
}

impl ProcessExit {
    pub(crate) fn code_value(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    if let Err(e) = app::logging::init_tracing(args.console_level(), &args.log_file) {
        warn!(path = %args.log_file.display(), error = %e, "cannot open log file, logging to console only");
    }
    debug!(?args, "CLI arguments parsed");

    let outcome = match run(&args).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{e:#}");
            ProcessExit::Failure
        }
    };
    ExitCode::from(outcome.code_value())
}

async fn run(args: &Args) -> Result<ProcessExit> {
    let mut config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(root) = &args.data_root {
        config.data_root.clone_from(root);
    }
    let registry = build_default_source_registry();

    if args.list_conferences {
        print_conferences(&config, &registry);
        return Ok(ProcessExit::Success);
    }

    let conference = args
        .conference
        .as_deref()
        .context("missing conference")?
        .to_ascii_lowercase();
    if !registry.contains(&conference) {
        return Err(SourceError::UnknownConference {
            name: conference,
            available: registry
                .conferences()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
        .into());
    }

    let job = JobSpec {
        conference,
        years: args.years.clone(),
        skip_pdfs: args.no_pdfs,
        force_fresh: args.no_resume,
    };
    info!(
        conference = %job.conference,
        years = ?job.years,
        pdfs = !job.skip_pdfs,
        resume = !job.force_fresh,
        data_root = %config.data_root.display(),
        "paperscrape starting"
    );

    let db = Database::new(&config.resume_db_path())
        .await
        .context("failed to open resume database")?;
    let resume: Arc<dyn ResumeRepository> = Arc::new(ResumeStore::new(db));

    let use_spinner = should_use_spinner(std::io::stderr().is_terminal(), args.quiet);
    let (progress_handle, progress_stop) = spawn_progress_ui(
        use_spinner,
        Arc::clone(&resume),
        job.conference.clone(),
        job.years.clone(),
    );

    let pipeline = Pipeline::new(config, registry, resume);
    let result = pipeline.run_job(&job).await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let report = result?;
    if !args.quiet {
        for line in format_job_summary(&report) {
            println!("{line}");
        }
    }

    Ok(determine_exit_outcome(report.succeeded(), report.failed()))
}

fn print_conferences(config: &AppConfig, registry: &SourceRegistry) {
    println!("Available conferences:");
    for key in registry.conferences() {
        match config.conference(key) {
            Some(settings) => println!("  {key:<10} {:<10} {}", settings.name, settings.base_url),
            None => println!("  {key}"),
        }
    }
}
