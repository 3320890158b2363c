//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use paperscrape_core::config::{DATA_ROOT_ENV, DEFAULT_LOG_FILE};

/// Scrape conference paper metadata and PDFs.
///
/// Metadata is written to `<data-root>/metadata/<conference>/<conference>_<year>.json`
/// and PDFs to `<data-root>/papers/<conference>/<year>/`. Interrupted runs
/// resume where they stopped unless `--no-resume` is given.
#[derive(Parser, Debug)]
#[command(name = "paperscrape")]
#[command(author, version, about)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Conference id (see --list-conferences)
    #[arg(required_unless_present = "list_conferences")]
    pub conference: Option<String>,

    /// One or more years to scrape
    #[arg(
        num_args = 1..,
        required_unless_present = "list_conferences",
        value_parser = clap::value_parser!(u16).range(1900..=2100)
    )]
    pub years: Vec<u16>,

    /// Save metadata only, skip PDF downloads
    #[arg(long)]
    pub no_pdfs: bool,

    /// Ignore saved progress and fetch everything again
    #[arg(long)]
    pub no_resume: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// List available conferences and exit
    #[arg(long)]
    pub list_conferences: bool,

    /// Root directory for metadata, papers and resume state
    #[arg(long, env = DATA_ROOT_ENV, value_name = "DIR")]
    pub data_root: Option<PathBuf>,

    /// TOML file overriding conference settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log file (appended to)
    #[arg(long, value_name = "FILE", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
}

impl Args {
    /// Default console level from the verbose/quiet flags.
    pub fn console_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::error::ErrorKind;

    #[test]
    fn test_cli_conference_and_years_parse() {
        let args = Args::try_parse_from(["paperscrape", "neurips", "2022", "2023"]).unwrap();
        assert_eq!(args.conference.as_deref(), Some("neurips"));
        assert_eq!(args.years, vec![2022, 2023]);
        assert!(!args.no_pdfs);
        assert!(!args.no_resume);
        assert_eq!(args.log_file, PathBuf::from("scraper.log"));
    }

    #[test]
    fn test_cli_flags_parse() {
        let args = Args::try_parse_from([
            "paperscrape",
            "icml",
            "2023",
            "--no-pdfs",
            "--no-resume",
            "--verbose",
        ])
        .unwrap();
        assert!(args.no_pdfs);
        assert!(args.no_resume);
        assert_eq!(args.verbose, 1);
        assert_eq!(args.console_level(), "debug");
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["paperscrape", "jmlr", "2020", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.console_level(), "trace");
    }

    #[test]
    fn test_cli_quiet_sets_error_level() {
        let args = Args::try_parse_from(["paperscrape", "jmlr", "2020", "-q"]).unwrap();
        assert!(args.quiet);
        assert_eq!(args.console_level(), "error");
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let err = Args::try_parse_from(["paperscrape", "jmlr", "2020", "-q", "-v"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_no_arguments_shows_help() {
        let err = Args::try_parse_from(["paperscrape"]).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_cli_missing_years_is_error() {
        let err = Args::try_parse_from(["paperscrape", "neurips"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_rejects_non_numeric_year() {
        let err = Args::try_parse_from(["paperscrape", "neurips", "last"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_list_conferences_needs_no_positionals() {
        let args = Args::try_parse_from(["paperscrape", "--list-conferences"]).unwrap();
        assert!(args.list_conferences);
        assert!(args.conference.is_none());
        assert!(args.years.is_empty());
    }

    #[test]
    fn test_cli_data_root_and_config_paths() {
        let args = Args::try_parse_from([
            "paperscrape",
            "cvpr",
            "2019",
            "--data-root",
            "/tmp/papers",
            "--config",
            "conf.toml",
            "--log-file",
            "run.log",
        ])
        .unwrap();
        assert_eq!(args.data_root, Some(PathBuf::from("/tmp/papers")));
        assert_eq!(args.config, Some(PathBuf::from("conf.toml")));
        assert_eq!(args.log_file, PathBuf::from("run.log"));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["paperscrape", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }
}
