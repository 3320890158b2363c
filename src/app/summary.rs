//! End-of-run summary lines.

use paperscrape_core::{JobReport, YearReport};

pub(crate) fn format_year_summary(report: &YearReport) -> String {
    if let Some(error) = &report.year_error {
        return format!("{} {}: failed: {error}", report.conference, report.year);
    }
    let mut line = format!(
        "{} {}: {} papers, {} done, {} skipped, {} failed",
        report.conference,
        report.year,
        report.discovered,
        report.completed,
        report.skipped,
        report.failed
    );
    if report.metadata_only > 0 {
        line.push_str(&format!(", {} metadata only", report.metadata_only));
    }
    line
}

/// One line per year, then one line per failed item.
pub(crate) fn format_job_summary(report: &JobReport) -> Vec<String> {
    let mut lines = Vec::new();
    for year in &report.years {
        lines.push(format_year_summary(year));
        for failure in &year.failures {
            lines.push(format!("  {} [{}] {}", failure.key, failure.kind, failure.message));
        }
    }
    lines
}
