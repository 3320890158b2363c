//! Tracing setup: console on stderr plus an append-only log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// The log file keeps at least this much detail regardless of `-q`.
const FILE_MIN_LEVEL: &str = "info";

/// Level for the file layer: the console level, but never quieter than info.
pub(crate) fn file_level(console_level: &str) -> &str {
    match console_level {
        "debug" | "trace" => console_level,
        _ => FILE_MIN_LEVEL,
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides the console level. When the log file cannot be
/// opened, logging continues on the console only and the error is returned
/// so the caller can report it.
pub(crate) fn init_tracing(console_level: &str, log_file: &Path) -> Result<(), std::io::Error> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level));
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file = open_log_file(log_file);
    let file_layer = file.as_ref().ok().map(|handle| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Arc::clone(handle))
            .with_filter(EnvFilter::new(file_level(console_level)))
    });

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();

    file.map(|_| ())
}

fn open_log_file(path: &Path) -> Result<Arc<std::fs::File>, std::io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_level_never_below_info() {
        assert_eq!(file_level("error"), "info");
        assert_eq!(file_level("info"), "info");
        assert_eq!(file_level("debug"), "debug");
        assert_eq!(file_level("trace"), "trace");
    }

    #[test]
    fn test_open_log_file_creates_parent_and_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("scraper.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "first\n").unwrap();

        {
            use std::io::Write;
            let file = open_log_file(&path).unwrap();
            (&*file).write_all(b"second\n").unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_open_log_file_reports_unwritable_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        assert!(open_log_file(&blocker.join("scraper.log")).is_err());
    }
}
