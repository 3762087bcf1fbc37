use directories::ProjectDirs;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::formatter::BracketedFormatter;

const DEFAULT_FILTER: &str = "info";

/// `<local data dir>/logs` for this tool, or `./logs` when no home
/// directory can be determined.
pub fn default_log_dir() -> PathBuf {
    ProjectDirs::from("", "", "yolo-dataset-merger")
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Install the global subscriber: bracketed output to stdout and to a fresh
/// `merge_<timestamp>.log` file in `log_dir`.
///
/// `RUST_LOG` overrides the default `info` filter.
///
/// # Returns
/// * Path of the created log file
pub fn setup_logging(log_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("merge_{}.log", timestamp));
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)?;

    let file_layer = fmt::layer()
        .event_format(BracketedFormatter)
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    let stdout_layer = fmt::layer()
        .event_format(BracketedFormatter)
        .with_writer(io::stdout);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    info!("Log file created at: {:?}", log_path);
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_dir_ends_with_logs() {
        assert!(default_log_dir().ends_with("logs"));
    }
}
