use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use upkeep_platform::AppPaths;

/// Levels for the two log sinks of one update run.
///
/// The log file always records stage transitions and warnings, so a
/// suppressed update or a leftover workspace is visible after the fact.
/// `debug_logging` adds extraction and merge detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPolicy {
    pub file: LevelFilter,
    pub terminal: LevelFilter,
}

impl LogPolicy {
    pub fn new(debug_logging: bool) -> Self {
        let detailed = debug_logging || cfg!(debug_assertions);
        Self {
            file: if debug_logging {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
            terminal: if detailed {
                LevelFilter::Debug
            } else {
                LevelFilter::Warn
            },
        }
    }
}

fn rotated_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.file_name().unwrap_or_default().to_os_string();
    name.push(".old");
    log_path.with_file_name(name)
}

/// Move an oversized log aside, replacing the previous rotation.
///
/// Returns whether the log was rotated.
fn rotate_if_oversized(log_path: &Path, max_log_size: u64) -> io::Result<bool> {
    let size = match std::fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    if size <= max_log_size {
        return Ok(false);
    }
    std::fs::rename(log_path, rotated_path(log_path))?;
    Ok(true)
}

fn open_log_file(log_path: &Path, max_log_size: u64) -> io::Result<File> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rotate_if_oversized(log_path, max_log_size)?;
    OpenOptions::new().create(true).append(true).open(log_path)
}

/// Install the terminal logger and, when the data directory is usable, the
/// run log at `<data_dir>/update.log`.
///
/// Returns the run log path when file logging is active.
pub fn init_logging(debug_logging: bool, max_log_size: u64) -> Option<PathBuf> {
    let policy = LogPolicy::new(debug_logging);
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("upkeep")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        policy.terminal,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let log_path = AppPaths::new().ok().map(|paths| paths.log_file());
    let log_path = log_path.and_then(|path| match open_log_file(&path, max_log_size) {
        Ok(file) => {
            loggers.push(WriteLogger::new(policy.file, config, file));
            Some(path)
        }
        Err(error) => {
            eprintln!("Update log unavailable at {}: {error}", path.display());
            None
        }
    });

    let _ = CombinedLogger::init(loggers);
    log::info!(
        "upkeep {} starting (debug logging {})",
        env!("CARGO_PKG_VERSION"),
        if debug_logging { "on" } else { "off" }
    );
    log_path
}
