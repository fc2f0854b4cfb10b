// This file implements the application's logging system.
// It provides macros for different log levels (INFO, WARN, ERROR, DEBUG),
// filters them against the level configured in `settings.logging`, and can
// additionally append plain-text lines to a log file for `--verbose`-style
// forensics without cluttering the terminal.

use colored::*; // Used for adding color to log messages.
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering}; // Thread-safe level threshold.
use std::sync::{Mutex, OnceLock};

/// Severity levels, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    /// Parses a level name as it appears in `settings.logging.level`.
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.to_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// `log_info!` for general application progress and informational messages.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        if $crate::logger::level_enabled($crate::logger::LogLevel::Info) {
            eprintln!("{} {}", "[INFO]".bright_green(), msg);
        }
        $crate::logger::file_sink("INFO", &msg);
    }};
}

// `log_warn!` for non-critical issues or noteworthy conditions.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        if $crate::logger::level_enabled($crate::logger::LogLevel::Warn) {
            eprintln!("{} {}", "[WARN]".bright_yellow(), msg);
        }
        $crate::logger::file_sink("WARN", &msg);
    }};
}

// `log_error!` for critical errors requiring immediate attention.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        if $crate::logger::level_enabled($crate::logger::LogLevel::Error) {
            eprintln!("{} {}", "[ERROR]".bright_red(), msg);
        }
        $crate::logger::file_sink("ERROR", &msg);
    }};
}

// `log_debug!` for detailed internal application tracing.
// Messages are only printed when the threshold allows debug output.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        if $crate::logger::level_enabled($crate::logger::LogLevel::Debug) {
            let msg = format!($($arg)*);
            eprintln!("{} {}", "[DEBUG]".dimmed(), msg);
            $crate::logger::file_sink("DEBUG", &msg);
        }
    }};
}

// The active threshold. Messages below it are suppressed on the terminal.
static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

// Optional file sink, opened once when `attach_file` is called.
static FILE_SINK: OnceLock<Mutex<std::fs::File>> = OnceLock::new();

/// Initializes the logger threshold. Called once at application startup;
/// `--debug` wins over the configured level.
pub fn init(debug: bool) {
    if debug {
        set_level(LogLevel::Debug);
        log_debug!("Logger initialized in DEBUG mode");
    }
}

/// Applies the level configured in `settings.logging.level`.
pub fn set_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Checks whether messages of `level` pass the active threshold.
/// Used primarily by the logging macros.
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 >= LEVEL.load(Ordering::Relaxed)
}

/// Opens `path` for appending and routes a copy of every log line into it.
/// The terminal keeps its threshold; the file receives everything, which is
/// where detailed context for failed runs ends up.
pub fn attach_file(path: &Path) {
    if FILE_SINK.get().is_some() {
        return; // Already attached.
    }
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let _ = FILE_SINK.set(Mutex::new(file));
        }
        Err(e) => {
            eprintln!(
                "{} Failed to open log file {}: {}",
                "[WARN]".bright_yellow(),
                path.display(),
                e
            );
        }
    }
}

/// Appends one timestamped line to the attached log file, if any.
/// Called by the logging macros; not meant for direct use.
pub fn file_sink(level: &str, msg: &str) {
    if let Some(sink) = FILE_SINK.get() {
        if let Ok(mut file) = sink.lock() {
            let stamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%z");
            let _ = writeln!(file, "{stamp} [{level}] {msg}");
        }
    }
}
