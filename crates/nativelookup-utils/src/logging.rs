//! # Logging Utilities
//!
//! Logging setup for nativelookup using `tracing`.
//!
//! `nativelookup-core` reports cache misses, debug-info acquisition progress,
//! symbol-server diagnostics and persistence failures as `tracing` events.
//! This module installs a subscriber that writes them out:
//!
//! - Human-readable or JSON output
//! - Level filtering through `RUST_LOG` or an explicit level
//! - Console output on stderr, so command output on stdout stays clean
//! - Optional file output for processes without a console (e.g. a library
//!   injected into a game)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nativelookup_utils::init_logging;
//!
//! // Reads RUST_LOG and the NATIVELOOKUP_LOG_* variables
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("resolver ready");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Level filter (e.g. `RUST_LOG=debug`, `RUST_LOG=nativelookup_core=trace`)
//! - `NATIVELOOKUP_LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `NATIVELOOKUP_LOG_FILE`: Also write logs to this file, rotated daily
//!
//! ## Examples
//!
//! ```rust,no_run
//! use nativelookup_utils::{LogFormat, LogLevel, init_logging_with_level};
//!
//! init_logging_with_level(LogLevel::Debug, LogFormat::Pretty).expect("Failed to initialize logging");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use chrono::{NaiveDate, Utc};
use tracing::Level;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const FORMAT_ENV: &str = "NATIVELOOKUP_LOG_FORMAT";
const FILE_ENV: &str = "NATIVELOOKUP_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    Pretty,
    /// JSON format, one object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    /// Default
    Info,
    Debug,
    /// Most verbose; includes every cache hit
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Initialize logging from the environment
///
/// Reads `RUST_LOG`, `NATIVELOOKUP_LOG_FORMAT` and `NATIVELOOKUP_LOG_FILE`.
///
/// ## Errors
///
/// Returns an error if:
/// - A global subscriber is already installed
/// - The file named by `NATIVELOOKUP_LOG_FILE` cannot be opened
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = env::var(FORMAT_ENV)
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or(LogFormat::Pretty);

    init_console(format, None)
}

/// Initialize logging from the environment with an explicit format
///
/// Like [`init_logging`], but `NATIVELOOKUP_LOG_FORMAT` is ignored.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or file
/// logging fails.
pub fn init_logging_with_format(format: LogFormat) -> Result<(), LoggingError>
{
    init_console(format, None)
}

/// Initialize logging with an explicit level and format
///
/// The explicit level takes precedence over `RUST_LOG`. File output is still
/// controlled by `NATIVELOOKUP_LOG_FILE`.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or file
/// logging fails.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_console(format, Some(level.into()))
}

/// Initialize file-only logging
///
/// For processes without a usable console. Logs go to `path` when given,
/// otherwise to `~/.nativelookup/logs/YYYY-MM-DD-nativelookup.log` (or the
/// same name under the temp directory without a home directory). Nothing is
/// written to stdout or stderr.
///
/// Returns the path of the log file.
///
/// ## Example
///
/// ```rust,no_run
/// use nativelookup_utils::{LogFormat, LogLevel, init_logging_to_file};
///
/// let file = init_logging_to_file(None, Some(LogLevel::Debug), LogFormat::Json)
///     .expect("Failed to initialize logging");
/// eprintln!("logging to {}", file.display());
/// ```
///
/// ## Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_logging_to_file(
    path: Option<PathBuf>,
    level: Option<LogLevel>,
    format: LogFormat,
) -> Result<PathBuf, LoggingError>
{
    let log_file = match path {
        Some(path) => path,
        None => dated_log_file(&default_log_dir(), Utc::now().date_naive()),
    };

    let writer = file_writer(&log_file, false)?;
    let filter = build_filter(level.map(Into::into));
    let layers = vec![format_layer(format, writer, false, filter)];

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(log_file)
}

fn init_console(format: LogFormat, explicit_level: Option<Level>) -> Result<(), LoggingError>
{
    let mut layers = vec![format_layer(format, io::stderr, true, build_filter(explicit_level))];

    if let Some(file_path) = env::var_os(FILE_ENV).map(PathBuf::from) {
        let writer = file_writer(&file_path, true)?;
        layers.push(format_layer(format, writer, false, build_filter(explicit_level)));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Level filter
///
/// Priority:
/// 1. An explicit level (e.g. from a `--log-level` flag)
/// 2. `RUST_LOG`, including per-module directives
/// 3. `info`
fn build_filter(explicit_level: Option<Level>) -> EnvFilter
{
    if let Some(level) = explicit_level {
        return EnvFilter::new(level.to_string());
    }
    match env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        Err(_) => EnvFilter::new(Level::INFO.to_string()),
    }
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(ansi)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Non-blocking writer appending to `path`, optionally rotated daily.
fn file_writer(path: &Path, rotate_daily: bool) -> Result<NonBlocking, LoggingError>
{
    let file_name = path.file_name().ok_or_else(|| {
        LoggingError::FileError(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        ))
    })?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&directory)?;

    let appender = if rotate_daily {
        tracing_appender::rolling::daily(&directory, file_name)
    } else {
        tracing_appender::rolling::never(&directory, file_name)
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    // The writer thread must outlive every event; the subscriber is global
    std::mem::forget(guard);
    Ok(non_blocking)
}

fn default_log_dir() -> PathBuf
{
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".nativelookup").join("logs"),
        None => env::temp_dir(),
    }
}

fn dated_log_file(directory: &Path, date: NaiveDate) -> PathBuf
{
    directory.join(format!("{}-nativelookup.log", date.format("%Y-%m-%d")))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to install the global subscriber
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("dev").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("PROD").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_dated_log_file()
    {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            dated_log_file(Path::new("/var/log"), date),
            PathBuf::from("/var/log/2024-03-09-nativelookup.log")
        );
    }

    #[test]
    fn test_file_writer_rejects_directory_path()
    {
        assert!(matches!(file_writer(Path::new("/"), false), Err(LoggingError::FileError(_))));
    }
}
