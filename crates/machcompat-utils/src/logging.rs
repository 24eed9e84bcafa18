//! # Logging Utilities
//!
//! Logging setup for machcompat using `tracing`.
//!
//! Supports:
//! - Pretty output for interactive use and JSON for log collectors
//! - Filtering through `RUST_LOG`
//! - An optional daily-rolling log file next to console output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use machcompat_utils::init_logging;
//!
//! // Keep the guard alive for as long as the process logs
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::info!("shim started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter (e.g. `RUST_LOG=debug`, `RUST_LOG=machcompat_core=trace`)
//! - `MACHCOMPAT_LOG_FORMAT`: `json` or `pretty` (default `pretty`)
//! - `MACHCOMPAT_LOG_FILE`: optional file path; rolled daily
//!
//! Trap spans (`trap{id caller target}`) show up in both formats. In JSON the
//! current span and span list are attached to every event.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "MACHCOMPAT_LOG_FORMAT";

/// Environment variable naming an optional log file.
pub const LOG_FILE_ENV: &str = "MACHCOMPAT_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable output (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "text" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
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
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig
{
    /// Output format for every sink
    pub format: LogFormat,
    /// Level used when `RUST_LOG` is unset or unparsable
    pub default_level: Level,
    /// Explicit level that overrides `RUST_LOG`
    pub level_override: Option<Level>,
    /// Optional file sink
    pub file: Option<PathBuf>,
}

impl Default for LogConfig
{
    fn default() -> Self
    {
        Self {
            format: LogFormat::Pretty,
            default_level: Level::INFO,
            level_override: None,
            file: None,
        }
    }
}

impl LogConfig
{
    /// Read `MACHCOMPAT_LOG_FORMAT` and `MACHCOMPAT_LOG_FILE`.
    ///
    /// An unrecognised format is an error rather than a silent fallback.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoggingError>
    {
        let format = lookup(LOG_FORMAT_ENV)
            .map(|raw| raw.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();
        let file = lookup(LOG_FILE_ENV).filter(|raw| !raw.is_empty()).map(PathBuf::from);
        Ok(Self {
            format,
            file,
            ..Self::default()
        })
    }

    fn filter(&self) -> EnvFilter
    {
        match self.level_override {
            Some(level) => EnvFilter::new(level.to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_level.to_string())),
        }
    }
}

/// Keeps the background file writer alive.
///
/// Dropping the guard flushes and stops file logging; console logging is
/// unaffected.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// - `InvalidFormat` if `MACHCOMPAT_LOG_FORMAT` is not recognised
/// - `InitializationFailed` if a global subscriber is already installed
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_with_config(&LogConfig::from_env()?)
}

/// Initialize logging with an explicit level and format
///
/// The level replaces `RUST_LOG`; `MACHCOMPAT_LOG_FILE` is still honoured.
///
/// ```rust,no_run
/// use machcompat_utils::{init_logging_with_level, LogFormat, LogLevel};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Json).expect("logging");
/// ```
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    let config = LogConfig {
        format,
        level_override: Some(level.into()),
        file: env::var(LOG_FILE_ENV).ok().filter(|raw| !raw.is_empty()).map(PathBuf::from),
        ..LogConfig::default()
    };
    init_with_config(&config)
}

/// Install a global subscriber for `config`.
pub fn init_with_config(config: &LogConfig) -> Result<LoggingGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.format, config.filter())];
    let mut guard = LoggingGuard::default();

    if let Some(path) = &config.file {
        let (dir, name) = split_log_path(path)?;
        let appender = tracing_appender::rolling::daily(dir, name);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(file_layer(config.format, config.filter(), writer));
        guard._file = Some(worker);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    Ok(guard)
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);
    match format {
        LogFormat::Pretty => layer.with_ansi(true).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, filter: EnvFilter, writer: tracing_appender::non_blocking::NonBlocking) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());
    match format {
        // No ANSI in files
        LogFormat::Pretty => layer.with_ansi(false).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), LoggingError>
{
    let name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidFile(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    Ok((dir, PathBuf::from(name)))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Unknown log format '{0}'. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Unknown log level '{0}'. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// Log file path has no file name
    #[error("Log file path {} has no file name", .0.display())]
    InvalidFile(PathBuf),

    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String>
    {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("prod").unwrap(), LogFormat::Json);
        assert!(matches!(LogFormat::from_str("xml"), Err(LoggingError::InvalidFormat(_))));
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert!(matches!(LogLevel::from_str("loud"), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_config_from_env()
    {
        let config = LogConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LogConfig::default());

        let config = LogConfig::from_lookup(lookup(&[
            (LOG_FORMAT_ENV, "json"),
            (LOG_FILE_ENV, "/var/log/machcompat/shim.log"),
        ]))
        .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/var/log/machcompat/shim.log")));

        // Empty file means console only
        let config = LogConfig::from_lookup(lookup(&[(LOG_FILE_ENV, "")])).unwrap();
        assert_eq!(config.file, None);

        assert!(LogConfig::from_lookup(lookup(&[(LOG_FORMAT_ENV, "yaml")])).is_err());
    }

    #[test]
    fn test_split_log_path()
    {
        let dir = env::temp_dir().join(format!("machcompat-log-test-{}", std::process::id()));
        let (parent, name) = split_log_path(&dir.join("shim.log")).unwrap();
        assert_eq!(parent, dir);
        assert_eq!(name, PathBuf::from("shim.log"));
        assert!(dir.is_dir());
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(split_log_path(Path::new("/")), Err(LoggingError::InvalidFile(_))));
    }
}
