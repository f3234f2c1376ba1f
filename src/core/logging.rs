//! Tracing subscriber setup.
//!
//! Logs go to stderr (or `SHIPTRACK_LOG_FILE`) so stdout stays clean for
//! `--json` output.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const LOG_LEVEL_ENV: &str = "SHIPTRACK_LOG";
const LOG_FORMAT_ENV: &str = "SHIPTRACK_LOG_FORMAT";
const LOG_FILE_ENV: &str = "SHIPTRACK_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per event.
    Json,
    Compact,
}

impl LogFormat {
    /// Parse a format name (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" => Some(Self::Human),
            "json" | "jsonl" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Parse a level name (case-insensitive).
#[must_use]
pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" | "verbose" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Resolved logging options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Human,
            file: None,
        }
    }
}

impl LogSettings {
    /// Settings from the environment, with `verbose` raising the floor to debug.
    ///
    /// Unset or unparseable variables keep their defaults.
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        let mut settings = Self::default();
        if let Some(level) = env_value(LOG_LEVEL_ENV).as_deref().and_then(parse_level) {
            settings.level = level;
        }
        if let Some(format) = env_value(LOG_FORMAT_ENV)
            .as_deref()
            .and_then(LogFormat::from_arg)
        {
            settings.format = format;
        }
        settings.file = env_value(LOG_FILE_ENV).map(PathBuf::from);
        if verbose && settings.level < Level::DEBUG {
            settings.level = Level::DEBUG;
        }
        settings
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "shiptrack={}",
                self.level.as_str().to_lowercase()
            ))
        })
    }

    fn writer(&self) -> BoxMakeWriter {
        let file = self.file.as_ref().and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        match file {
            Some(file) => BoxMakeWriter::new(file),
            None => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(settings: &LogSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_writer(settings.writer());

    match settings.format {
        LogFormat::Json => builder
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
            .ok(),
        LogFormat::Compact => builder.compact().with_target(true).try_init().ok(),
        LogFormat::Human => builder.with_target(false).without_time().try_init().ok(),
    };
}
