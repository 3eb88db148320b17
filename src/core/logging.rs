//! Diagnostic logging setup.
//!
//! Logs go to stderr (or `STAGEHAND_LOG_FILE`) so that reports on stdout stay
//! machine-readable.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_LEVEL_ENV: &str = "STAGEHAND_LOG";
pub const LOG_FORMAT_ENV: &str = "STAGEHAND_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "STAGEHAND_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable.
    #[default]
    Human,
    /// One JSON object per event, span closures included.
    Json,
    /// Single terse line per event.
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" => Some(Self::Human),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Parse a level name, accepting the usual aliases.
#[must_use]
pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" | "verbose" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "critical" => Some(Level::ERROR),
        _ => None,
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Logging settings, merged from CLI flags and environment.
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
    /// Settings from `STAGEHAND_LOG*` variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay whatever `STAGEHAND_LOG*` variables are set.
    #[must_use]
    pub fn with_env(self) -> Self {
        Self {
            level: env_value(LOG_LEVEL_ENV)
                .and_then(|v| parse_level(&v))
                .unwrap_or(self.level),
            format: env_value(LOG_FORMAT_ENV)
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(self.format),
            file: env_value(LOG_FILE_ENV).map(PathBuf::from).or(self.file),
        }
    }

    /// Apply CLI overrides: an explicit level wins, `--verbose` raises the
    /// level to at least debug.
    #[must_use]
    pub fn with_cli(mut self, level: Option<&str>, verbose: bool) -> Self {
        if let Some(level) = level.and_then(parse_level) {
            self.level = level;
        }
        if verbose && self.level < Level::DEBUG {
            self.level = Level::DEBUG;
        }
        self
    }

    /// Filter directive for this crate at the configured level.
    #[must_use]
    pub fn directive(&self) -> String {
        format!(
            "stagehand={}",
            self.level.as_str().to_ascii_lowercase()
        )
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(settings: &LogSettings) {
    let file = settings.file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let writer = match file {
        Some(file) => BoxMakeWriter::new(file),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.directive()));

    let installed = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(writer)
            .with_span_events(FmtSpan::CLOSE)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_writer(writer)
            .with_target(true)
            .try_init(),
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(false)
            .without_time()
            .try_init(),
    };
    if installed.is_ok() {
        tracing::debug!(level = %settings.level, format = ?settings.format, "Logging initialised");
    }
}
