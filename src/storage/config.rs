//! Configuration file loading and management.
//!
//! Loads configuration from `<config dir>/config.toml` as reported by
//! [`AppPaths`], e.g. `~/.config/stagehand/config.toml` on Linux.
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `STAGEHAND_MERGE`: Merge sibling fixtures with equal keys (1, true, yes / 0, false, no)
//! - `STAGEHAND_LIFECYCLE`: Record leaf start/end events (1, true, yes)
//! - `STAGEHAND_FORMAT`: Output format (human, json)
//! - `STAGEHAND_NO_COLOR` or `NO_COLOR`: Disable colors
//! - `STAGEHAND_VERBOSE`: Enable verbose output
//! - `STAGEHAND_PRETTY`: Pretty-print JSON output
//! - `STAGEHAND_CONFIG`: Override config file path

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::{Cli, OutputFormat};
use crate::error::{Result, StagehandError};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable toggling sibling fixture merging.
pub const ENV_MERGE: &str = "STAGEHAND_MERGE";
/// Environment variable toggling lifecycle reporting.
pub const ENV_LIFECYCLE: &str = "STAGEHAND_LIFECYCLE";
/// Environment variable for output format.
pub const ENV_FORMAT: &str = "STAGEHAND_FORMAT";
/// Environment variable to disable colors.
pub const ENV_NO_COLOR: &str = "STAGEHAND_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";
/// Environment variable for verbose output.
pub const ENV_VERBOSE: &str = "STAGEHAND_VERBOSE";
/// Environment variable for pretty JSON output.
pub const ENV_PRETTY: &str = "STAGEHAND_PRETTY";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "STAGEHAND_CONFIG";

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Final configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Merge sibling fixtures with equal keys.
    pub merge: bool,
    /// Record leaf start/end events.
    pub report_lifecycle: bool,
    /// Output format.
    pub format: OutputFormat,
    /// Whether to disable colored output.
    pub no_color: bool,
    /// Whether verbose logging is enabled.
    pub verbose: bool,
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
    /// Log level from the config file, used when neither flag nor env sets one.
    pub log_level: Option<String>,
    /// Config file that was consulted, if any.
    pub config_path: Option<PathBuf>,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub merge: ConfigSource,
    pub report_lifecycle: ConfigSource,
    pub format: ConfigSource,
    pub no_color: ConfigSource,
    pub verbose: ConfigSource,
    pub pretty: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl ConfigSource {
    /// Whether the value was chosen explicitly for this invocation.
    #[must_use]
    pub const fn is_explicit(self) -> bool {
        matches!(self, Self::Cli | Self::Env)
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and
    /// config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid, or if an
    /// environment variable holds an unknown format.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let (config, config_path) = Self::load_config()?;
        Self::resolve_with(cli, &config, config_path)
    }

    /// Resolve against an already loaded config.
    pub fn resolve_with(cli: &Cli, config: &Config, config_path: Option<PathBuf>) -> Result<Self> {
        config.validate()?;

        let mut sources = ConfigSources::default();
        let merge = Self::resolve_merge(cli, config, &mut sources.merge);
        let report_lifecycle = Self::resolve_lifecycle(config, &mut sources.report_lifecycle);
        let format = Self::resolve_format(cli, config, &mut sources.format)?;
        let no_color = Self::resolve_no_color(cli, config, &mut sources.no_color);
        let verbose = Self::resolve_verbose(cli, &mut sources.verbose);
        let pretty = Self::resolve_pretty(cli, config, &mut sources.pretty);

        tracing::debug!(
            merge,
            merge_source = %sources.merge,
            format = format.as_str(),
            format_source = %sources.format,
            "Configuration resolved"
        );

        Ok(Self {
            merge,
            report_lifecycle,
            format,
            no_color,
            verbose,
            pretty,
            log_level: config.general.log_level.clone(),
            config_path,
            sources,
        })
    }

    /// Load config file, respecting the `STAGEHAND_CONFIG` override.
    fn load_config() -> Result<(Config, Option<PathBuf>)> {
        let path = std::env::var(ENV_CONFIG)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map_or_else(Config::config_path, |p| Some(PathBuf::from(p)));
        match path {
            Some(path) => Ok((Config::load_from(&path)?, Some(path))),
            None => Ok((Config::default(), None)),
        }
    }

    fn resolve_merge(cli: &Cli, config: &Config, source: &mut ConfigSource) -> bool {
        // 1. CLI --no-merge flag
        if cli.no_merge {
            *source = ConfigSource::Cli;
            return false;
        }

        // 2. Environment variable
        if let Some(value) = Self::env_bool(ENV_MERGE) {
            *source = ConfigSource::Env;
            return value;
        }

        // 3. Config file
        *source = ConfigSource::ConfigFile;
        config.general.merge_fixtures
    }

    fn resolve_lifecycle(config: &Config, source: &mut ConfigSource) -> bool {
        if let Some(value) = Self::env_bool(ENV_LIFECYCLE) {
            *source = ConfigSource::Env;
            return value;
        }
        *source = ConfigSource::ConfigFile;
        config.general.report_lifecycle
    }

    fn resolve_format(
        cli: &Cli,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Result<OutputFormat> {
        // 1. CLI --json flag (shorthand)
        if cli.json {
            *source = ConfigSource::Cli;
            return Ok(OutputFormat::Json);
        }

        // clap fills in a default, so only a non-default --format counts as
        // explicit; the environment is consulted before it.
        if let Ok(format_env) = std::env::var(ENV_FORMAT) {
            *source = ConfigSource::Env;
            return Self::parse_format(&format_env);
        }

        if cli.format != OutputFormat::Human {
            *source = ConfigSource::Cli;
            return Ok(cli.format);
        }

        // 3. Config file
        if let Some(ref format_str) = config.output.format {
            *source = ConfigSource::ConfigFile;
            return Self::parse_format(format_str);
        }

        // 4. Default
        *source = ConfigSource::Default;
        Ok(OutputFormat::Human)
    }

    fn parse_format(s: &str) -> Result<OutputFormat> {
        OutputFormat::parse(s).ok_or_else(|| {
            StagehandError::Config(format!("Invalid format '{s}'. Valid formats: human, json"))
        })
    }

    fn resolve_no_color(cli: &Cli, config: &Config, source: &mut ConfigSource) -> bool {
        // 1. CLI --no-color flag
        if cli.no_color {
            *source = ConfigSource::Cli;
            return true;
        }

        // 2. Environment variable (STAGEHAND_NO_COLOR or standard NO_COLOR)
        if Self::is_env_truthy(ENV_NO_COLOR) || std::env::var(ENV_NO_COLOR_STD).is_ok() {
            *source = ConfigSource::Env;
            return true;
        }

        // 3. Config file (color = false means no_color)
        if !config.output.color {
            *source = ConfigSource::ConfigFile;
            return true;
        }

        *source = ConfigSource::Default;
        false
    }

    fn resolve_verbose(cli: &Cli, source: &mut ConfigSource) -> bool {
        if cli.verbose {
            *source = ConfigSource::Cli;
            return true;
        }
        if Self::is_env_truthy(ENV_VERBOSE) {
            *source = ConfigSource::Env;
            return true;
        }
        *source = ConfigSource::Default;
        false
    }

    fn resolve_pretty(cli: &Cli, config: &Config, source: &mut ConfigSource) -> bool {
        if cli.pretty {
            *source = ConfigSource::Cli;
            return true;
        }
        if Self::is_env_truthy(ENV_PRETTY) {
            *source = ConfigSource::Env;
            return true;
        }
        if config.output.pretty {
            *source = ConfigSource::ConfigFile;
            return true;
        }
        *source = ConfigSource::Default;
        false
    }

    /// Check if an environment variable is set to a truthy value.
    fn is_env_truthy(var: &str) -> bool {
        Self::env_bool(var).unwrap_or(false)
    }

    /// Parse a boolean environment variable; unrecognised values are ignored.
    fn env_bool(var: &str) -> Option<bool> {
        let value = std::env::var(var).ok()?;
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

// =============================================================================
// Config File
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Output settings.
    pub output: OutputConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Merge sibling fixtures with equal keys before running.
    pub merge_fixtures: bool,
    /// Record leaf start/end events.
    pub report_lifecycle: bool,
    /// Default log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format (human, json).
    pub format: Option<String>,
    /// Whether to use colors in output.
    pub color: bool,
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            merge_fixtures: true,
            report_lifecycle: false,
            log_level: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: None,
            color: true,
            pretty: false,
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::config_path().map_or_else(|| Ok(Self::default()), |path| Self::load_from(&path))
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StagehandError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Default config file path, when a home directory is known.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        AppPaths::new().map(|paths| paths.config_file())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if let Some(format) = &self.output.format
            && OutputFormat::parse(format).is_none()
        {
            return Err(StagehandError::Config(format!(
                "Invalid format \"{format}\". Valid formats: human, json"
            )));
        }

        if let Some(level) = &self.general.log_level
            && crate::core::logging::parse_level(level).is_none()
        {
            return Err(StagehandError::Config(format!(
                "Invalid log level \"{level}\". Valid levels: error, warn, info, debug, trace"
            )));
        }

        Ok(())
    }
}
