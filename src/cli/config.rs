//! Config command implementation.

use std::fmt::Write as _;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::{ExitCode, Result};
use crate::render::robot;
use crate::storage::ResolvedConfig;

#[derive(Debug, Serialize)]
struct Setting {
    name: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigOutput {
    config_path: Option<String>,
    settings: Vec<Setting>,
}

fn describe(config: &ResolvedConfig) -> ConfigOutput {
    let sources = &config.sources;
    let setting = |name, value: String, source: crate::storage::ConfigSource| Setting {
        name,
        value,
        source: source.to_string(),
    };
    ConfigOutput {
        config_path: config
            .config_path
            .as_ref()
            .map(|p| p.display().to_string()),
        settings: vec![
            setting("merge_fixtures", config.merge.to_string(), sources.merge),
            setting(
                "report_lifecycle",
                config.report_lifecycle.to_string(),
                sources.report_lifecycle,
            ),
            setting("format", config.format.as_str().to_string(), sources.format),
            setting("no_color", config.no_color.to_string(), sources.no_color),
            setting("pretty", config.pretty.to_string(), sources.pretty),
            setting("verbose", config.verbose.to_string(), sources.verbose),
        ],
    }
}

/// Render the resolved configuration.
pub fn render(config: &ResolvedConfig) -> Result<String> {
    let output = describe(config);
    if config.format == OutputFormat::Json {
        return if config.pretty {
            robot::render_json_pretty(&output)
        } else {
            robot::render_json(&output)
        };
    }

    let mut text = String::new();
    let _ = writeln!(
        text,
        "Config file: {}",
        output.config_path.as_deref().unwrap_or("(none)")
    );
    for setting in &output.settings {
        let _ = writeln!(
            text,
            "  {:<18} {:<8} ({})",
            setting.name, setting.value, setting.source
        );
    }
    Ok(text)
}

/// Print the resolved configuration.
pub fn execute(config: &ResolvedConfig) -> Result<ExitCode> {
    print!("{}", render(config)?);
    Ok(ExitCode::Success)
}
