//! Error rendering for the `stagehand` binary.
//!
//! Colored text with fix suggestions for terminals, plain text otherwise, and
//! structured JSON for machine consumers.

use colored::Colorize;
use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::{FixSuggestion, StagehandError};

// =============================================================================
// Public API
// =============================================================================

/// Render an error for stderr.
///
/// Colored output needs human format, colors enabled and a terminal on
/// stderr; otherwise plain text is used.
#[must_use]
pub fn render_error(
    error: &StagehandError,
    format: OutputFormat,
    no_color: bool,
    pretty: bool,
) -> String {
    if format == OutputFormat::Json {
        return render_error_json(error, pretty);
    }

    let use_color = !no_color && crate::util::env::stderr_is_tty();
    if use_color {
        render_colored(error)
    } else {
        render_simple(error)
    }
}

/// Render error as structured JSON.
#[must_use]
pub fn render_error_json(error: &StagehandError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error))
}

// =============================================================================
// Text Rendering
// =============================================================================

fn render_colored(error: &StagehandError) -> String {
    let mut lines = vec![format!(
        "{} {}",
        error.to_string().red().bold(),
        format!("[{}]", error.error_code()).dimmed()
    )];

    let suggestions = error.fix_suggestions();
    let commands: Vec<&String> = suggestions.iter().flat_map(|s| &s.commands).collect();
    if !commands.is_empty() {
        lines.push(String::new());
        lines.push("How to fix:".bold().to_string());
        for (i, cmd) in commands.iter().enumerate() {
            lines.push(format!("  {}. {}", i + 1, cmd.cyan()));
        }
    }

    if let Some(suggestion) = suggestions.first() {
        lines.push(String::new());
        lines.push("Why this happened:".yellow().to_string());
        lines.extend(wrap_text(&suggestion.context, 70).into_iter().map(|l| format!("  {l}")));
        if let Some(prevention) = &suggestion.prevention {
            lines.push(String::new());
            lines.push("Prevention:".green().to_string());
            lines.extend(wrap_text(prevention, 70).into_iter().map(|l| format!("  {l}")));
        }
    }

    lines.join("\n")
}

/// Render error as plain text (no ANSI codes).
fn render_simple(error: &StagehandError) -> String {
    let mut lines = vec![format!("Error [{}]: {}", error.error_code(), error)];
    if let Some(cmd) = error
        .fix_suggestions()
        .iter()
        .flat_map(|s| s.commands.iter())
        .next()
    {
        lines.push(format!("Fix: {cmd}"));
    }
    lines.join("\n")
}

// =============================================================================
// JSON Rendering
// =============================================================================

#[derive(Serialize)]
struct ErrorJson {
    error_code: &'static str,
    category: &'static str,
    message: String,
    exit_code: i32,
    suggestions: Vec<SuggestionJson>,
}

#[derive(Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
}

impl From<FixSuggestion> for SuggestionJson {
    fn from(s: FixSuggestion) -> Self {
        Self {
            commands: s.commands,
            context: s.context,
            prevention: s.prevention,
        }
    }
}

impl ErrorJson {
    fn from_error(error: &StagehandError) -> Self {
        Self {
            error_code: error.error_code(),
            category: error.kind().label(),
            message: error.to_string(),
            exit_code: error.exit_code().into(),
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(SuggestionJson::from)
                .collect(),
        }
    }
}

/// Greedy word wrap.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_error() -> StagehandError {
        StagehandError::PlanInvalid {
            path: "plan.toml".to_string(),
            message: "undeclared fixture 'ghost'".to_string(),
        }
    }

    #[test]
    fn simple_render_includes_code_and_fix() {
        let output = render_simple(&plan_error());
        assert!(output.starts_with("Error [STG-C003]"));
        assert!(output.contains("Fix: stagehand check plan.toml"));
        assert!(!output.contains('\x1b'));
    }

    #[test]
    fn no_color_renders_plain() {
        let output = render_error(&plan_error(), OutputFormat::Human, true, false);
        assert!(!output.contains('\x1b'));
    }

    #[test]
    fn json_render_includes_fields() {
        let output = render_error_json(&plan_error(), false);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["error_code"], "STG-C003");
        assert_eq!(parsed["category"], "configuration");
        assert_eq!(parsed["exit_code"], 2);
        assert!(parsed["suggestions"].is_array());
        assert!(parsed["suggestions"][0].get("prevention").is_some());
    }

    #[test]
    fn json_format_ignores_color_choice() {
        let output = render_error(&plan_error(), OutputFormat::Json, false, true);
        assert!(output.contains("\n  "));
        assert!(serde_json::from_str::<serde_json::Value>(&output).is_ok());
    }

    #[test]
    fn wrap_text_keeps_words() {
        assert_eq!(wrap_text("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }
}
