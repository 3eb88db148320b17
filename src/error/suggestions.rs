//! Fix suggestions for stagehand errors.
//!
//! Maps error variants to actionable next steps shown by the CLI.

use super::StagehandError;

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Commands to try, in order of preference.
    pub commands: Vec<String>,

    /// Why the error occurred.
    pub context: String,

    /// How to avoid it next time.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

fn plan_invalid_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!("stagehand check {path}")],
            "The plan could not be parsed or references something it never declares. \
             Every fixture a test group lists must appear under [[fixtures]], and every \
             service a fixture uses must appear under [[services]].",
        )
        .with_prevention("Run `stagehand check` before committing plan changes."),
    ]
}

fn config_suggestions(path: Option<&str>) -> Vec<FixSuggestion> {
    let mut commands = Vec::new();
    if let Some(path) = path {
        commands.push(format!("$EDITOR {path}"));
    }
    commands.push("STAGEHAND_CONFIG=/dev/null stagehand run <plan>".to_string());
    vec![FixSuggestion::new(
        commands,
        "The configuration file is not valid TOML or contains an unsupported value. \
         Known output formats are `human` and `json`.",
    )]
}

fn unknown_service_suggestions(name: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![],
        format!(
            "No service named '{name}' is registered. Services must be registered with \
             the provider before a fixture activates them."
        ),
    )]
}

fn contract_suggestions() -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![],
            "A fixture was exited more often than it was entered. This points at code \
             calling enter/exit by hand instead of letting the node run.",
        )
        .with_prevention("Drive fixtures through `Test::run` only."),
    ]
}

impl StagehandError {
    /// Suggestions for resolving this error, most useful first.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::PlanInvalid { path, .. } => plan_invalid_suggestions(path),
            Self::ConfigParse { path, .. } => config_suggestions(Some(path)),
            Self::Config(_) => config_suggestions(None),
            Self::UnknownService { name } => unknown_service_suggestions(name),
            Self::ContractViolation { .. } => contract_suggestions(),
            Self::SetupFailed { source, .. }
            | Self::ActivationFailed { source, .. }
            | Self::ObserverFailed { source, .. } => source.fix_suggestions(),
            _ => vec![],
        }
    }
}
