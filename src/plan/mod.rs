//! Declarative test plans for the `stagehand` binary.
//!
//! A plan is a TOML file describing services, fixtures and groups of leaf
//! cases:
//!
//! ```toml
//! [run]
//! name = "nightly"
//!
//! [[services]]
//! name = "db"
//!
//! [[fixtures]]
//! id = "config"
//! config = "default.toml"
//! context = true
//!
//! [[fixtures]]
//! id = "tables"
//! services = ["db"]
//!
//! [[tests]]
//! name = "ReaderTests"
//! fixtures = ["config", "tables"]   # outermost first
//! cases = ["reads", "rereads"]
//! failing = ["rereads"]
//! ```

pub mod build;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StagehandError};

pub use build::{BuildOptions, BuiltPlan, Execution, Trace, TraceAction, TraceEvent};

/// A parsed plan file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Plan {
    pub run: RunSection,
    pub services: Vec<ServiceSpec>,
    pub fixtures: Vec<FixtureSpec>,
    pub tests: Vec<TestGroupSpec>,
    /// Where the plan was read from, for error messages.
    #[serde(skip)]
    pub source: String,
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub name: String,
    /// Overrides the configured sibling merging when set.
    pub merge: Option<bool>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            name: "plan".to_string(),
            merge: None,
        }
    }
}

/// `[[services]]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSpec {
    pub name: String,
    pub fail_start: bool,
    pub fail_stop: bool,
}

/// `[[fixtures]]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixtureSpec {
    pub id: String,
    /// Merge key; defaults to `id`.
    pub key: Option<String>,
    /// Configuration file identity narrowing the merge key.
    pub config: Option<String>,
    /// Services active around setup and teardown.
    pub services: Vec<String>,
    /// Bind the thread execution context around setup and teardown.
    pub context: bool,
    /// Never share or merge this fixture.
    pub private: bool,
    pub fail_setup: bool,
    pub fail_teardown: bool,
}

impl FixtureSpec {
    /// Effective merge key name.
    #[must_use]
    pub fn key_name(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.id)
    }
}

/// `[[tests]]` entry: a group of leaf cases wrapped in fixtures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestGroupSpec {
    pub name: String,
    /// Fixture ids, outermost first.
    pub fixtures: Vec<String>,
    pub cases: Vec<String>,
    /// Cases that fail their assertion.
    pub failing: Vec<String>,
    /// Cases that raise an error.
    pub erroring: Vec<String>,
    /// Suffix appended to every case name.
    pub suffix: Option<String>,
}

impl Plan {
    /// Read and validate a plan file.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(?path, "Loading plan");
        let content = fs::read_to_string(path).map_err(|e| StagehandError::PlanInvalid {
            path: path.display().to_string(),
            message: format!("cannot read file: {e}"),
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse and validate plan text; `source` names it in errors.
    pub fn parse(content: &str, source: &str) -> Result<Self> {
        let mut plan: Self = toml::from_str(content).map_err(|e| StagehandError::PlanInvalid {
            path: source.to_string(),
            message: e.to_string(),
        })?;
        plan.source = source.to_string();
        plan.validate()?;
        Ok(plan)
    }

    /// Check references and uniqueness.
    pub fn validate(&self) -> Result<()> {
        if self.tests.is_empty() {
            return Err(self.invalid("plan declares no [[tests]]"));
        }

        let services = unique(self.services.iter().map(|s| s.name.as_str()))
            .map_err(|name| self.invalid(format!("duplicate service '{name}'")))?;
        let fixtures = unique(self.fixtures.iter().map(|f| f.id.as_str()))
            .map_err(|id| self.invalid(format!("duplicate fixture '{id}'")))?;

        for fixture in &self.fixtures {
            if fixture.id.trim().is_empty() {
                return Err(self.invalid("fixture with empty id"));
            }
            let undeclared = fixture
                .services
                .iter()
                .find(|s| !services.contains(s.as_str()));
            if let Some(missing) = undeclared {
                return Err(self.invalid(format!(
                    "fixture '{}' uses undeclared service '{missing}'",
                    fixture.id
                )));
            }
        }

        for group in &self.tests {
            if group.name.trim().is_empty() {
                return Err(self.invalid("test group with empty name"));
            }
            let undeclared = group
                .fixtures
                .iter()
                .find(|f| !fixtures.contains(f.as_str()));
            if let Some(missing) = undeclared {
                return Err(self.invalid(format!(
                    "test group '{}' uses undeclared fixture '{missing}'",
                    group.name
                )));
            }
            unique(group.fixtures.iter().map(String::as_str)).map_err(|id| {
                self.invalid(format!(
                    "test group '{}' lists fixture '{id}' twice",
                    group.name
                ))
            })?;
            let cases = unique(group.cases.iter().map(String::as_str)).map_err(|case| {
                self.invalid(format!(
                    "test group '{}' lists case '{case}' twice",
                    group.name
                ))
            })?;
            if let Some(unknown) = group
                .failing
                .iter()
                .chain(&group.erroring)
                .find(|c| !cases.contains(c.as_str()))
            {
                return Err(self.invalid(format!(
                    "test group '{}' marks unknown case '{unknown}'",
                    group.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a fixture by id.
    #[must_use]
    pub fn fixture(&self, id: &str) -> Option<&FixtureSpec> {
        self.fixtures.iter().find(|f| f.id == id)
    }

    fn invalid(&self, message: impl Into<String>) -> StagehandError {
        StagehandError::PlanInvalid {
            path: self.source.clone(),
            message: message.into(),
        }
    }
}

/// Collect names, returning the first duplicate as an error.
fn unique<'a>(
    names: impl Iterator<Item = &'a str>,
) -> std::result::Result<HashSet<&'a str>, &'a str> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(name);
        }
    }
    Ok(seen)
}
