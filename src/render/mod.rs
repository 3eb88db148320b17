//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::core::{Failure, Test};
use crate::error::Result;
use crate::plan::{Execution, TraceEvent};

/// Schema version of JSON reports.
pub const SCHEMA_VERSION: &str = "stagehand.v1";

/// One recorded failure or error, flattened for output.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemReport {
    pub test: String,
    pub phase: &'static str,
    pub kind: &'static str,
    pub code: &'static str,
    pub message: String,
}

impl From<&Failure> for ProblemReport {
    fn from(failure: &Failure) -> Self {
        Self {
            test: failure.test.clone(),
            phase: failure.phase.label(),
            kind: failure.kind().label(),
            code: failure.error.error_code(),
            message: failure.error.to_string(),
        }
    }
}

/// Summary of one plan run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: &'static str,
    pub plan: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub tests_run: usize,
    pub successful: bool,
    pub failures: Vec<ProblemReport>,
    pub errors: Vec<ProblemReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub still_active: Vec<String>,
    pub trace: Vec<TraceEvent>,
}

impl RunReport {
    #[must_use]
    pub fn new(
        plan: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        execution: &Execution,
    ) -> Self {
        let result = &execution.result;
        Self {
            schema_version: SCHEMA_VERSION,
            plan: plan.into(),
            started_at,
            duration_ms,
            tests_run: result.run_count(),
            successful: result.was_successful() && execution.still_active.is_empty(),
            failures: result.failures().iter().map(ProblemReport::from).collect(),
            errors: result.errors().iter().map(ProblemReport::from).collect(),
            still_active: execution.still_active.clone(),
            trace: execution.trace.clone(),
        }
    }

    /// Total failures plus errors.
    #[must_use]
    pub fn problem_count(&self) -> usize {
        self.failures.len() + self.errors.len()
    }
}

/// Shape of a built test tree, for `check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub cases: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Snapshot `test` and everything beneath it.
    #[must_use]
    pub fn from_test(test: &dyn Test) -> Self {
        Self {
            name: test.name().to_string(),
            cases: test.count_test_cases(),
            children: test.children().into_iter().map(Self::from_test).collect(),
        }
    }
}

/// Render a run report.
pub fn render_report(
    report: &RunReport,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_report(report, no_color)),
        OutputFormat::Json => robot::render_report_json(report, pretty),
    }
}

/// Render a plan tree.
pub fn render_tree(
    tree: &TreeNode,
    format: OutputFormat,
    pretty: bool,
    no_color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_tree(tree, no_color)),
        OutputFormat::Json => robot::render_tree_json(tree, pretty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FixtureNode, FnAction, TestCase, TestSuite};

    #[test]
    fn tree_follows_children() {
        let suite = TestSuite::new("root").with(
            FixtureNode::builder(
                TestSuite::new("inner")
                    .with(TestCase::new("a", || Ok(())))
                    .with(TestCase::new("b", || Ok(()))),
                FnAction::new(|| Ok(()), || Ok(())),
            )
            .name("config")
            .build(),
        );
        let tree = TreeNode::from_test(&suite);

        assert_eq!(tree.name, "root");
        assert_eq!(tree.cases, 2);
        assert_eq!(tree.children[0].name, "config");
        assert_eq!(tree.children[0].children[0].children.len(), 2);
    }
}
