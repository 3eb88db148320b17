//! Robot-mode output (JSON).
//!
//! Provides stable output for scripts and CI.

use serde::Serialize;

use super::{RunReport, SCHEMA_VERSION, TreeNode};
use crate::error::Result;

/// Render any serializable value as JSON.
pub fn render_json<T: Serialize>(output: &T) -> Result<String> {
    Ok(serde_json::to_string(output)?)
}

/// Render any serializable value as pretty JSON.
pub fn render_json_pretty<T: Serialize>(output: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(output)?)
}

fn render<T: Serialize>(output: &T, pretty: bool) -> Result<String> {
    if pretty {
        render_json_pretty(output)
    } else {
        render_json(output)
    }
}

/// Render a run report as JSON.
pub fn render_report_json(report: &RunReport, pretty: bool) -> Result<String> {
    render(report, pretty)
}

#[derive(Serialize)]
struct TreeOutput<'a> {
    schema_version: &'static str,
    command: &'static str,
    tree: &'a TreeNode,
}

/// Render a plan tree as JSON.
pub fn render_tree_json(tree: &TreeNode, pretty: bool) -> Result<String> {
    render(
        &TreeOutput {
            schema_version: SCHEMA_VERSION,
            command: "check",
            tree,
        },
        pretty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{BuildOptions, Plan};
    use chrono::Utc;

    const PLAN: &str = r#"
[[fixtures]]
id = "config"

[[tests]]
name = "Reader"
fixtures = ["config"]
cases = ["reads", "rereads"]
failing = ["rereads"]
"#;

    #[test]
    fn report_json_has_stable_fields() {
        let execution = Plan::parse(PLAN, "p.toml")
            .unwrap()
            .build(BuildOptions::default())
            .unwrap()
            .execute();
        let report = RunReport::new("p", Utc::now(), 1, &execution);
        let json = render_report_json(&report, false).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["schema_version"], SCHEMA_VERSION);
        assert_eq!(parsed["tests_run"], 2);
        assert_eq!(parsed["successful"], false);
        assert_eq!(parsed["failures"][0]["test"], "rereads");
        assert_eq!(parsed["failures"][0]["kind"], "assertion");
        assert_eq!(parsed["trace"][0]["action"], "setup");
        assert!(parsed.get("still_active").is_none());
    }

    #[test]
    fn tree_json_respects_pretty() {
        let tree = TreeNode {
            name: "plan".to_string(),
            cases: 0,
            children: vec![],
        };
        let compact = render_tree_json(&tree, false).unwrap();
        assert!(!compact.contains("\n  "));
        let pretty = render_tree_json(&tree, true).unwrap();
        assert!(pretty.contains("\n  "));
        assert!(pretty.contains("\"command\": \"check\""));
    }
}
