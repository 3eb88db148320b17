//! Check command implementation.

use crate::cli::args::CheckArgs;
use crate::cli::run::effective_merge;
use crate::core::Test;
use crate::error::{ExitCode, Result};
use crate::plan::{BuildOptions, Plan};
use crate::render::{TreeNode, render_tree};
use crate::storage::ResolvedConfig;

/// Validate a plan and print the tree it builds.
pub fn execute(args: &CheckArgs, config: &ResolvedConfig) -> Result<ExitCode> {
    let tree = plan_tree(args, config)?;
    let output = render_tree(&tree, config.format, config.pretty, config.no_color)?;
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(ExitCode::Success)
}

/// Shape of the tree the plan builds, after any merging.
pub fn plan_tree(args: &CheckArgs, config: &ResolvedConfig) -> Result<TreeNode> {
    let plan = Plan::load(&args.plan)?;
    let built = plan.build(BuildOptions {
        merge: effective_merge(&plan, config),
        report_lifecycle: false,
    })?;
    tracing::debug!(plan = %built.name, cases = built.root.count_test_cases(), "Plan checked");
    Ok(TreeNode::from_test(&*built.root))
}
