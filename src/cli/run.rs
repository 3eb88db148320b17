//! Run command implementation.

use std::time::Instant;

use chrono::Utc;

use crate::cli::args::RunArgs;
use crate::error::{ExitCode, Result};
use crate::plan::{BuildOptions, Plan};
use crate::render::{RunReport, render_report};
use crate::storage::ResolvedConfig;

/// Execute the run command and print the report.
pub fn execute(args: &RunArgs, config: &ResolvedConfig) -> Result<ExitCode> {
    let (report, code) = run_plan(args, config)?;
    let output = render_report(&report, config.format, config.pretty, config.no_color)?;
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(code)
}

/// Load, build and run the plan, returning the report and the exit code it
/// implies.
pub fn run_plan(args: &RunArgs, config: &ResolvedConfig) -> Result<(RunReport, ExitCode)> {
    let plan = Plan::load(&args.plan)?;
    let options = build_options(&plan, args, config);

    let started_at = Utc::now();
    let started = Instant::now();
    let execution = plan.build(options)?.execute();
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut report = RunReport::new(&plan.run.name, started_at, duration_ms, &execution);
    if args.no_trace {
        report.trace.clear();
    }
    tracing::info!(
        plan = %report.plan,
        tests = report.tests_run,
        problems = report.problem_count(),
        duration_ms,
        "Plan finished"
    );

    let code = if report.successful {
        ExitCode::Success
    } else {
        ExitCode::TestsFailed
    };
    Ok((report, code))
}

/// Sibling merging: an explicit CLI or env choice wins over the plan's own
/// `[run] merge`, which wins over the config file.
pub(crate) fn effective_merge(plan: &Plan, config: &ResolvedConfig) -> bool {
    match plan.run.merge {
        Some(merge) if !config.sources.merge.is_explicit() => merge,
        _ => config.merge,
    }
}

fn build_options(plan: &Plan, args: &RunArgs, config: &ResolvedConfig) -> BuildOptions {
    BuildOptions {
        merge: effective_merge(plan, config),
        report_lifecycle: args.lifecycle || config.report_lifecycle,
    }
}
