//! Human-readable output using `colored`.

use std::fmt::Write as _;

use colored::{Color, Colorize};

use super::{ProblemReport, RunReport, TreeNode};

/// Apply `color` unless colors are disabled.
fn paint(text: &str, color: Color, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.color(color).to_string()
    }
}

fn bold(text: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.bold().to_string()
    }
}

fn dim(text: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.dimmed().to_string()
    }
}

/// Render a run report for a terminal.
#[must_use]
pub fn render_report(report: &RunReport, no_color: bool) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} {}",
        bold("Plan", no_color),
        paint(&report.plan, Color::Cyan, no_color)
    );

    if !report.failures.is_empty() {
        output.push('\n');
        let _ = writeln!(output, "{}", bold("Failures", no_color));
        for problem in &report.failures {
            render_problem(&mut output, problem, Color::Yellow, no_color);
        }
    }

    if !report.errors.is_empty() {
        output.push('\n');
        let _ = writeln!(output, "{}", bold("Errors", no_color));
        for problem in &report.errors {
            render_problem(&mut output, problem, Color::Red, no_color);
        }
    }

    if !report.still_active.is_empty() {
        output.push('\n');
        let _ = writeln!(
            output,
            "{} {}",
            paint("Still active after run:", Color::Red, no_color),
            report.still_active.join(", ")
        );
    }

    output.push('\n');
    let verdict = if report.successful {
        paint("OK", Color::Green, no_color)
    } else {
        paint("FAILED", Color::Red, no_color)
    };
    let _ = writeln!(
        output,
        "{verdict} {} run, {} failed, {} errors {}",
        report.tests_run,
        report.failures.len(),
        report.errors.len(),
        dim(&format!("({} ms)", report.duration_ms), no_color)
    );
    output
}

fn render_problem(output: &mut String, problem: &ProblemReport, color: Color, no_color: bool) {
    let _ = writeln!(
        output,
        "  {} {} {}",
        paint("✗", color, no_color),
        bold(&problem.test, no_color),
        dim(&format!("[{} {}]", problem.phase, problem.code), no_color)
    );
    let _ = writeln!(output, "    {}", problem.message);
}

/// Render a test tree as an indented outline.
#[must_use]
pub fn render_tree(tree: &TreeNode, no_color: bool) -> String {
    let mut output = String::new();
    render_node(&mut output, tree, 0, no_color);
    output
}

fn render_node(output: &mut String, node: &TreeNode, depth: usize, no_color: bool) {
    let indent = "  ".repeat(depth);
    if node.children.is_empty() {
        let _ = writeln!(output, "{indent}- {}", node.name);
        return;
    }
    let _ = writeln!(
        output,
        "{indent}{} {}",
        paint(&node.name, Color::Cyan, no_color),
        dim(&format!("({} cases)", node.cases), no_color)
    );
    for child in &node.children {
        render_node(output, child, depth + 1, no_color);
    }
}
