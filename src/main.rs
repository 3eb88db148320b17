//! stagehand - fixture lifecycle coordinator
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::process::ExitCode;

use clap::Parser;

use stagehand::cli::{Cli, Commands};
use stagehand::core::logging::{self, LogFormat, LogSettings};
use stagehand::storage::ResolvedConfig;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = cli.effective_format();

    let resolved = ResolvedConfig::resolve(&cli);

    let mut settings = LogSettings::default();
    if let Some(level) = resolved
        .as_ref()
        .ok()
        .and_then(|config| config.log_level.as_deref())
        .and_then(logging::parse_level)
    {
        settings.level = level;
    }
    let mut settings = settings
        .with_env()
        .with_cli(cli.log_level.as_deref(), cli.verbose);
    if cli.json_output {
        settings.format = LogFormat::Json;
    }
    logging::init(&settings);

    let result = resolved.and_then(|config| run(&cli, &config));

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            let no_color = cli.no_color || !stagehand::util::env::should_use_color(cli.no_color);
            let output = stagehand::render::error::render_error(&e, format, no_color, cli.pretty);
            eprintln!("{output}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: &Cli, config: &ResolvedConfig) -> stagehand::Result<stagehand::ExitCode> {
    let mut config = config.clone();
    config.no_color = config.no_color || !stagehand::util::env::should_use_color(false);

    match &cli.command {
        None => {
            print_quickstart();
            Ok(stagehand::ExitCode::Success)
        }
        Some(Commands::Run(args)) => stagehand::cli::run::execute(args, &config),
        Some(Commands::Check(args)) => stagehand::cli::check::execute(args, &config),
        Some(Commands::Config) => stagehand::cli::config::execute(&config),
    }
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r"stagehand - fixture lifecycle coordinator

Runs declarative test plans whose fixtures are set up once per active period
and torn down when their last consumer finishes.

USAGE:
    stagehand [OPTIONS] <COMMAND>

COMMANDS:
    run <PLAN>      Build a plan, run it and report the outcome
    check <PLAN>    Validate a plan and print its test tree
    config          Show the resolved configuration

QUICK START:
    stagehand check plan.toml           # Show what the plan builds
    stagehand run plan.toml             # Run it
    stagehand run plan.toml --no-merge  # Keep sibling fixtures separate

ROBOT MODE:
    stagehand run plan.toml --json      # JSON report

For more help: stagehand --help
"
    );
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
}
