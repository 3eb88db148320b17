//! CLI argument parsing and command dispatch.

pub mod args;
pub mod check;
pub mod config;
pub mod run;

pub use args::{Cli, Commands, OutputFormat};
