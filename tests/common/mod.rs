//! Common helpers for integration tests.
//!
//! - `log_capture`: tracing capture layer for asserting on emitted logs
//! - [`stagehand_cmd`]: the binary under an isolated environment

#![allow(dead_code)]

pub mod log_capture;

use assert_cmd::Command;

/// The `stagehand` binary with config and environment isolated from the host.
pub fn stagehand_cmd() -> Command {
    let mut cmd = Command::cargo_bin("stagehand").expect("binary builds");
    cmd.env("STAGEHAND_CONFIG", "/nonexistent/stagehand/config.toml")
        .env("NO_COLOR", "1")
        .env_remove("STAGEHAND_MERGE")
        .env_remove("STAGEHAND_LIFECYCLE")
        .env_remove("STAGEHAND_FORMAT")
        .env_remove("STAGEHAND_PRETTY")
        .env_remove("STAGEHAND_LOG")
        .env_remove("STAGEHAND_LOG_FORMAT")
        .env_remove("STAGEHAND_LOG_FILE")
        .env_remove("RUST_LOG");
    cmd
}
