//! Integration tests for logging initialization.

use stagehand::core::logging::{self, LogFormat, LogSettings};
use tracing::Level;

#[test]
fn init_is_idempotent_across_formats() {
    for format in [LogFormat::Human, LogFormat::Json, LogFormat::Compact] {
        logging::init(&LogSettings {
            level: Level::DEBUG,
            format,
            file: None,
        });
    }
    tracing::debug!(target: "stagehand", "still logging after repeated init");
}
