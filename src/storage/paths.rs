//! Application paths.

use std::path::PathBuf;

use directories::ProjectDirs;

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
}

impl AppPaths {
    /// Platform paths for stagehand; `None` when no home directory is known.
    #[must_use]
    pub fn new() -> Option<Self> {
        ProjectDirs::from("dev", "stagehand", "stagehand").map(|dirs| Self {
            config: dirs.config_dir().to_path_buf(),
        })
    }

    /// Path to the config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }
}
