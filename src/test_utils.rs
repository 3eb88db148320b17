//! Test utilities for stagehand.
//!
//! Provides recording fixtures, decorators, observers and service providers
//! that write into a shared [`EventLog`], leaf test factories, temporary plan
//! directories, and assertion macros.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stagehand::test_utils::*;
//!
//! let log = EventLog::new();
//! let registry = stagehand::core::CounterRegistry::new();
//! let node = stagehand::wrap(
//!     passing_case("reads", &log),
//!     RecordingFixture::new("config", &log),
//!     &registry,
//! );
//! ```

use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;

use crate::core::{Decorator, LifecycleObserver, ServiceProvider, SetupAction, TestCase};
use crate::error::{Result, StagehandError};

// =============================================================================
// Event log
// =============================================================================

/// Ordered, thread-safe list of events shared by test doubles.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.lock().push(event.into());
    }

    /// Snapshot of all events.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Number of events equal to `event`.
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.lock().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Fixture logging `setup:<label>` and `teardown:<label>`.
#[derive(Debug, Clone)]
pub struct RecordingFixture {
    label: String,
    log: EventLog,
}

impl RecordingFixture {
    #[must_use]
    pub fn new(label: impl Into<String>, log: &EventLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
        }
    }
}

impl SetupAction for RecordingFixture {
    fn set_up(&mut self) -> Result<()> {
        self.log.push(format!("setup:{}", self.label));
        Ok(())
    }

    fn tear_down(&mut self) -> Result<()> {
        self.log.push(format!("teardown:{}", self.label));
        Ok(())
    }
}

/// Fixture that records like [`RecordingFixture`] and fails on demand.
#[derive(Debug, Clone)]
pub struct FailingFixture {
    label: String,
    log: EventLog,
    fail_setup: bool,
    fail_teardown: bool,
    panic_setup: bool,
}

impl FailingFixture {
    /// Fixture whose setup fails.
    #[must_use]
    pub fn setup(label: impl Into<String>, log: &EventLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
            fail_setup: true,
            fail_teardown: false,
            panic_setup: false,
        }
    }

    /// Fixture whose teardown fails.
    #[must_use]
    pub fn teardown(label: impl Into<String>, log: &EventLog) -> Self {
        Self {
            fail_setup: false,
            fail_teardown: true,
            ..Self::setup(label, log)
        }
    }

    /// Fixture whose setup panics.
    #[must_use]
    pub fn panicking(label: impl Into<String>, log: &EventLog) -> Self {
        Self {
            fail_setup: false,
            panic_setup: true,
            ..Self::setup(label, log)
        }
    }
}

impl SetupAction for FailingFixture {
    fn set_up(&mut self) -> Result<()> {
        self.log.push(format!("setup:{}", self.label));
        assert!(!self.panic_setup, "setup of {} panicked", self.label);
        if self.fail_setup {
            return Err(anyhow!("{} unavailable", self.label).into());
        }
        Ok(())
    }

    fn tear_down(&mut self) -> Result<()> {
        self.log.push(format!("teardown:{}", self.label));
        if self.fail_teardown {
            return Err(anyhow!("{} refused to shut down", self.label).into());
        }
        Ok(())
    }
}

// =============================================================================
// Decorators, observers, providers
// =============================================================================

/// Decorator logging `<label>:enter-setup`, `<label>:exit-setup` and the
/// teardown equivalents around the inner action.
#[derive(Debug, Clone)]
pub struct RecordingDecorator {
    label: String,
    log: EventLog,
}

impl RecordingDecorator {
    #[must_use]
    pub fn new(label: impl Into<String>, log: &EventLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
        }
    }

    /// Shared handle for builder APIs.
    #[must_use]
    pub fn shared(self) -> crate::core::SharedDecorator {
        Arc::new(self)
    }
}

impl Decorator for RecordingDecorator {
    fn set_up(&self, action: &mut dyn SetupAction) -> Result<()> {
        self.log.push(format!("{}:enter-setup", self.label));
        let outcome = action.set_up();
        self.log.push(format!("{}:exit-setup", self.label));
        outcome
    }

    fn tear_down(&self, action: &mut dyn SetupAction) -> Result<()> {
        self.log.push(format!("{}:enter-teardown", self.label));
        let outcome = action.tear_down();
        self.log.push(format!("{}:exit-teardown", self.label));
        outcome
    }
}

/// Observer logging `start:<test>` and `end:<test>`.
#[derive(Debug, Clone)]
pub struct RecordingObserver {
    log: EventLog,
    fail_on_start: Option<String>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            fail_on_start: None,
        }
    }

    /// Fail the start notification of `test`.
    #[must_use]
    pub fn failing_on_start(mut self, test: impl Into<String>) -> Self {
        self.fail_on_start = Some(test.into());
        self
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_start(&mut self, test: &str) -> Result<()> {
        self.log.push(format!("start:{test}"));
        if self.fail_on_start.as_deref() == Some(test) {
            return Err(anyhow!("observer rejected {test}").into());
        }
        Ok(())
    }

    fn on_end(&mut self, test: &str) -> Result<()> {
        self.log.push(format!("end:{test}"));
        Ok(())
    }
}

/// Service provider logging `activate:<a,b>` and `deactivate:<a,b>`.
#[derive(Debug, Clone)]
pub struct RecordingProvider {
    log: EventLog,
    fail_activate: bool,
    fail_deactivate: bool,
}

impl RecordingProvider {
    #[must_use]
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            fail_activate: false,
            fail_deactivate: false,
        }
    }

    #[must_use]
    pub const fn failing_activation(mut self) -> Self {
        self.fail_activate = true;
        self
    }

    #[must_use]
    pub const fn failing_deactivation(mut self) -> Self {
        self.fail_deactivate = true;
        self
    }
}

impl ServiceProvider for RecordingProvider {
    fn activate(&self, services: &[String]) -> Result<()> {
        self.log.push(format!("activate:{}", services.join(",")));
        if self.fail_activate {
            return Err(anyhow!("cannot start {}", services.join(",")).into());
        }
        Ok(())
    }

    fn deactivate(&self, services: &[String]) -> Result<()> {
        self.log.push(format!("deactivate:{}", services.join(",")));
        if self.fail_deactivate {
            return Err(anyhow!("cannot stop {}", services.join(",")).into());
        }
        Ok(())
    }
}

// =============================================================================
// Leaf test factories
// =============================================================================

/// Leaf test logging `run:<name>` and passing.
#[must_use]
pub fn passing_case(name: &str, log: &EventLog) -> TestCase {
    let (label, log) = (name.to_string(), log.clone());
    TestCase::new(name, move || {
        log.push(format!("run:{label}"));
        Ok(())
    })
}

/// Leaf test logging `run:<name>` and failing its assertion.
#[must_use]
pub fn failing_case(name: &str, log: &EventLog) -> TestCase {
    let (label, log) = (name.to_string(), log.clone());
    TestCase::new(name, move || {
        log.push(format!("run:{label}"));
        Err(StagehandError::assertion(format!("{label} did not hold")))
    })
}

/// Leaf test logging `run:<name>` and raising an error.
#[must_use]
pub fn erroring_case(name: &str, log: &EventLog) -> TestCase {
    let (label, log) = (name.to_string(), log.clone());
    TestCase::new(name, move || {
        log.push(format!("run:{label}"));
        Err(anyhow!("{label} blew up").into())
    })
}

// =============================================================================
// Temporary directories
// =============================================================================

/// An isolated temporary directory, removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Write a file, creating parent directories, and return its path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
        path
    }

    /// Full path of `name` inside the directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// A plan with two groups sharing a context-bound config fixture and a
/// service-backed tables fixture; one case fails.
#[must_use]
pub fn make_test_plan_toml() -> String {
    r#"[run]
name = "sample"

[[services]]
name = "db"

[[fixtures]]
id = "config"
config = "default.toml"
context = true

[[fixtures]]
id = "tables"
services = ["db"]

[[tests]]
name = "ReaderTests"
fixtures = ["config", "tables"]
cases = ["reads", "rereads"]

[[tests]]
name = "WriterTests"
fixtures = ["config", "tables"]
cases = ["writes"]
failing = ["writes"]
"#
    .to_string()
}

/// A plan where every case passes.
#[must_use]
pub fn make_passing_plan_toml() -> String {
    r#"[run]
name = "green"

[[fixtures]]
id = "config"

[[tests]]
name = "A"
fixtures = ["config"]
cases = ["one", "two"]
"#
    .to_string()
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string is valid JSON.
#[macro_export]
macro_rules! assert_json_valid {
    ($json:expr) => {
        let json = $json;
        if let Err(e) = serde_json::from_str::<serde_json::Value>(json) {
            panic!(
                "Expected valid JSON, but parsing failed: {}\n\nJSON string:\n{}",
                e, json
            );
        }
    };
}

/// Assert that a string does NOT contain ANSI escape codes.
#[macro_export]
macro_rules! assert_no_ansi_codes {
    ($text:expr) => {
        let text = $text;
        assert!(
            !text.contains('\x1b'),
            "Expected string to NOT contain ANSI escape codes.\n\nActual string:\n{:?}",
            text
        );
    };
}
