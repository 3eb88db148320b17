//! Naming and diagnostic wrappers.

use std::time::Instant;

use super::engine::{Test, TestResult};
use super::fixture::FixtureNode;

/// A composite shown under a different name.
///
/// Sibling merging sees through the wrapper to a fixture it holds.
pub struct Named {
    name: String,
    inner: Box<dyn Test>,
}

impl Named {
    pub fn new(name: impl Into<String>, inner: impl Test + 'static) -> Self {
        Self {
            name: name.into(),
            inner: Box::new(inner),
        }
    }
}

impl std::fmt::Debug for Named {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Named")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Test for Named {
    fn name(&self) -> &str {
        &self.name
    }

    fn count_test_cases(&self) -> usize {
        self.inner.count_test_cases()
    }

    fn run(&mut self, result: &mut TestResult) {
        self.inner.run(result);
    }

    fn children(&self) -> Vec<&dyn Test> {
        self.inner.children()
    }

    fn rearrange(&mut self) {
        self.inner.rearrange();
    }

    fn enrich_names(&mut self, suffix: &str) {
        self.inner.enrich_names(suffix);
    }

    fn as_fixture_mut(&mut self) -> Option<&mut FixtureNode> {
        self.inner.as_fixture_mut()
    }
}

/// Append `suffix` to every leaf name below `test`.
///
/// Used when the same tests run once per configuration, so their results
/// stay distinguishable.
pub fn enrich_names(test: &mut dyn Test, suffix: &str) {
    tracing::debug!(test = test.name(), suffix, "Enriching test names");
    test.enrich_names(suffix);
}

/// Runs a subtree inside a tracing span and logs its duration.
///
/// Like [`Named`], it is transparent to sibling merging.
pub struct Traced {
    inner: Box<dyn Test>,
}

impl Traced {
    pub fn new(inner: impl Test + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl std::fmt::Debug for Traced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traced")
            .field("inner", &self.inner.name())
            .finish()
    }
}

impl Test for Traced {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn count_test_cases(&self) -> usize {
        self.inner.count_test_cases()
    }

    fn run(&mut self, result: &mut TestResult) {
        let span = tracing::info_span!("subtree", name = %self.inner.name());
        let _entered = span.enter();

        let started = Instant::now();
        let problems_before = result.failure_count() + result.error_count();
        let runs_before = result.run_count();

        self.inner.run(result);

        let problems = result.failure_count() + result.error_count() - problems_before;
        tracing::info!(
            tests = result.run_count() - runs_before,
            problems,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Subtree finished"
        );
    }

    fn children(&self) -> Vec<&dyn Test> {
        self.inner.children()
    }

    fn rearrange(&mut self) {
        self.inner.rearrange();
    }

    fn enrich_names(&mut self, suffix: &str) {
        self.inner.enrich_names(suffix);
    }

    fn as_fixture_mut(&mut self) -> Option<&mut FixtureNode> {
        self.inner.as_fixture_mut()
    }
}
