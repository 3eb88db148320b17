//! Minimal test execution engine.
//!
//! Provides the capabilities the coordinator consumes: running leaf tests and
//! recording their outcome, registering lifecycle listeners on the active run,
//! and failing a test with a message and cause. Composite tests
//! ([`TestSuite`], [`FixtureNode`](super::fixture::FixtureNode), wrappers in
//! [`named`](super::named) and [`reporter`](super::reporter)) run their
//! children strictly in order on the calling thread.

use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};

use super::fixture::{FixtureNode, merge_siblings};
use crate::error::{ErrorKind, Result, StagehandError};

// =============================================================================
// Test trait
// =============================================================================

/// A node of the test tree: a leaf case or a composite.
pub trait Test {
    /// Display name used when attributing outcomes.
    fn name(&self) -> &str;

    /// Number of leaf cases below (and including) this node.
    fn count_test_cases(&self) -> usize;

    /// Run the node, recording every outcome on `result`.
    fn run(&mut self, result: &mut TestResult);

    /// Direct children, for tree rendering.
    fn children(&self) -> Vec<&dyn Test> {
        Vec::new()
    }

    /// Merge sibling fixture nodes with equal merge keys, recursively.
    fn rearrange(&mut self) {}

    /// Append `suffix` to the names of all leaf cases below this node.
    fn enrich_names(&mut self, _suffix: &str) {}

    /// Access this node as a fixture node, if it is one.
    fn as_fixture_mut(&mut self) -> Option<&mut FixtureNode> {
        None
    }
}

impl<T: Test + ?Sized> Test for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn count_test_cases(&self) -> usize {
        (**self).count_test_cases()
    }

    fn run(&mut self, result: &mut TestResult) {
        (**self).run(result);
    }

    fn children(&self) -> Vec<&dyn Test> {
        (**self).children()
    }

    fn rearrange(&mut self) {
        (**self).rearrange();
    }

    fn enrich_names(&mut self, suffix: &str) {
        (**self).enrich_names(suffix);
    }

    fn as_fixture_mut(&mut self) -> Option<&mut FixtureNode> {
        (**self).as_fixture_mut()
    }
}

// =============================================================================
// Leaf tests
// =============================================================================

/// Body of a leaf test.
pub type TestBody = Box<dyn FnMut() -> Result<()>>;

/// A leaf test case backed by a closure.
///
/// Returning [`StagehandError::AssertionFailed`] records a failure; any other
/// error or a panic records an error.
pub struct TestCase {
    name: String,
    body: TestBody,
}

impl TestCase {
    /// Create a leaf test.
    pub fn new(name: impl Into<String>, body: impl FnMut() -> Result<()> + 'static) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Test for TestCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn count_test_cases(&self) -> usize {
        1
    }

    fn run(&mut self, result: &mut TestResult) {
        result.start_test(&self.name);

        let body = &mut self.body;
        match panic::catch_unwind(AssertUnwindSafe(|| body())) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => result.record(&self.name, FailurePhase::Test, error),
            Err(payload) => result.add_error(
                &self.name,
                FailurePhase::Test,
                StagehandError::from_panic(payload.as_ref()),
            ),
        }

        result.end_test(&self.name);
    }

    fn enrich_names(&mut self, suffix: &str) {
        self.name = format!("{} ({suffix})", self.name);
    }
}

// =============================================================================
// Suites
// =============================================================================

/// An ordered composite of tests.
pub struct TestSuite {
    name: String,
    tests: Vec<Box<dyn Test>>,
    merge: bool,
}

impl TestSuite {
    /// Create an empty suite.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
            merge: true,
        }
    }

    /// Add a test (builder style).
    #[must_use]
    pub fn with(mut self, test: impl Test + 'static) -> Self {
        self.add(Box::new(test));
        self
    }

    /// Add a boxed test.
    pub fn add(&mut self, test: Box<dyn Test>) {
        self.tests.push(test);
    }

    /// Exclude this suite's direct children from sibling merging.
    #[must_use]
    pub const fn do_not_merge(mut self) -> Self {
        self.merge = false;
        self
    }

    /// Number of direct children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether the suite has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

impl std::fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("tests", &self.tests.len())
            .field("merge", &self.merge)
            .finish()
    }
}

impl Test for TestSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn count_test_cases(&self) -> usize {
        self.tests.iter().map(|t| t.count_test_cases()).sum()
    }

    fn run(&mut self, result: &mut TestResult) {
        for test in &mut self.tests {
            test.run(result);
        }
    }

    fn children(&self) -> Vec<&dyn Test> {
        self.tests.iter().map(|t| &**t).collect()
    }

    fn rearrange(&mut self) {
        if self.merge {
            let tests = std::mem::take(&mut self.tests);
            self.tests = merge_siblings(tests);
        }
        for test in &mut self.tests {
            test.rearrange();
        }
    }

    fn enrich_names(&mut self, suffix: &str) {
        for test in &mut self.tests {
            test.enrich_names(suffix);
        }
    }
}

// =============================================================================
// Recorded outcomes
// =============================================================================

/// The phase of execution a recorded problem belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    /// The body of a leaf test.
    Test,
    /// Establishing a fixture.
    Setup,
    /// Releasing a fixture.
    Teardown,
    /// A lifecycle observer callback.
    Observer,
}

impl FailurePhase {
    /// Stable label for output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Setup => "setup",
            Self::Teardown => "teardown",
            Self::Observer => "observer",
        }
    }
}

/// A failure or error attributed to a test.
#[derive(Debug)]
pub struct Failure {
    pub test: String,
    pub phase: FailurePhase,
    pub error: StagehandError,
}

impl Failure {
    /// Tagged kind, taking the phase into account.
    ///
    /// Teardown errors travel unwrapped, so the phase supplies their kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match (self.phase, self.error.kind()) {
            (_, ErrorKind::ContractViolation) => ErrorKind::ContractViolation,
            (FailurePhase::Teardown, _) => ErrorKind::TeardownFailure,
            (_, kind) => kind,
        }
    }
}

// =============================================================================
// Listeners
// =============================================================================

/// Observer of the run registered on a [`TestResult`].
///
/// Errors returned from `start_test`/`end_test` are recorded as errors
/// attributed to that test.
pub trait TestListener {
    fn start_test(&mut self, test: &str) -> Result<()>;

    fn end_test(&mut self, test: &str) -> Result<()>;

    fn add_error(&mut self, _failure: &Failure) {}

    fn add_failure(&mut self, _failure: &Failure) {}
}

/// Handle for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

// =============================================================================
// TestResult
// =============================================================================

/// Collects the outcome of a run and dispatches lifecycle events.
#[derive(Default)]
pub struct TestResult {
    run_count: usize,
    failures: Vec<Failure>,
    errors: Vec<Failure>,
    listeners: Vec<(ListenerId, Box<dyn TestListener>)>,
    next_listener: u64,
}

impl std::fmt::Debug for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestResult")
            .field("run_count", &self.run_count)
            .field("failures", &self.failures)
            .field("errors", &self.errors)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl TestResult {
    /// Create an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify listeners that a leaf test starts.
    pub fn start_test(&mut self, test: &str) {
        self.run_count += 1;
        let problems = self.notify(|listener| listener.start_test(test));
        for error in problems {
            self.add_error(test, FailurePhase::Observer, error);
        }
    }

    /// Notify listeners that a leaf test ended.
    pub fn end_test(&mut self, test: &str) {
        let problems = self.notify(|listener| listener.end_test(test));
        for error in problems {
            self.add_error(test, FailurePhase::Observer, error);
        }
    }

    fn notify(
        &mut self,
        mut event: impl FnMut(&mut dyn TestListener) -> Result<()>,
    ) -> Vec<StagehandError> {
        self.listeners
            .iter_mut()
            .filter_map(|(_, listener)| event(listener.as_mut()).err())
            .collect()
    }

    /// Record an outcome, classifying assertions in test bodies as failures.
    pub fn record(&mut self, test: &str, phase: FailurePhase, error: StagehandError) {
        if phase == FailurePhase::Test && error.is_assertion() {
            self.add_failure(test, error);
        } else {
            self.add_error(test, phase, error);
        }
    }

    /// Fail `test` with an error.
    pub fn add_error(&mut self, test: &str, phase: FailurePhase, error: StagehandError) {
        tracing::debug!(test, phase = phase.label(), error = %error, "Recording error");
        let failure = Failure {
            test: test.to_string(),
            phase,
            error,
        };
        for (_, listener) in &mut self.listeners {
            listener.add_error(&failure);
        }
        self.errors.push(failure);
    }

    /// Fail `test` with an assertion failure.
    pub fn add_failure(&mut self, test: &str, error: StagehandError) {
        tracing::debug!(test, error = %error, "Recording failure");
        let failure = Failure {
            test: test.to_string(),
            phase: FailurePhase::Test,
            error,
        };
        for (_, listener) in &mut self.listeners {
            listener.add_failure(&failure);
        }
        self.failures.push(failure);
    }

    /// Register a listener until [`remove_listener`](Self::remove_listener).
    pub fn add_listener(&mut self, listener: Box<dyn TestListener>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Deregister a listener, returning it if it was registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> Option<Box<dyn TestListener>> {
        let index = self.listeners.iter().position(|(lid, _)| *lid == id)?;
        Some(self.listeners.remove(index).1)
    }

    /// Register a listener for the lifetime of the returned scope.
    pub fn scoped_listener(&mut self, listener: Box<dyn TestListener>) -> ListenerScope<'_> {
        let id = self.add_listener(listener);
        ListenerScope { result: self, id }
    }

    /// Number of listeners currently registered.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of leaf tests started.
    #[must_use]
    pub const fn run_count(&self) -> usize {
        self.run_count
    }

    /// Assertion failures.
    #[must_use]
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Errors (setup, teardown, observer, panics, other).
    #[must_use]
    pub fn errors(&self) -> &[Failure] {
        &self.errors
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Whether nothing failed.
    #[must_use]
    pub fn was_successful(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty()
    }

    /// Errors and failures recorded for one test name.
    pub fn problems_for<'a>(&'a self, test: &'a str) -> impl Iterator<Item = &'a Failure> + 'a {
        self.failures
            .iter()
            .chain(self.errors.iter())
            .filter(move |f| f.test == test)
    }
}

/// A listener registration that is released when dropped.
///
/// Dereferences to the underlying [`TestResult`], so the scope can be passed
/// wherever a `&mut TestResult` is expected.
pub struct ListenerScope<'a> {
    result: &'a mut TestResult,
    id: ListenerId,
}

impl ListenerScope<'_> {
    /// Id of the scoped listener.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }
}

impl Deref for ListenerScope<'_> {
    type Target = TestResult;

    fn deref(&self) -> &TestResult {
        self.result
    }
}

impl DerefMut for ListenerScope<'_> {
    fn deref_mut(&mut self) -> &mut TestResult {
        self.result
    }
}

impl Drop for ListenerScope<'_> {
    fn drop(&mut self) {
        self.result.remove_listener(self.id);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
        fail_on_start: bool,
    }

    impl TestListener for Recorder {
        fn start_test(&mut self, test: &str) -> Result<()> {
            self.events.borrow_mut().push(format!("start:{test}"));
            if self.fail_on_start {
                return Err(StagehandError::Config("listener".to_string()));
            }
            Ok(())
        }

        fn end_test(&mut self, test: &str) -> Result<()> {
            self.events.borrow_mut().push(format!("end:{test}"));
            Ok(())
        }

        fn add_error(&mut self, failure: &Failure) {
            self.events
                .borrow_mut()
                .push(format!("error:{}", failure.test));
        }
    }

    #[test]
    fn leaf_outcomes_are_classified() {
        let mut suite = TestSuite::new("suite")
            .with(TestCase::new("pass", || Ok(())))
            .with(TestCase::new("fail", || Err(StagehandError::assertion("no"))))
            .with(TestCase::new("error", || {
                Err(StagehandError::Config("broken".to_string()))
            }))
            .with(TestCase::new("panic", || panic!("kaboom")));

        let mut result = TestResult::new();
        suite.run(&mut result);

        assert_eq!(result.run_count(), 4);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.error_count(), 2);
        assert_eq!(result.failures()[0].test, "fail");
        assert!(result.errors()[1].error.to_string().contains("kaboom"));
        assert!(!result.was_successful());
    }

    #[test]
    fn listener_errors_are_attributed_to_the_test() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut result = TestResult::new();
        result.add_listener(Box::new(Recorder {
            events: Rc::clone(&events),
            fail_on_start: true,
        }));

        let mut test = TestCase::new("leaf", || Ok(()));
        test.run(&mut result);

        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors()[0].phase, FailurePhase::Observer);
        assert_eq!(
            *events.borrow(),
            vec!["start:leaf", "error:leaf", "end:leaf"]
        );
    }

    #[test]
    fn scoped_listener_is_removed_on_drop() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut result = TestResult::new();
        {
            let mut scope = result.scoped_listener(Box::new(Recorder {
                events: Rc::clone(&events),
                fail_on_start: false,
            }));
            assert_eq!(scope.listener_count(), 1);
            TestCase::new("inside", || Ok(())).run(&mut scope);
        }
        assert_eq!(result.listener_count(), 0);

        TestCase::new("outside", || Ok(())).run(&mut result);
        assert_eq!(*events.borrow(), vec!["start:inside", "end:inside"]);
        assert_eq!(result.run_count(), 2);
    }

    #[test]
    fn remove_unknown_listener_returns_none() {
        let mut result = TestResult::new();
        let id = result.add_listener(Box::new(Recorder {
            events: Rc::new(RefCell::new(Vec::new())),
            fail_on_start: false,
        }));
        assert!(result.remove_listener(id).is_some());
        assert!(result.remove_listener(id).is_none());
    }

    #[test]
    fn teardown_phase_sets_failure_kind() {
        let failure = Failure {
            test: "t".to_string(),
            phase: FailurePhase::Teardown,
            error: StagehandError::Config("leak".to_string()),
        };
        assert_eq!(failure.kind(), ErrorKind::TeardownFailure);

        let violation = Failure {
            test: "t".to_string(),
            phase: FailurePhase::Teardown,
            error: StagehandError::contract("underflow"),
        };
        assert_eq!(violation.kind(), ErrorKind::ContractViolation);
    }

    #[test]
    fn enrich_names_appends_suffix_to_leaves() {
        let mut suite = TestSuite::new("suite").with(TestCase::new("a", || Ok(())));
        suite.enrich_names("db2");
        assert_eq!(suite.children()[0].name(), "a (db2)");
        assert_eq!(suite.name(), "suite");
    }

    #[test]
    fn count_test_cases_sums_leaves() {
        let suite = TestSuite::new("outer")
            .with(TestCase::new("a", || Ok(())))
            .with(TestSuite::new("inner").with(TestCase::new("b", || Ok(()))));
        assert_eq!(suite.count_test_cases(), 2);
        assert_eq!(suite.len(), 2);
        assert!(!suite.is_empty());
    }
}
