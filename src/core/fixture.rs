//! Fixture nodes: nestable, mergeable setup/teardown around a subtree.
//!
//! A [`FixtureNode`] owns one setup action and a [`NestingCounter`]. The
//! action runs only when the counter goes 0→1 and its teardown only when it
//! returns 1→0, so any number of nodes sharing the counter (same
//! [`MergeKey`] in the same [`CounterRegistry`]) establish the fixture once
//! per maximal active period.
//!
//! Sequential siblings never overlap, so sharing a counter alone does not
//! save them a setup. [`merge_siblings`] (driven by
//! [`Test::rearrange`](super::engine::Test::rearrange)) folds sibling nodes
//! with equal keys into the first of them, so all their tests run inside one
//! activation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::context::{ContextDecorator, ContextProvider, ThreadContext};
use super::counter::NestingCounter;
use super::decorator::{
    SetupAction, SharedDecorator, compose, compose_all, decorated_set_up, decorated_tear_down,
};
use super::engine::{FailurePhase, Test, TestResult};
use super::registry::{CounterRegistry, MergeKey};
use crate::error::{Result, StagehandError};

// =============================================================================
// Fixture node
// =============================================================================

/// A test subtree wrapped in one setup/teardown pair.
pub struct FixtureNode {
    name: String,
    inners: Vec<Box<dyn Test>>,
    fixture: Box<dyn SetupAction>,
    decorator: Option<SharedDecorator>,
    counter: NestingCounter,
    key: MergeKey,
    mergeable: bool,
}

impl std::fmt::Debug for FixtureNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureNode")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("inners", &self.inners.len())
            .field("decorated", &self.decorator.is_some())
            .field("count", &self.counter.count())
            .field("mergeable", &self.mergeable)
            .finish_non_exhaustive()
    }
}

impl FixtureNode {
    /// Start building a node around `inner`, established by `fixture`.
    ///
    /// The merge key defaults to the type of `fixture`.
    pub fn builder<'r, F>(inner: impl Test + 'static, fixture: F) -> FixtureBuilder<'r>
    where
        F: SetupAction + 'static,
    {
        FixtureBuilder {
            name: None,
            inner: Box::new(inner),
            fixture: Box::new(fixture),
            key: MergeKey::of::<F>(),
            registry: None,
            context: None,
            injected: None,
            own: None,
            mergeable: true,
        }
    }

    /// Increment the counter, running the setup on the first entry.
    ///
    /// A failed setup rolls the counter back and is reported as
    /// [`StagehandError::SetupFailed`] naming this node.
    pub fn enter(&mut self) -> Result<()> {
        let previous = self.counter.increment();
        tracing::debug!(
            fixture = %self.name,
            key = %self.key,
            depth = previous + 1,
            "Entering fixture"
        );
        if previous > 0 {
            return Ok(());
        }

        tracing::info!(fixture = %self.name, "Setting up fixture");
        let decorator = self.decorator.as_deref();
        let fixture = self.fixture.as_mut();
        if let Err(source) = guarded(|| decorated_set_up(decorator, fixture)) {
            self.counter.decrement()?;
            tracing::warn!(fixture = %self.name, error = %source, "Fixture setup failed");
            return Err(StagehandError::SetupFailed {
                test: self.name.clone(),
                source: Box::new(source),
            });
        }
        Ok(())
    }

    /// Decrement the counter, running the teardown on the last exit.
    ///
    /// Teardown errors are returned unchanged. Exiting more often than
    /// entering is a contract violation and leaves the counter at zero.
    pub fn exit(&mut self) -> Result<()> {
        let remaining = self.counter.decrement()?;
        tracing::debug!(
            fixture = %self.name,
            key = %self.key,
            depth = remaining,
            "Exiting fixture"
        );
        if remaining > 0 {
            return Ok(());
        }

        tracing::info!(fixture = %self.name, "Tearing down fixture");
        let decorator = self.decorator.as_deref();
        let fixture = self.fixture.as_mut();
        guarded(|| decorated_tear_down(decorator, fixture))
    }

    /// The merge key of this node.
    #[must_use]
    pub const fn config_key(&self) -> &MergeKey {
        &self.key
    }

    /// Handle to this node's counter.
    #[must_use]
    pub const fn counter(&self) -> &NestingCounter {
        &self.counter
    }

    /// Whether this node takes part in sibling merging.
    #[must_use]
    pub const fn is_mergeable(&self) -> bool {
        self.mergeable
    }

    /// Move `other`'s tests into this node. `other` keeps its fixture and is
    /// left without tests.
    fn absorb(&mut self, other: &mut Self) {
        tracing::debug!(
            host = %self.name,
            absorbed = %other.name,
            key = %self.key,
            "Merging sibling fixture; absorbed setup action is dropped"
        );
        self.inners.append(&mut other.inners);
    }
}

/// Run a setup or teardown step, turning a panic into an error.
fn guarded(step: impl FnOnce() -> Result<()>) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(step))
        .unwrap_or_else(|payload| Err(StagehandError::from_panic(payload.as_ref())))
}

impl Test for FixtureNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn count_test_cases(&self) -> usize {
        self.inners.iter().map(|t| t.count_test_cases()).sum()
    }

    fn run(&mut self, result: &mut TestResult) {
        if let Err(error) = self.enter() {
            result.add_error(&self.name, FailurePhase::Setup, error);
            return;
        }

        let inners = &mut self.inners;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            for inner in inners.iter_mut() {
                inner.run(result);
            }
        }));

        if let Err(error) = self.exit() {
            tracing::warn!(fixture = %self.name, error = %error, "Fixture teardown failed");
            result.add_error(&self.name, FailurePhase::Teardown, error);
        }

        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
    }

    fn children(&self) -> Vec<&dyn Test> {
        self.inners.iter().map(|t| &**t).collect()
    }

    fn rearrange(&mut self) {
        let inners = std::mem::take(&mut self.inners);
        self.inners = merge_siblings(inners);
        for inner in &mut self.inners {
            inner.rearrange();
        }
    }

    fn enrich_names(&mut self, suffix: &str) {
        for inner in &mut self.inners {
            inner.enrich_names(suffix);
        }
    }

    fn as_fixture_mut(&mut self) -> Option<&mut FixtureNode> {
        Some(self)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`FixtureNode`].
///
/// The final decorator is `context ⊕ injected ⊕ own`, outermost first.
pub struct FixtureBuilder<'r> {
    name: Option<String>,
    inner: Box<dyn Test>,
    fixture: Box<dyn SetupAction>,
    key: MergeKey,
    registry: Option<&'r CounterRegistry>,
    context: Option<SharedDecorator>,
    injected: Option<SharedDecorator>,
    own: Option<SharedDecorator>,
    mergeable: bool,
}

impl<'r> FixtureBuilder<'r> {
    /// Display name; defaults to the inner test's name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the merge key.
    #[must_use]
    pub fn key(mut self, key: MergeKey) -> Self {
        self.key = key;
        self
    }

    /// Share the counter for this node's key through `registry`.
    ///
    /// Without a registry the node has no way to meet its equals, so it is
    /// built private.
    #[must_use]
    pub const fn registry(mut self, registry: &'r CounterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a decorator supplied by the fixture itself (innermost).
    #[must_use]
    pub fn decorator(mut self, decorator: SharedDecorator) -> Self {
        self.own = compose(self.own, Some(decorator));
        self
    }

    /// Add an externally supplied decorator, applied outside the node's own.
    #[must_use]
    pub fn inject(mut self, decorator: SharedDecorator) -> Self {
        self.injected = compose(self.injected, Some(decorator));
        self
    }

    /// Bind the thread execution context around setup and teardown.
    #[must_use]
    pub fn with_thread_context(self) -> Self {
        self.with_context(ThreadContext)
    }

    /// Bind a context from `provider` around setup and teardown.
    ///
    /// The context decorator is always the outermost one.
    #[must_use]
    pub fn with_context(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.context = Some(Arc::new(ContextDecorator::new(provider)));
        self
    }

    /// Use a private counter and never merge with siblings.
    #[must_use]
    pub const fn private(mut self) -> Self {
        self.mergeable = false;
        self
    }

    /// Finish the node.
    ///
    /// A node is mergeable only when it shares its counter through a
    /// registry, so merging and nesting agree on what counts as equal.
    #[must_use]
    pub fn build(self) -> FixtureNode {
        let (counter, mergeable) = match self.registry {
            Some(registry) if self.mergeable => (registry.counter_for(&self.key), true),
            _ => (NestingCounter::new(), false),
        };
        let name = self.name.unwrap_or_else(|| self.inner.name().to_string());
        FixtureNode {
            name,
            inners: vec![self.inner],
            fixture: self.fixture,
            decorator: compose_all(
                self.context
                    .into_iter()
                    .chain(self.injected)
                    .chain(self.own),
            ),
            counter,
            key: self.key,
            mergeable,
        }
    }
}

/// Wrap `inner` in `fixture`, sharing the counter registered for the
/// fixture's type.
pub fn wrap<F>(inner: impl Test + 'static, fixture: F, registry: &CounterRegistry) -> FixtureNode
where
    F: SetupAction + 'static,
{
    FixtureNode::builder(inner, fixture)
        .registry(registry)
        .build()
}

/// Wrap `inner` in `fixture`, sharing the counter registered for `key`.
pub fn wrap_keyed<F>(
    inner: impl Test + 'static,
    key: MergeKey,
    fixture: F,
    registry: &CounterRegistry,
) -> FixtureNode
where
    F: SetupAction + 'static,
{
    FixtureNode::builder(inner, fixture)
        .key(key)
        .registry(registry)
        .build()
}

// =============================================================================
// Rearrangement
// =============================================================================

/// Fold mergeable fixture siblings with equal keys into the first of them.
///
/// Non-fixture tests and unmergeable nodes keep their position. When equal
/// keys carry different setup actions, the first node's action is used.
///
/// [`Named`](super::named::Named) and [`Traced`](super::named::Traced) are
/// seen through; an absorbed wrapper is dropped with its node. A
/// [`ReportingTest`](super::reporter::ReportingTest) is not, so its tests
/// stay under its observer.
pub fn merge_siblings(tests: Vec<Box<dyn Test>>) -> Vec<Box<dyn Test>> {
    let mut merged: Vec<Box<dyn Test>> = Vec::with_capacity(tests.len());
    for mut test in tests {
        let key = test
            .as_fixture_mut()
            .filter(|node| node.mergeable)
            .map(|node| node.key.clone());
        let Some(key) = key else {
            merged.push(test);
            continue;
        };

        let host = merged.iter_mut().position(|candidate| {
            candidate
                .as_fixture_mut()
                .is_some_and(|node| node.mergeable && node.key == key)
        });
        match host {
            Some(index) => {
                if let (Some(host), Some(node)) =
                    (merged[index].as_fixture_mut(), test.as_fixture_mut())
                {
                    host.absorb(node);
                }
            }
            None => merged.push(test),
        }
    }
    merged
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::{TestCase, TestSuite};
    use crate::error::ErrorKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recording {
        label: &'static str,
        log: Log,
        fail_setup: bool,
        fail_teardown: bool,
    }

    impl Recording {
        fn new(label: &'static str, log: &Log) -> Self {
            Self {
                label,
                log: Rc::clone(log),
                fail_setup: false,
                fail_teardown: false,
            }
        }
    }

    impl SetupAction for Recording {
        fn set_up(&mut self) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:setup", self.label));
            if self.fail_setup {
                return Err(StagehandError::Config("cannot install".to_string()));
            }
            Ok(())
        }

        fn tear_down(&mut self) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:teardown", self.label));
            if self.fail_teardown {
                return Err(StagehandError::Config("leaked handle".to_string()));
            }
            Ok(())
        }
    }

    fn leaf(name: &'static str, log: &Log) -> TestCase {
        let log = Rc::clone(log);
        TestCase::new(name, move || {
            log.borrow_mut().push(format!("run:{name}"));
            Ok(())
        })
    }

    #[test]
    fn nested_nodes_with_equal_keys_set_up_once() {
        let log = Log::default();
        let registry = CounterRegistry::new();
        let key = MergeKey::named("cfg");
        let mut node1 = wrap_keyed(
            leaf("a", &log),
            key.clone(),
            Recording::new("n1", &log),
            &registry,
        );
        let mut node2 = wrap_keyed(leaf("b", &log), key, Recording::new("n2", &log), &registry);

        node1.enter().unwrap();
        node2.enter().unwrap();
        node2.exit().unwrap();
        assert_eq!(node1.counter().count(), 1);
        node1.exit().unwrap();

        assert_eq!(*log.borrow(), vec!["n1:setup", "n1:teardown"]);
        assert_eq!(node1.config_key(), &MergeKey::named("cfg"));
    }

    #[test]
    fn extra_exit_is_a_contract_violation() {
        let log = Log::default();
        let registry = CounterRegistry::new();
        let mut node = wrap(leaf("a", &log), Recording::new("n", &log), &registry);
        node.enter().unwrap();
        node.exit().unwrap();

        let err = node.exit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
        assert_eq!(node.counter().count(), 0);
        assert_eq!(*log.borrow(), vec!["n:setup", "n:teardown"]);
    }

    #[test]
    fn failed_setup_rolls_counter_back() {
        let log = Log::default();
        let mut action = Recording::new("n", &log);
        action.fail_setup = true;
        let mut node = FixtureNode::builder(leaf("a", &log), action)
            .name("LoadConfig")
            .build();

        let err = node.enter().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SetupFailure);
        assert!(err.to_string().contains("LoadConfig"));
        assert!(matches!(err.root_cause(), StagehandError::Config(_)));
        assert_eq!(node.counter().count(), 0);

        // A later entry tries again.
        assert!(node.enter().is_err());
        assert_eq!(*log.borrow(), vec!["n:setup", "n:setup"]);
    }

    #[test]
    fn setup_failure_skips_inner_and_is_reported_once() {
        let log = Log::default();
        let mut action = Recording::new("n", &log);
        action.fail_setup = true;
        let mut node = FixtureNode::builder(
            TestSuite::new("suite")
                .with(leaf("a", &log))
                .with(leaf("b", &log)),
            action,
        )
        .build();

        let mut result = TestResult::new();
        node.run(&mut result);

        assert_eq!(result.run_count(), 0);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors()[0].test, "suite");
        assert_eq!(result.errors()[0].phase, FailurePhase::Setup);
        assert_eq!(result.errors()[0].kind(), ErrorKind::SetupFailure);
        assert_eq!(*log.borrow(), vec!["n:setup"]);
    }

    #[test]
    fn teardown_failure_is_an_additional_error() {
        let log = Log::default();
        let mut action = Recording::new("n", &log);
        action.fail_teardown = true;
        let mut node = wrap(leaf("a", &log), action, &CounterRegistry::new());

        let mut result = TestResult::new();
        node.run(&mut result);

        assert_eq!(result.run_count(), 1);
        assert_eq!(result.error_count(), 1);
        let failure = &result.errors()[0];
        assert_eq!(failure.kind(), ErrorKind::TeardownFailure);
        assert!(matches!(failure.error, StagehandError::Config(_)));
        assert_eq!(node.counter().count(), 0);
    }

    #[test]
    fn exit_runs_even_when_inner_fails() {
        let log = Log::default();
        let mut node = wrap(
            TestCase::new("broken", || Err(StagehandError::assertion("nope"))),
            Recording::new("n", &log),
            &CounterRegistry::new(),
        );

        let mut result = TestResult::new();
        node.run(&mut result);

        assert_eq!(result.failure_count(), 1);
        assert_eq!(*log.borrow(), vec!["n:setup", "n:teardown"]);
        assert_eq!(node.counter().count(), 0);
    }

    #[test]
    fn panicking_setup_becomes_setup_failure() {
        struct Exploding;
        impl SetupAction for Exploding {
            fn set_up(&mut self) -> Result<()> {
                panic!("no disk")
            }
            fn tear_down(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let mut node = wrap(TestCase::new("a", || Ok(())), Exploding, &CounterRegistry::new());
        let err = node.enter().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SetupFailure);
        assert!(err.to_string().contains("no disk"));
        assert_eq!(node.counter().count(), 0);
    }

    #[test]
    fn default_key_is_the_action_type() {
        let log = Log::default();
        let registry = CounterRegistry::new();
        let node = wrap(leaf("a", &log), Recording::new("n", &log), &registry);
        assert_eq!(node.config_key(), &MergeKey::of::<Recording>());
    }

    #[test]
    fn rearrange_merges_sequential_siblings() {
        let log = Log::default();
        let registry = CounterRegistry::new();
        let mut suite = TestSuite::new("root")
            .with(
                FixtureNode::builder(leaf("a", &log), Recording::new("first", &log))
                    .registry(&registry)
                    .build(),
            )
            .with(leaf("plain", &log))
            .with(
                FixtureNode::builder(leaf("b", &log), Recording::new("second", &log))
                    .registry(&registry)
                    .build(),
            );

        suite.rearrange();
        assert_eq!(suite.len(), 2);

        let mut result = TestResult::new();
        suite.run(&mut result);
        assert!(result.was_successful());
        assert_eq!(
            *log.borrow(),
            vec![
                "first:setup",
                "run:a",
                "run:b",
                "first:teardown",
                "run:plain"
            ]
        );
    }

    #[test]
    fn rearrange_recurses_into_merged_tests() {
        let log = Log::default();
        let registry = CounterRegistry::new();
        let mut suite = TestSuite::new("root")
            .with(
                FixtureNode::builder(
                    FixtureNode::builder(leaf("a", &log), Recording::new("db", &log))
                        .key(MergeKey::named("db"))
                        .registry(&registry)
                        .build(),
                    Recording::new("cfg", &log),
                )
                .key(MergeKey::named("cfg"))
                .registry(&registry)
                .build(),
            )
            .with(
                FixtureNode::builder(
                    FixtureNode::builder(leaf("b", &log), Recording::new("db", &log))
                        .key(MergeKey::named("db"))
                        .registry(&registry)
                        .build(),
                    Recording::new("cfg", &log),
                )
                .key(MergeKey::named("cfg"))
                .registry(&registry)
                .build(),
            );

        suite.rearrange();
        let mut result = TestResult::new();
        suite.run(&mut result);

        assert_eq!(
            *log.borrow(),
            vec![
                "cfg:setup",
                "db:setup",
                "run:a",
                "run:b",
                "db:teardown",
                "cfg:teardown"
            ]
        );
    }

    #[test]
    fn private_nodes_and_unmerged_suites_are_left_alone() {
        let log = Log::default();
        let registry = CounterRegistry::new();
        let mut private = TestSuite::new("root")
            .with(wrap(leaf("a", &log), Recording::new("n", &log), &registry))
            .with(
                FixtureNode::builder(leaf("b", &log), Recording::new("n", &log))
                    .registry(&registry)
                    .private()
                    .build(),
            );
        private.rearrange();
        assert_eq!(private.len(), 2);

        let mut opted_out = TestSuite::new("root")
            .do_not_merge()
            .with(wrap(leaf("a", &log), Recording::new("n", &log), &registry))
            .with(wrap(leaf("b", &log), Recording::new("n", &log), &registry));
        opted_out.rearrange();
        assert_eq!(opted_out.len(), 2);
    }

    #[test]
    fn rearranging_twice_changes_nothing() {
        let log = Log::default();
        let registry = CounterRegistry::new();
        let mut suite = TestSuite::new("root")
            .with(wrap(leaf("a", &log), Recording::new("n", &log), &registry))
            .with(wrap(leaf("b", &log), Recording::new("n", &log), &registry));
        suite.rearrange();
        suite.rearrange();
        assert_eq!(suite.len(), 1);
        assert_eq!(suite.count_test_cases(), 2);
    }

    #[test]
    fn nested_wraps_of_one_type_set_up_once() {
        let log = Log::default();
        let registry = CounterRegistry::new();
        let mut outer = wrap(
            wrap(leaf("t", &log), Recording::new("inner", &log), &registry),
            Recording::new("outer", &log),
            &registry,
        );

        let mut result = TestResult::new();
        outer.run(&mut result);

        assert!(result.was_successful());
        assert_eq!(
            *log.borrow(),
            vec!["outer:setup", "run:t", "outer:teardown"]
        );
        assert!(!registry.counter_for(&MergeKey::of::<Recording>()).is_active());
    }

    #[test]
    fn node_without_registry_is_private() {
        let log = Log::default();
        let node = FixtureNode::builder(leaf("a", &log), Recording::new("n", &log))
            .key(MergeKey::named("cfg"))
            .build();
        assert!(!node.is_mergeable());

        let mut suite = TestSuite::new("root")
            .with(node)
            .with(
                FixtureNode::builder(leaf("b", &log), Recording::new("n", &log))
                    .key(MergeKey::named("cfg"))
                    .build(),
            );
        suite.rearrange();
        assert_eq!(suite.len(), 2);
    }
}
