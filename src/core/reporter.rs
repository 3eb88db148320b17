//! Relays leaf start/end events beneath a composite to an external observer.
//!
//! The observer sees lifecycle only. Outcomes (failures and errors) are not
//! relayed, and an observer that fails or panics never changes the outcome of
//! the test it was notified about; its failure is recorded as an additional
//! [`StagehandError::ObserverFailed`] on that test.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use super::engine::{Test, TestListener, TestResult};
use crate::error::{LifecycleEvent, Result, StagehandError};

/// Receives start/end notifications for leaf tests.
pub trait LifecycleObserver {
    fn on_start(&mut self, test: &str) -> Result<()>;

    fn on_end(&mut self, test: &str) -> Result<()>;
}

/// Observer backed by two closures.
pub struct FnObserver<S, E> {
    on_start: S,
    on_end: E,
}

impl<S, E> FnObserver<S, E>
where
    S: FnMut(&str) -> Result<()>,
    E: FnMut(&str) -> Result<()>,
{
    pub const fn new(on_start: S, on_end: E) -> Self {
        Self { on_start, on_end }
    }
}

impl<S, E> LifecycleObserver for FnObserver<S, E>
where
    S: FnMut(&str) -> Result<()>,
    E: FnMut(&str) -> Result<()>,
{
    fn on_start(&mut self, test: &str) -> Result<()> {
        (self.on_start)(test)
    }

    fn on_end(&mut self, test: &str) -> Result<()> {
        (self.on_end)(test)
    }
}

type SharedObserver = Rc<RefCell<dyn LifecycleObserver>>;

/// A composite whose leaf lifecycle is reported to an observer.
///
/// The bridge bounds what its observer sees, so a fixture inside it never
/// merges with fixtures outside it.
pub struct ReportingTest {
    inner: Box<dyn Test>,
    observer: SharedObserver,
}

impl std::fmt::Debug for ReportingTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportingTest")
            .field("inner", &self.inner.name())
            .finish_non_exhaustive()
    }
}

/// Wrap `composite` so `observer` sees every leaf start and end.
pub fn bridge_reporting(
    composite: impl Test + 'static,
    observer: impl LifecycleObserver + 'static,
) -> ReportingTest {
    ReportingTest {
        inner: Box::new(composite),
        observer: Rc::new(RefCell::new(observer)),
    }
}

impl Test for ReportingTest {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn count_test_cases(&self) -> usize {
        self.inner.count_test_cases()
    }

    fn run(&mut self, result: &mut TestResult) {
        let listener = BridgeListener {
            observer: Rc::clone(&self.observer),
        };
        let mut scope = result.scoped_listener(Box::new(listener));
        tracing::trace!(composite = self.inner.name(), listener = ?scope.id(), "Bridging lifecycle");
        self.inner.run(&mut scope);
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
}

struct BridgeListener {
    observer: SharedObserver,
}

impl BridgeListener {
    fn relay(
        &self,
        test: &str,
        event: LifecycleEvent,
        call: impl FnOnce(&mut dyn LifecycleObserver) -> Result<()>,
    ) -> Result<()> {
        let observer = &self.observer;
        panic::catch_unwind(AssertUnwindSafe(|| call(&mut *observer.borrow_mut())))
            .unwrap_or_else(|payload| Err(StagehandError::from_panic(payload.as_ref())))
            .map_err(|source| {
                tracing::warn!(test, %event, error = %source, "Lifecycle observer failed");
                StagehandError::ObserverFailed {
                    test: test.to_string(),
                    event,
                    source: Box::new(source),
                }
            })
    }
}

impl TestListener for BridgeListener {
    fn start_test(&mut self, test: &str) -> Result<()> {
        self.relay(test, LifecycleEvent::Start, |observer| observer.on_start(test))
    }

    fn end_test(&mut self, test: &str) -> Result<()> {
        self.relay(test, LifecycleEvent::End, |observer| observer.on_end(test))
    }
}

// =============================================================================
// Tests
// =============================================================================
