//! Turning a [`Plan`] into a runnable test tree.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use serde::Serialize;

use super::{FixtureSpec, Plan, ServiceSpec, TestGroupSpec};
use crate::core::{
    CounterRegistry, FixtureNode, FnObserver, MergeKey, ServiceDecorator, ServiceProvider,
    ServiceRegistry, SetupAction, Test, TestCase, TestResult, TestSuite, Traced,
    bridge_reporting, enrich_names,
};
use crate::error::{Result, StagehandError};

// =============================================================================
// Trace
// =============================================================================

/// What happened at one point of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceAction {
    Setup,
    Teardown,
    ServiceStart,
    ServiceStop,
    TestStart,
    TestEnd,
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub action: TraceAction,
    pub subject: String,
}

/// Ordered event log shared by everything a plan builds.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl Trace {
    pub fn record(&self, action: TraceAction, subject: &str) {
        tracing::trace!(?action, subject, "Trace event");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TraceEvent {
                action,
                subject: subject.to_string(),
            });
    }

    /// Copy of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events with `action` for `subject`.
    #[must_use]
    pub fn count(&self, action: TraceAction, subject: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.action == action && e.subject == subject)
            .count()
    }
}

// =============================================================================
// Plan fixtures
// =============================================================================

/// Setup action of a plan fixture: records itself and optionally fails.
struct PlanFixture {
    id: String,
    fail_setup: bool,
    fail_teardown: bool,
    trace: Trace,
}

impl SetupAction for PlanFixture {
    fn set_up(&mut self) -> Result<()> {
        self.trace.record(TraceAction::Setup, &self.id);
        if self.fail_setup {
            return Err(anyhow!("fixture '{}' failed to set up", self.id).into());
        }
        Ok(())
    }

    fn tear_down(&mut self) -> Result<()> {
        self.trace.record(TraceAction::Teardown, &self.id);
        if self.fail_teardown {
            return Err(anyhow!("fixture '{}' failed to tear down", self.id).into());
        }
        Ok(())
    }
}

// =============================================================================
// Building
// =============================================================================

/// Knobs applied while building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Merge sibling fixtures with equal keys.
    pub merge: bool,
    /// Record leaf start/end through a lifecycle observer.
    pub report_lifecycle: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            merge: true,
            report_lifecycle: true,
        }
    }
}

/// A built tree together with the state it shares.
pub struct BuiltPlan {
    pub name: String,
    pub root: Box<dyn Test>,
    pub trace: Trace,
    registry: CounterRegistry,
}

impl std::fmt::Debug for BuiltPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltPlan")
            .field("name", &self.name)
            .field("cases", &self.root.count_test_cases())
            .finish_non_exhaustive()
    }
}

/// Outcome of running a built plan.
#[derive(Debug)]
pub struct Execution {
    pub result: TestResult,
    pub trace: Vec<TraceEvent>,
    /// Merge keys still active after the run; empty unless enter/exit were
    /// mismatched.
    pub still_active: Vec<String>,
}

impl Plan {
    /// Build the test tree described by this plan.
    pub fn build(&self, options: BuildOptions) -> Result<BuiltPlan> {
        let trace = Trace::default();
        let registry = CounterRegistry::new();
        let services: Arc<dyn ServiceProvider> = Arc::new(self.service_registry(&trace));

        let mut root = TestSuite::new(self.run.name.clone());
        if !options.merge {
            root = root.do_not_merge();
        }
        for group in &self.tests {
            root.add(self.build_group(group, &registry, &services, &trace)?);
        }

        if options.merge {
            root.rearrange();
        }
        tracing::debug!(
            plan = %self.run.name,
            cases = root.count_test_cases(),
            groups = root.len(),
            merge = options.merge,
            "Plan built"
        );

        let traced = Traced::new(root);
        let root: Box<dyn Test> = if options.report_lifecycle {
            let (starts, ends) = (trace.clone(), trace.clone());
            Box::new(bridge_reporting(
                traced,
                FnObserver::new(
                    move |test: &str| {
                        starts.record(TraceAction::TestStart, test);
                        Ok(())
                    },
                    move |test: &str| {
                        ends.record(TraceAction::TestEnd, test);
                        Ok(())
                    },
                ),
            ))
        } else {
            Box::new(traced)
        };

        Ok(BuiltPlan {
            name: self.run.name.clone(),
            root,
            trace,
            registry,
        })
    }

    fn service_registry(&self, trace: &Trace) -> ServiceRegistry {
        let registry = ServiceRegistry::new();
        for ServiceSpec {
            name,
            fail_start,
            fail_stop,
        } in self.services.iter().cloned()
        {
            let (start_trace, stop_trace) = (trace.clone(), trace.clone());
            let (start_name, stop_name) = (name.clone(), name.clone());
            registry.register(
                name,
                move || {
                    start_trace.record(TraceAction::ServiceStart, &start_name);
                    if fail_start {
                        return Err(anyhow!("service '{start_name}' failed to start").into());
                    }
                    Ok(())
                },
                move || {
                    stop_trace.record(TraceAction::ServiceStop, &stop_name);
                    if fail_stop {
                        return Err(anyhow!("service '{stop_name}' failed to stop").into());
                    }
                    Ok(())
                },
            );
        }
        registry
    }

    fn build_group(
        &self,
        group: &TestGroupSpec,
        registry: &CounterRegistry,
        services: &Arc<dyn ServiceProvider>,
        trace: &Trace,
    ) -> Result<Box<dyn Test>> {
        let mut suite = TestSuite::new(group.name.clone());
        for case in &group.cases {
            suite.add(Box::new(leaf_case(group, case)));
        }
        if let Some(suffix) = &group.suffix {
            enrich_names(&mut suite, suffix);
        }

        let mut node: Box<dyn Test> = Box::new(suite);
        for id in group.fixtures.iter().rev() {
            let spec = self.fixture(id).ok_or_else(|| StagehandError::PlanInvalid {
                path: self.source.clone(),
                message: format!("undeclared fixture '{id}'"),
            })?;
            node = Box::new(fixture_node(node, spec, registry, services, trace));
        }
        Ok(node)
    }
}

fn leaf_case(group: &TestGroupSpec, case: &str) -> TestCase {
    let fails = group.failing.iter().any(|c| c == case);
    let errors = group.erroring.iter().any(|c| c == case);
    let name = case.to_string();
    TestCase::new(case, move || {
        if errors {
            return Err(anyhow!("case '{name}' raised an error").into());
        }
        if fails {
            return Err(StagehandError::assertion(format!("case '{name}' failed")));
        }
        Ok(())
    })
}

fn fixture_node(
    inner: Box<dyn Test>,
    spec: &FixtureSpec,
    registry: &CounterRegistry,
    services: &Arc<dyn ServiceProvider>,
    trace: &Trace,
) -> FixtureNode {
    let mut key = MergeKey::named(spec.key_name());
    if let Some(config) = &spec.config {
        key = key.refine(config.clone());
    }

    let action = PlanFixture {
        id: spec.id.clone(),
        fail_setup: spec.fail_setup,
        fail_teardown: spec.fail_teardown,
        trace: trace.clone(),
    };
    let mut builder = FixtureNode::builder(inner, action)
        .name(spec.id.clone())
        .key(key)
        .registry(registry);
    if !spec.services.is_empty() {
        builder = builder.inject(ServiceDecorator::for_services(
            Arc::clone(services),
            spec.services.iter().cloned(),
        ));
    }
    if spec.context {
        builder = builder.with_thread_context();
    }
    if spec.private {
        builder = builder.private();
    }
    builder.build()
}

impl BuiltPlan {
    /// Run the tree once.
    pub fn execute(mut self) -> Execution {
        tracing::info!(plan = %self.name, cases = self.root.count_test_cases(), "Running plan");
        let mut result = TestResult::new();
        self.root.run(&mut result);

        let still_active: Vec<String> = self
            .registry
            .active()
            .into_iter()
            .map(|(key, count)| format!("{key} ({count})"))
            .collect();
        if !still_active.is_empty() {
            tracing::warn!(keys = ?still_active, "Fixtures still active after run");
        }

        Execution {
            result,
            trace: self.trace.events(),
            still_active,
        }
    }
}
