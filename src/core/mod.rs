//! Fixture lifecycle coordination.
//!
//! Leaf-first: [`decorator`] (wrap-around behavior and chain composition),
//! [`counter`] and [`registry`] (shared nesting counters by merge key),
//! [`fixture`] (nodes that establish a fixture once per active period),
//! [`context`] and [`service`] (stock decorators), [`reporter`] (lifecycle
//! relay) and [`named`] (naming and tracing wrappers), all running on the
//! minimal [`engine`].

pub mod context;
pub mod counter;
pub mod decorator;
pub mod engine;
pub mod fixture;
pub mod logging;
pub mod named;
pub mod registry;
pub mod reporter;
pub mod service;

pub use context::{ContextDecorator, ContextProvider, ExecutionContext, ThreadContext};
pub use counter::NestingCounter;
pub use decorator::{
    Decorator, FnAction, FnDecorator, Passthrough, SetupAction, SharedDecorator, compose,
    compose_all,
};
pub use engine::{
    Failure, FailurePhase, ListenerId, ListenerScope, Test, TestCase, TestListener, TestResult,
    TestSuite,
};
pub use fixture::{FixtureBuilder, FixtureNode, wrap, wrap_keyed};
pub use named::{Named, Traced, enrich_names};
pub use registry::{CounterRegistry, MergeKey};
pub use reporter::{FnObserver, LifecycleObserver, ReportingTest, bridge_reporting};
pub use service::{ServiceDecorator, ServiceProvider, ServiceRegistry, within_services};
