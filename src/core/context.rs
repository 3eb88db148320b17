//! Thread-local execution context and the decorator that binds it.
//!
//! An [`ExecutionContext`] is the ambient state fixture code may rely on
//! during setup and teardown. Binding is scoped: the previous binding (or
//! its absence) is restored when the scope ends, on every exit path.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::decorator::{Decorator, SetupAction};
use crate::error::Result;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<Arc<ExecutionContext>>> = const { RefCell::new(None) };
}

// =============================================================================
// Execution context
// =============================================================================

/// Ambient state bound to the current thread.
#[derive(Debug)]
pub struct ExecutionContext {
    id: u64,
    label: String,
    created_at: DateTime<Utc>,
    values: Mutex<BTreeMap<String, String>>,
}

impl ExecutionContext {
    /// Create an unbound context.
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
            created_at: Utc::now(),
            values: Mutex::new(BTreeMap::new()),
        })
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Store a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

/// The context bound to the current thread, if any.
#[must_use]
pub fn current() -> Option<Arc<ExecutionContext>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Whether a context is bound to the current thread.
#[must_use]
pub fn is_bound() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

/// Restores the previous binding on drop.
struct Rebind {
    previous: Option<Arc<ExecutionContext>>,
}

impl Drop for Rebind {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Run `body` with `context` bound, restoring the previous binding afterward.
pub fn bind<T>(context: Arc<ExecutionContext>, body: impl FnOnce() -> T) -> T {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(context));
    let _rebind = Rebind { previous };
    body()
}

// =============================================================================
// Providers
// =============================================================================

/// Capability to run a computation with an ambient context bound.
pub trait ContextProvider: Send + Sync {
    fn in_context(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

/// Binds a fresh thread context unless one is already bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadContext;

impl ContextProvider for ThreadContext {
    fn in_context(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        if is_bound() {
            return body();
        }
        let context = ExecutionContext::new("fixture");
        tracing::trace!(context = context.id(), "Binding thread context");
        bind(context, body)
    }
}

/// Decorator running setup and teardown inside a provider's context.
pub struct ContextDecorator {
    provider: Box<dyn ContextProvider>,
}

impl ContextDecorator {
    pub fn new(provider: impl ContextProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
        }
    }
}

impl std::fmt::Debug for ContextDecorator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextDecorator").finish_non_exhaustive()
    }
}

impl Decorator for ContextDecorator {
    fn set_up(&self, action: &mut dyn SetupAction) -> Result<()> {
        self.provider.in_context(&mut || action.set_up())
    }

    fn tear_down(&self, action: &mut dyn SetupAction) -> Result<()> {
        self.provider.in_context(&mut || action.tear_down())
    }
}

// =============================================================================
// Tests
// =============================================================================
