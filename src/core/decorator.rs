//! Decorators around setup/teardown pairs and the chain builder.
//!
//! A [`Decorator`] receives the action it wraps and decides how to invoke it.
//! Composition is deferred: [`compose`] only records the nesting, and the
//! outer decorator calls the inner one when the chain actually runs.
//!
//! ```text
//! compose_all([A, B, C]) on set_up(action):
//!   A.set_up( B.set_up( C.set_up( action.set_up() ) ) )
//! and on tear_down(action), in the same outer-to-inner nesting:
//!   A.tear_down( B.tear_down( C.tear_down( action.tear_down() ) ) )
//! ```

use std::sync::Arc;

use crate::error::Result;

// =============================================================================
// Setup actions
// =============================================================================

/// A setup/teardown pair.
pub trait SetupAction {
    fn set_up(&mut self) -> Result<()>;

    fn tear_down(&mut self) -> Result<()>;
}

/// A setup/teardown pair backed by two closures.
pub struct FnAction<S, T> {
    set_up: S,
    tear_down: T,
}

impl<S, T> FnAction<S, T>
where
    S: FnMut() -> Result<()>,
    T: FnMut() -> Result<()>,
{
    pub const fn new(set_up: S, tear_down: T) -> Self {
        Self { set_up, tear_down }
    }
}

impl<S, T> SetupAction for FnAction<S, T>
where
    S: FnMut() -> Result<()>,
    T: FnMut() -> Result<()>,
{
    fn set_up(&mut self) -> Result<()> {
        (self.set_up)()
    }

    fn tear_down(&mut self) -> Result<()> {
        (self.tear_down)()
    }
}

impl<S, T> std::fmt::Debug for FnAction<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAction").finish_non_exhaustive()
    }
}

// =============================================================================
// Decorators
// =============================================================================

/// Wrap-around behavior for a setup/teardown pair.
///
/// Implementations must invoke `action.set_up()` from `set_up` and
/// `action.tear_down()` from `tear_down` (or fail before doing so).
pub trait Decorator: Send + Sync {
    fn set_up(&self, action: &mut dyn SetupAction) -> Result<()>;

    fn tear_down(&self, action: &mut dyn SetupAction) -> Result<()>;
}

/// Shared handle to a decorator.
pub type SharedDecorator = Arc<dyn Decorator>;

/// Decorator that calls straight through.
///
/// Used where a concrete decorator is required but nothing should happen,
/// e.g. a service decorator for an empty service list.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Decorator for Passthrough {
    fn set_up(&self, action: &mut dyn SetupAction) -> Result<()> {
        action.set_up()
    }

    fn tear_down(&self, action: &mut dyn SetupAction) -> Result<()> {
        action.tear_down()
    }
}

type Around = dyn Fn(&mut dyn FnMut() -> Result<()>) -> Result<()> + Send + Sync;

/// Decorator built from two "around" closures.
///
/// Each closure receives the wrapped step as `proceed` and must call it.
pub struct FnDecorator {
    around_set_up: Box<Around>,
    around_tear_down: Box<Around>,
}

impl FnDecorator {
    pub fn new<S, T>(around_set_up: S, around_tear_down: T) -> Self
    where
        S: Fn(&mut dyn FnMut() -> Result<()>) -> Result<()> + Send + Sync + 'static,
        T: Fn(&mut dyn FnMut() -> Result<()>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            around_set_up: Box::new(around_set_up),
            around_tear_down: Box::new(around_tear_down),
        }
    }

    /// Decorator applying the same closure around both setup and teardown.
    pub fn around<F>(around: F) -> Self
    where
        F: Fn(&mut dyn FnMut() -> Result<()>) -> Result<()> + Send + Sync + 'static,
    {
        let around = Arc::new(around);
        let for_tear_down = Arc::clone(&around);
        Self::new(
            move |proceed| around(proceed),
            move |proceed| for_tear_down(proceed),
        )
    }

    /// Wrap into a [`SharedDecorator`].
    #[must_use]
    pub fn shared(self) -> SharedDecorator {
        Arc::new(self)
    }
}

impl std::fmt::Debug for FnDecorator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnDecorator").finish_non_exhaustive()
    }
}

impl Decorator for FnDecorator {
    fn set_up(&self, action: &mut dyn SetupAction) -> Result<()> {
        (self.around_set_up)(&mut || action.set_up())
    }

    fn tear_down(&self, action: &mut dyn SetupAction) -> Result<()> {
        (self.around_tear_down)(&mut || action.tear_down())
    }
}

// =============================================================================
// Chain builder
// =============================================================================

/// Two decorators, `outer` wrapping `inner`.
struct Composed {
    outer: SharedDecorator,
    inner: SharedDecorator,
}

/// The inner decorator bound to the action, presented to the outer decorator
/// as a plain setup/teardown pair.
struct Joined<'a> {
    decorator: &'a dyn Decorator,
    action: &'a mut dyn SetupAction,
}

impl SetupAction for Joined<'_> {
    fn set_up(&mut self) -> Result<()> {
        self.decorator.set_up(&mut *self.action)
    }

    fn tear_down(&mut self) -> Result<()> {
        self.decorator.tear_down(&mut *self.action)
    }
}

impl Decorator for Composed {
    fn set_up(&self, action: &mut dyn SetupAction) -> Result<()> {
        let mut joined = Joined {
            decorator: self.inner.as_ref(),
            action,
        };
        self.outer.set_up(&mut joined)
    }

    fn tear_down(&self, action: &mut dyn SetupAction) -> Result<()> {
        let mut joined = Joined {
            decorator: self.inner.as_ref(),
            action,
        };
        self.outer.tear_down(&mut joined)
    }
}

/// Compose two optional decorators, `outer` wrapping `inner`.
///
/// An absent side is the identity: the other side is returned unchanged.
#[must_use]
pub fn compose(
    outer: Option<SharedDecorator>,
    inner: Option<SharedDecorator>,
) -> Option<SharedDecorator> {
    match (outer, inner) {
        (None, inner) => inner,
        (outer, None) => outer,
        (Some(outer), Some(inner)) => Some(Arc::new(Composed { outer, inner })),
    }
}

/// Compose a list of decorators; the first element becomes the outermost.
///
/// Returns `None` for an empty list and the single element itself for a list
/// of one.
pub fn compose_all<I>(decorators: I) -> Option<SharedDecorator>
where
    I: IntoIterator<Item = SharedDecorator>,
    I::IntoIter: DoubleEndedIterator,
{
    decorators
        .into_iter()
        .rev()
        .fold(None, |inner, outer| compose(Some(outer), inner))
}

/// Run `action`'s setup through an optional decorator.
pub fn decorated_set_up(
    decorator: Option<&dyn Decorator>,
    action: &mut dyn SetupAction,
) -> Result<()> {
    match decorator {
        Some(decorator) => decorator.set_up(action),
        None => action.set_up(),
    }
}

/// Run `action`'s teardown through an optional decorator.
pub fn decorated_tear_down(
    decorator: Option<&dyn Decorator>,
    action: &mut dyn SetupAction,
) -> Result<()> {
    match decorator {
        Some(decorator) => decorator.tear_down(action),
        None => action.tear_down(),
    }
}

// =============================================================================
// Tests
// =============================================================================
