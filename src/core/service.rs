//! Service activation around setup and teardown.
//!
//! A [`ServiceProvider`] owns group semantics: it activates a list of named
//! services as one unit and deactivates them again. [`within_services`]
//! runs a computation inside such an activation scope and decides which
//! error wins; [`ServiceDecorator`] applies that scope to a fixture's setup
//! and teardown.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::decorator::{Decorator, Passthrough, SetupAction, SharedDecorator};
use crate::error::{ActivationStage, Result, StagehandError};

// =============================================================================
// Provider capability
// =============================================================================

/// Capability to start and stop groups of named services.
pub trait ServiceProvider: Send + Sync {
    /// Activate `services` as one group; on failure nothing stays active.
    fn activate(&self, services: &[String]) -> Result<()>;

    /// Deactivate a group previously passed to [`activate`](Self::activate).
    fn deactivate(&self, services: &[String]) -> Result<()>;
}

/// Run `body` with `services` active.
///
/// Deactivation always runs once activation succeeded. An error from `body`
/// wins over a deactivation error (which is only logged); a deactivation
/// error after a successful `body` is returned as
/// [`StagehandError::ActivationFailed`].
pub fn within_services(
    provider: &dyn ServiceProvider,
    services: &[String],
    body: &mut dyn FnMut() -> Result<()>,
) -> Result<()> {
    let group = || services.join(", ");

    provider
        .activate(services)
        .map_err(|source| StagehandError::ActivationFailed {
            services: group(),
            stage: ActivationStage::Activate,
            source: Box::new(source),
        })?;
    tracing::debug!(services = %group(), "Services active");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body()));
    let deactivated = provider.deactivate(services);

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(payload) => {
            if let Err(error) = deactivated {
                tracing::warn!(services = %group(), error = %error, "Deactivation failed after panic");
            }
            panic::resume_unwind(payload);
        }
    };

    match (outcome, deactivated) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(secondary)) => {
            tracing::warn!(
                services = %group(),
                error = %secondary,
                "Deactivation failed; reporting the original error"
            );
            Err(error)
        }
        (Ok(()), Err(source)) => Err(StagehandError::ActivationFailed {
            services: group(),
            stage: ActivationStage::Deactivate,
            source: Box::new(source),
        }),
    }
}

// =============================================================================
// Decorator
// =============================================================================

/// Decorator activating services around both setup and teardown.
pub struct ServiceDecorator {
    provider: Arc<dyn ServiceProvider>,
    services: Vec<String>,
}

impl ServiceDecorator {
    /// Decorator for a single service.
    pub fn single(provider: Arc<dyn ServiceProvider>, service: impl Into<String>) -> Self {
        Self {
            provider,
            services: vec![service.into()],
        }
    }

    /// Decorator for a group of services activated together.
    pub fn group<I, S>(provider: Arc<dyn ServiceProvider>, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            provider,
            services: services.into_iter().map(Into::into).collect(),
        }
    }

    /// Shared decorator for `services`; a passthrough when the list is empty.
    pub fn for_services<I, S>(provider: Arc<dyn ServiceProvider>, services: I) -> SharedDecorator
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let decorator = Self::group(provider, services);
        if decorator.services.is_empty() {
            Arc::new(Passthrough)
        } else {
            Arc::new(decorator)
        }
    }

    #[must_use]
    pub fn services(&self) -> &[String] {
        &self.services
    }
}

impl std::fmt::Debug for ServiceDecorator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDecorator")
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl Decorator for ServiceDecorator {
    fn set_up(&self, action: &mut dyn SetupAction) -> Result<()> {
        within_services(self.provider.as_ref(), &self.services, &mut || {
            action.set_up()
        })
    }

    fn tear_down(&self, action: &mut dyn SetupAction) -> Result<()> {
        within_services(self.provider.as_ref(), &self.services, &mut || {
            action.tear_down()
        })
    }
}

// =============================================================================
// In-memory registry
// =============================================================================

type Hook = Arc<dyn Fn() -> Result<()> + Send + Sync>;

struct ServiceEntry {
    start: Hook,
    stop: Hook,
    active: usize,
}

/// In-memory provider with reference-counted services.
///
/// A service starts when its first group activates it and stops when its
/// last group deactivates it. Groups start in order and stop in reverse; a
/// group that fails to start rolls back the services it already started.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Mutex<BTreeMap<String, ServiceEntry>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services = self.lock();
        let mut map = f.debug_map();
        for (name, entry) in services.iter() {
            map.entry(name, &entry.active);
        }
        map.finish()
    }
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service with its start and stop hooks.
    pub fn register<S, T>(&self, name: impl Into<String>, start: S, stop: T)
    where
        S: Fn() -> Result<()> + Send + Sync + 'static,
        T: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(service = %name, "Registering service");
        self.lock().insert(
            name,
            ServiceEntry {
                start: Arc::new(start),
                stop: Arc::new(stop),
                active: 0,
            },
        );
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Number of groups currently holding `name` active.
    #[must_use]
    pub fn active_count(&self, name: &str) -> usize {
        self.lock().get(name).map_or(0, |entry| entry.active)
    }

    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.active_count(name) > 0
    }

    fn acquire(&self, name: &str) -> Result<()> {
        let start = {
            let mut services = self.lock();
            let entry = services.get_mut(name).ok_or_else(|| unknown(name))?;
            entry.active += 1;
            if entry.active > 1 {
                return Ok(());
            }
            Arc::clone(&entry.start)
        };

        tracing::info!(service = name, "Starting service");
        if let Err(error) = start() {
            if let Some(entry) = self.lock().get_mut(name) {
                entry.active = entry.active.saturating_sub(1);
            }
            return Err(error);
        }
        Ok(())
    }

    fn release(&self, name: &str) -> Result<()> {
        let stop = {
            let mut services = self.lock();
            let entry = services.get_mut(name).ok_or_else(|| unknown(name))?;
            let Some(remaining) = entry.active.checked_sub(1) else {
                return Err(StagehandError::contract(format!(
                    "service '{name}' deactivated more often than activated"
                )));
            };
            entry.active = remaining;
            if remaining > 0 {
                return Ok(());
            }
            Arc::clone(&entry.stop)
        };

        tracing::info!(service = name, "Stopping service");
        stop()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, ServiceEntry>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unknown(name: &str) -> StagehandError {
    StagehandError::UnknownService {
        name: name.to_string(),
    }
}

impl ServiceProvider for ServiceRegistry {
    fn activate(&self, services: &[String]) -> Result<()> {
        if let Some(missing) = services.iter().find(|name| !self.contains(name)) {
            return Err(unknown(missing));
        }

        for (started, name) in services.iter().enumerate() {
            if let Err(error) = self.acquire(name) {
                for name in services[..started].iter().rev() {
                    if let Err(rollback) = self.release(name) {
                        tracing::warn!(service = %name, error = %rollback, "Rollback failed");
                    }
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn deactivate(&self, services: &[String]) -> Result<()> {
        let mut first_error = None;
        for name in services.iter().rev() {
            if let Err(error) = self.release(name) {
                tracing::warn!(service = %name, error = %error, "Service failed to stop");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

// =============================================================================
// Tests
// =============================================================================
