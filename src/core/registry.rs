//! Merge keys and the counter registry.
//!
//! The registry is owned by whoever builds the test tree. Nodes built against
//! the same registry with equal [`MergeKey`]s share one [`NestingCounter`];
//! separate registries never share state.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::counter::NestingCounter;

// =============================================================================
// Merge Key
// =============================================================================

/// Identity under which fixture requests are recognised as the same fixture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MergeKey {
    /// Keyed by the type of the fixture's setup action.
    Type { id: TypeId, name: &'static str },
    /// Keyed by an explicit name.
    Named(String),
    /// A base key narrowed by a detail, e.g. a configuration file name.
    Refined { base: Box<MergeKey>, detail: String },
}

impl MergeKey {
    /// Key for the type `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Key for an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Narrow this key so it only merges with keys refined the same way.
    #[must_use]
    pub fn refine(self, detail: impl Into<String>) -> Self {
        Self::Refined {
            base: Box::new(self),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for MergeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type { name, .. } => write!(f, "type:{name}"),
            Self::Named(name) => write!(f, "{name}"),
            Self::Refined { base, detail } => write!(f, "{base}[{detail}]"),
        }
    }
}

// =============================================================================
// Counter Registry
// =============================================================================

/// Maps merge keys to shared nesting counters.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    counters: Mutex<HashMap<MergeKey, NestingCounter>>,
}

impl CounterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the counter for `key`, creating it on first use.
    #[must_use]
    pub fn counter_for(&self, key: &MergeKey) -> NestingCounter {
        let mut counters = self.lock();
        if let Some(counter) = counters.get(key) {
            return counter.clone();
        }
        tracing::trace!(key = %key, "Creating nesting counter");
        let counter = NestingCounter::new();
        counters.insert(key.clone(), counter.clone());
        counter
    }

    /// Number of keys seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no counter was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Keys whose fixture is currently established, with their counts.
    #[must_use]
    pub fn active(&self) -> Vec<(MergeKey, usize)> {
        let mut active: Vec<_> = self
            .lock()
            .iter()
            .map(|(key, counter)| (key.clone(), counter.count()))
            .filter(|(_, count)| *count > 0)
            .collect();
        active.sort_by_key(|(key, _)| key.to_string());
        active
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MergeKey, NestingCounter>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct LoadConfig;
    struct StartDatabase;

    #[test]
    fn equal_keys_share_a_counter() {
        let registry = CounterRegistry::new();
        let a = registry.counter_for(&MergeKey::named("cfg"));
        let b = registry.counter_for(&MergeKey::named("cfg"));
        assert!(a.shares_with(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn type_keys_distinguish_types() {
        assert_eq!(MergeKey::of::<LoadConfig>(), MergeKey::of::<LoadConfig>());
        assert_ne!(MergeKey::of::<LoadConfig>(), MergeKey::of::<StartDatabase>());
        assert!(MergeKey::of::<LoadConfig>().to_string().contains("LoadConfig"));
    }

    #[test]
    fn refined_keys_merge_only_with_same_detail() {
        let base = MergeKey::of::<LoadConfig>();
        let a = base.clone().refine("default.toml");
        let b = base.clone().refine("default.toml");
        let c = base.clone().refine("other.toml");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, base);
    }

    #[test]
    fn separate_registries_do_not_share() {
        let key = MergeKey::named("cfg");
        let a = CounterRegistry::new().counter_for(&key);
        let b = CounterRegistry::new().counter_for(&key);
        assert!(!a.shares_with(&b));
    }

    #[test]
    fn active_lists_only_established_fixtures() {
        let registry = CounterRegistry::new();
        let cfg = registry.counter_for(&MergeKey::named("cfg"));
        let _db = registry.counter_for(&MergeKey::named("db"));
        cfg.increment();
        assert_eq!(registry.active(), vec![(MergeKey::named("cfg"), 1)]);
        assert!(!registry.is_empty());
    }
}
