//! stagehand - fixture lifecycle coordinator
//!
//! Manages expensive, shared setup/teardown actions across a tree of tests so
//! that each distinct fixture is established at most once per active period
//! and released when its last consumer finishes.
//!
//! ```
//! use stagehand::core::{CounterRegistry, FnAction, MergeKey, Test, TestCase, TestResult, TestSuite};
//!
//! let registry = CounterRegistry::new();
//! let tables = || FnAction::new(|| Ok(()), || Ok(()));
//! let mut suite = TestSuite::new("all")
//!     .with(stagehand::wrap_keyed(TestCase::new("reads", || Ok(())), MergeKey::named("tables"), tables(), &registry))
//!     .with(stagehand::wrap_keyed(TestCase::new("writes", || Ok(())), MergeKey::named("tables"), tables(), &registry));
//! suite.rearrange();
//!
//! let mut result = TestResult::new();
//! suite.run(&mut result);
//! assert!(result.was_successful());
//! assert_eq!(result.run_count(), 2);
//! ```

// deny (not forbid) so test helpers can #[allow(unsafe_code)] for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod plan;
pub mod render;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::core::{bridge_reporting, compose, compose_all, wrap, wrap_keyed};
pub use error::{ExitCode, Result, StagehandError};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
