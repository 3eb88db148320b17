//! Error types for stagehand.
//!
//! Uses `thiserror` for a single structured error type whose variants map to
//! exit codes and stable error codes.
//!
//! ## Error Taxonomy
//!
//! Every error carries an [`ErrorKind`] tag instead of relying on the identity
//! of a particular variant to signal intent:
//! - **SetupFailure**: a fixture could not be established (never retried)
//! - **TeardownFailure**: a fixture could not be released (resource leak)
//! - **ActivationFailure**: a service group failed to start or stop
//! - **ObserverFailure**: a lifecycle observer callback failed
//! - **ContractViolation**: mismatched enter/exit pairing, a caller bug
//! - **Assertion**: a leaf test failed its own check
//! - **Configuration**: config or plan files are missing or invalid
//! - **Internal**: I/O, serialization, panics and unclassified errors
//!
//! Teardown errors travel unwrapped (see [`crate::core::fixture`]); the
//! `TeardownFailure` kind is assigned when such an error is recorded against
//! a composite test in the teardown phase.

pub mod suggestions;

use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Kinds
// =============================================================================

/// Tagged classification of every error the coordinator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Establishing a fixture failed.
    SetupFailure,
    /// Releasing a fixture failed.
    TeardownFailure,
    /// Activating or deactivating a service group failed.
    ActivationFailure,
    /// A lifecycle observer callback failed.
    ObserverFailure,
    /// Enter/exit pairing was violated.
    ContractViolation,
    /// A leaf test assertion failed.
    Assertion,
    /// Configuration or plan problems.
    Configuration,
    /// Unexpected errors, panics, I/O.
    Internal,
}

impl ErrorKind {
    /// Returns a human-readable description of the kind.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::SetupFailure => "Setup failure",
            Self::TeardownFailure => "Teardown failure",
            Self::ActivationFailure => "Activation failure",
            Self::ObserverFailure => "Observer failure",
            Self::ContractViolation => "Contract violation",
            Self::Assertion => "Assertion failure",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns the short code prefix used in error codes.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::SetupFailure | Self::TeardownFailure | Self::ActivationFailure => "S",
            Self::ObserverFailure => "O",
            Self::ContractViolation => "V",
            Self::Assertion => "T",
            Self::Configuration => "C",
            Self::Internal => "X",
        }
    }

    /// Stable snake_case label for machine-readable output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::SetupFailure => "setup_failure",
            Self::TeardownFailure => "teardown_failure",
            Self::ActivationFailure => "activation_failure",
            Self::ObserverFailure => "observer_failure",
            Self::ContractViolation => "contract_violation",
            Self::Assertion => "assertion",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the `stagehand` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Every test passed.
    Success = 0,
    /// At least one test failed or errored.
    TestsFailed = 1,
    /// Config or plan file problems.
    ConfigError = 2,
    /// Unexpected failure.
    InternalError = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

// =============================================================================
// Activation stages and lifecycle events
// =============================================================================

/// Which half of a service activation scope failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStage {
    Activate,
    Deactivate,
}

impl std::fmt::Display for ActivationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activate => write!(f, "activate"),
            Self::Deactivate => write!(f, "deactivate"),
        }
    }
}

/// Lifecycle event an observer was notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start,
    End,
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
        }
    }
}

// =============================================================================
// Main error type
// =============================================================================

/// Main error type for stagehand operations.
#[derive(Error, Debug)]
pub enum StagehandError {
    // ==========================================================================
    // Coordination errors
    // ==========================================================================
    /// The setup of a fixture node failed; the wrapped test never ran.
    #[error("setup of '{test}' failed: {source}")]
    SetupFailed {
        test: String,
        #[source]
        source: Box<StagehandError>,
    },

    /// A service group could not be activated or deactivated.
    #[error("failed to {stage} services [{services}]: {source}")]
    ActivationFailed {
        services: String,
        stage: ActivationStage,
        #[source]
        source: Box<StagehandError>,
    },

    /// A lifecycle observer callback failed for a leaf test.
    #[error("observer failed on {event} of '{test}': {source}")]
    ObserverFailed {
        test: String,
        event: LifecycleEvent,
        #[source]
        source: Box<StagehandError>,
    },

    /// Enter/exit calls on a nesting counter were mismatched.
    #[error("nesting contract violated: {message}")]
    ContractViolation { message: String },

    // ==========================================================================
    // Test outcome errors
    // ==========================================================================
    /// A leaf test assertion failed.
    #[error("assertion failed: {message}")]
    AssertionFailed { message: String },

    /// A test body or callback panicked.
    #[error("panicked: {message}")]
    Panicked { message: String },

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    /// A service name is not registered with the provider.
    #[error("unknown service: {name}")]
    UnknownService { name: String },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error parsing a configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// A plan file is structurally invalid.
    #[error("invalid plan {path}: {message}")]
    PlanInvalid { path: String, message: String },

    // ==========================================================================
    // Internal errors
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors raised by user-supplied setup, teardown and test bodies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StagehandError {
    /// Build an assertion failure.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Build a contract violation.
    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    /// Build an error from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked { message }
    }

    /// Returns the tagged kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SetupFailed { .. } => ErrorKind::SetupFailure,
            Self::ActivationFailed { .. } => ErrorKind::ActivationFailure,
            Self::ObserverFailed { .. } => ErrorKind::ObserverFailure,
            Self::ContractViolation { .. } => ErrorKind::ContractViolation,
            Self::AssertionFailed { .. } => ErrorKind::Assertion,
            Self::UnknownService { .. }
            | Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::PlanInvalid { .. } => ErrorKind::Configuration,
            Self::Panicked { .. } | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `STG-{prefix}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SetupFailed { .. } => "STG-S001",
            Self::ActivationFailed { .. } => "STG-S010",
            Self::ObserverFailed { .. } => "STG-O001",
            Self::ContractViolation { .. } => "STG-V001",
            Self::AssertionFailed { .. } => "STG-T001",
            Self::Panicked { .. } => "STG-T002",
            Self::Config(_) => "STG-C001",
            Self::ConfigParse { .. } => "STG-C002",
            Self::PlanInvalid { .. } => "STG-C003",
            Self::UnknownService { .. } => "STG-C010",
            Self::Io(_) => "STG-X001",
            Self::Json(_) => "STG-X002",
            Self::Other(_) => "STG-X099",
        }
    }

    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self.kind() {
            ErrorKind::Configuration => ExitCode::ConfigError,
            ErrorKind::Internal => ExitCode::InternalError,
            ErrorKind::SetupFailure
            | ErrorKind::TeardownFailure
            | ErrorKind::ActivationFailure
            | ErrorKind::ObserverFailure
            | ErrorKind::ContractViolation
            | ErrorKind::Assertion => ExitCode::TestsFailed,
        }
    }

    /// Whether this is a plain assertion failure rather than an error.
    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(self, Self::AssertionFailed { .. })
    }

    /// Follow wrapped coordination errors down to the original cause.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::SetupFailed { source, .. }
            | Self::ActivationFailed { source, .. }
            | Self::ObserverFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for stagehand operations.
pub type Result<T> = std::result::Result<T, StagehandError>;

// =============================================================================
// Tests
// =============================================================================
