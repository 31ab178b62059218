//! Error types for the pipeline engine

use thiserror::Error;

use crate::port::{PortAddr, PortDirection, PortType};

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while assembling, setting up, or running a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One or more processes rejected their configuration
    #[error("Configuration failed: {}", display_list(.0))]
    Configuration(Vec<ConfigFailure>),

    /// One or more structural connection problems
    #[error(transparent)]
    Connection(#[from] ConnectionReport),

    /// The process graph contains a dependency cycle
    #[error("Deadlock risk: dependency cycle through processes [{}]", .0.join(", "))]
    DeadlockRisk(Vec<String>),

    /// A process failed while initializing
    #[error("Process '{process}' failed to initialize: {message}")]
    Init { process: String, message: String },

    /// Raw edge misuse
    #[error("Edge error: {0}")]
    Edge(#[from] EdgeError),

    /// The operation requires `setup_pipeline` to have succeeded
    #[error("Pipeline has not been set up")]
    NotSetUp,

    /// The topology is frozen
    #[error("Pipeline is already set up; its structure can no longer change")]
    AlreadySetUp,

    /// Pipelines are single-shot
    #[error("Pipeline has already been run")]
    AlreadyRan,

    /// No factory registered under this process type
    #[error("Unknown process type: {0}")]
    UnknownProcessType(String),

    /// At least one process failed during the run
    #[error("Run failed: {}", display_list(.0))]
    RunFailed(Vec<ProcessFailure>),

    /// Runtime construction failed in `run_blocking`
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single structural problem found during assembly or setup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Name '{0}' is already used by a process or group")]
    DuplicateName(String),

    #[error("No process or group named '{0}'")]
    UnknownProcess(String),

    #[error("No port '{port}' on '{process}'")]
    UnknownPort { process: String, port: String },

    #[error("Port '{addr}' is not an {expected} port")]
    DirectionMismatch {
        addr: PortAddr,
        expected: PortDirection,
    },

    #[error("Cannot connect '{upstream}' ({upstream_type}) to '{downstream}' ({downstream_type})")]
    TypeMismatch {
        upstream: PortAddr,
        upstream_type: PortType,
        downstream: PortAddr,
        downstream_type: PortType,
    },

    #[error("Cannot connect '{upstream}' to '{downstream}': {reason}")]
    FlagMismatch {
        upstream: PortAddr,
        downstream: PortAddr,
        reason: String,
    },

    #[error("Input '{0}' already has a connected edge")]
    InputAlreadyConnected(PortAddr),

    #[error("Required input '{0}' is not connected")]
    MissingRequiredInput(PortAddr),

    #[error("Required output '{0}' is not connected")]
    MissingRequiredOutput(PortAddr),

    #[error("Group port '{0}' is not mapped")]
    UnmappedGroupPort(PortAddr),

    #[error("Group output '{0}' is already mapped")]
    GroupOutputAlreadyMapped(PortAddr),

    #[error("Group port mapping through '{0}' forms a cycle")]
    MappingCycle(PortAddr),
}

/// Every connection problem found in one pass
///
/// Setup never stops at the first violation; callers get the full list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("Connection errors: {}", display_list(.errors))]
pub struct ConnectionReport {
    errors: Vec<ConnectionError>,
}

impl ConnectionReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation
    pub fn push(&mut self, error: ConnectionError) {
        self.errors.push(error);
    }

    /// All recorded violations
    pub fn errors(&self) -> &[ConnectionError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn contains(&self, error: &ConnectionError) -> bool {
        self.errors.contains(error)
    }

    /// `Ok(())` when no violations were recorded
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Connection(self))
        }
    }
}

impl From<ConnectionError> for ConnectionReport {
    fn from(error: ConnectionError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl From<ConnectionError> for PipelineError {
    fn from(error: ConnectionError) -> Self {
        Self::Connection(error.into())
    }
}

/// Configuration problem reported by the engine or by `Process::configure`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required key '{0}'")]
    MissingKey(String),

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// A configuration error attributed to the process it came from
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("process '{process}': {error}")]
pub struct ConfigFailure {
    pub process: String,
    pub error: ConfigError,
}

/// Errors from the raw edge API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdgeError {
    #[error("push to '{0}' after its consumer marked it complete")]
    DownstreamComplete(String),

    #[error("push to '{0}' after its stream ended")]
    UpstreamComplete(String),
}

/// Domain failure raised from inside a process step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("{0}")]
    Failed(String),

    #[error("port '{0}' is not declared")]
    UnknownPort(String),

    #[error("input '{0}' is not connected")]
    Unconnected(String),

    #[error("output '{0}' was already completed")]
    OutputCompleted(String),

    #[error("payload on '{port}' is not a {expected}")]
    PayloadType { port: String, expected: &'static str },

    #[error("upstream error on '{port}': {message}")]
    Upstream { port: String, message: String },

    #[error("process panicked: {0}")]
    Panicked(String),
}

impl StepError {
    /// Create a failed-step error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// A process that ended a run in the `Failed` state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("process '{process}' failed: {message}")]
pub struct ProcessFailure {
    pub process: String,
    pub message: String,
}

fn display_list<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
