// SPDX-License-Identifier: MIT

//! Typed error handling for waypoint-rs
//!
//! `GraphError` covers graph construction, execution and run bookkeeping.
//! `StepError` is what a single step reports back to the executor: either a
//! pause request or a failure.

use serde_json::Value;
use thiserror::Error;

/// Top-level error type for graph construction and execution
#[derive(Debug, Error)]
pub enum GraphError {
    /// A step name was registered twice (or uses the reserved end marker)
    #[error("Step '{0}' is already registered")]
    DuplicateName(String),

    /// A transition or start step references an unregistered step
    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    /// A step was given a second outgoing transition
    #[error("Step '{0}' already has an outgoing transition")]
    DuplicateTransition(String),

    /// The graph was compiled without a start step
    #[error("Graph '{0}' has no start step")]
    MissingStart(String),

    /// A router or routing directive picked an invalid target
    #[error("Routing error after step '{step}': {reason}")]
    Routing { step: String, reason: String },

    /// A step failed; carries the state the step was invoked with
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        state: Value,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The run executed more steps than the configured limit
    #[error("Run exceeded the limit of {limit} steps")]
    StepLimitExceeded { limit: usize },

    /// State did not match the workflow's schema
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No run is stored under the given identifier
    #[error("No run with id '{0}'")]
    NoSuchRun(String),

    /// Another call currently holds the run
    #[error("Run '{0}' is busy with another call, retry once it completes")]
    ConcurrentResume(String),

    /// A paused run already uses the identifier
    #[error("Run '{0}' is paused; resume or discard it first")]
    RunExists(String),

    /// The run ended in failure and cannot be resumed
    #[error("Run '{run_id}' failed: {error}")]
    RunFailed { run_id: String, error: String },

    /// No graph is registered under the given name
    #[error("Unknown graph '{0}'")]
    UnknownGraph(String),

    /// Checkpoint storage failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Invalid declarative workflow definition
    #[error("Workflow definition error: {0}")]
    Definition(String),

    /// Condition expression could not be parsed
    #[error("Condition error: {0}")]
    Condition(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl GraphError {
    /// Create a definition error
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint(message.into())
    }

    /// Name of the step the error is attributed to, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::StepFailed { step, .. } | Self::Routing { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Whether the error was caused by caller input rather than the graph
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoSuchRun(_)
                | Self::ConcurrentResume(_)
                | Self::RunExists(_)
                | Self::RunFailed { .. }
                | Self::InvalidState(_)
                | Self::UnknownGraph(_)
        )
    }
}

/// Error returned by a step invocation
#[derive(Debug, Error)]
pub enum StepError {
    /// The step asked to pause; the payload describes the input it needs
    #[error("step paused awaiting input")]
    Interrupted(Value),

    /// The step failed
    #[error(transparent)]
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl StepError {
    /// Create a failure from a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into().into())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for StepError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Failed(err)
    }
}

impl From<String> for StepError {
    fn from(s: String) -> Self {
        Self::failed(s)
    }
}

impl From<&str> for StepError {
    fn from(s: &str) -> Self {
        Self::failed(s)
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Failed(Box::new(err))
    }
}

impl From<GraphError> for StepError {
    fn from(err: GraphError) -> Self {
        Self::Failed(Box::new(err))
    }
}
