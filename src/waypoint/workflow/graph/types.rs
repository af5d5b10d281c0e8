// SPDX-License-Identifier: MIT

//! Step graph type definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::sdk::router::Router;
use crate::waypoint::workflow::state::WorkflowState;

/// Outgoing edge of a step
#[derive(Clone)]
pub enum Transition {
    /// Always go to the target (a step name or `END`)
    Static(String),
    /// Ask the router; its answer must be one of `candidates`
    Routed {
        candidates: Vec<String>,
        router: Arc<dyn Router>,
    },
    /// Run the step `times` times in a row, then go to `then`
    Repeat { times: u32, then: String },
}

impl Transition {
    /// Every target this transition can lead to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Transition::Static(to) => vec![to.as_str()],
            Transition::Routed { candidates, .. } => candidates.iter().map(String::as_str).collect(),
            Transition::Repeat { then, .. } => vec![then.as_str()],
        }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Static(to) => f.debug_tuple("Static").field(to).finish(),
            Transition::Routed { candidates, .. } => f
                .debug_struct("Routed")
                .field("candidates", candidates)
                .finish_non_exhaustive(),
            Transition::Repeat { times, then } => f
                .debug_struct("Repeat")
                .field("times", times)
                .field("then", then)
                .finish(),
        }
    }
}

/// Everything needed to continue a paused run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseToken {
    pub run_id: String,
    pub graph: String,
    /// Step that asked to pause
    pub step: String,
    /// What the step asked for
    pub payload: Value,
    /// Answers already given to earlier pause points of the same step
    #[serde(default)]
    pub answers: Vec<Value>,
    /// State the paused step was invoked with
    pub state: Value,
    pub steps_taken: usize,
    #[serde(default)]
    pub visits: HashMap<String, u32>,
    /// Steps entered so far, in order
    #[serde(default)]
    pub path: Vec<String>,
}

/// Result of running or resuming a graph
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed {
        run_id: String,
        state: WorkflowState,
        path: Vec<String>,
    },
    Paused(PauseToken),
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            RunOutcome::Completed { run_id, .. } => run_id,
            RunOutcome::Paused(token) => &token.run_id,
        }
    }

    /// Final state, if the run completed
    pub fn state(&self) -> Option<&WorkflowState> {
        match self {
            RunOutcome::Completed { state, .. } => Some(state),
            RunOutcome::Paused(_) => None,
        }
    }

    /// Pause token, if the run paused
    pub fn token(&self) -> Option<&PauseToken> {
        match self {
            RunOutcome::Paused(token) => Some(token),
            RunOutcome::Completed { .. } => None,
        }
    }

    /// Steps entered by the run, in order
    pub fn path(&self) -> &[String] {
        match self {
            RunOutcome::Completed { path, .. } => path,
            RunOutcome::Paused(token) => &token.path,
        }
    }
}

/// Progress notifications emitted while a run executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    StepStarted { run_id: String, step: String },
    StepCompleted { run_id: String, step: String, next: String },
    Paused { run_id: String, step: String, payload: Value },
    Completed { run_id: String, state: Value },
    Failed { run_id: String, step: Option<String>, error: String },
}
