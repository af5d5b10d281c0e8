// SPDX-License-Identifier: MIT

//! Step trait and step outcomes

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::context::StepContext;
use super::error::StepError;
use crate::waypoint::workflow::state::WorkflowState;

/// Reserved target name that ends a run
pub const END: &str = "__end__";

/// Field values a step writes back into the state, merged through reducers
pub type StateUpdate = Map<String, Value>;

/// What a step hands back to the executor
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Merge the fields, then follow the graph's transition for this step
    Update(StateUpdate),
    /// Merge the fields, then jump straight to `goto` (a step name or `END`)
    Command { update: StateUpdate, goto: String },
}

impl StepOutcome {
    /// Leave the state untouched and follow the transition table
    pub fn unchanged() -> Self {
        Self::Update(Map::new())
    }

    /// Jump to `target` without touching the state
    pub fn goto(target: impl Into<String>) -> Self {
        Self::Command {
            update: Map::new(),
            goto: target.into(),
        }
    }

    /// Add one field to the update carried by this outcome
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        match &mut self {
            Self::Update(update) | Self::Command { update, .. } => {
                update.insert(key.into(), value);
            }
        }
        self
    }

    /// Split into the update and the optional routing directive
    pub fn into_parts(self) -> (StateUpdate, Option<String>) {
        match self {
            Self::Update(update) => (update, None),
            Self::Command { update, goto } => (update, Some(goto)),
        }
    }
}

impl Default for StepOutcome {
    fn default() -> Self {
        Self::unchanged()
    }
}

/// One named unit of work in a step graph
///
/// A step sees a read-only view of the state and reports the fields it wants
/// to change. To wait for outside input it calls [`StepContext::interrupt`]
/// and propagates the error with `?`; when the run is resumed the step is
/// invoked again and the same call returns the supplied answer. Code before
/// the interrupt therefore runs twice and should not have side effects.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &mut StepContext,
    ) -> Result<StepOutcome, StepError>;

    /// Step names this step may `goto`, checked when the graph is compiled
    fn targets(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Adapter turning a synchronous closure into a [`Step`]
pub struct FnStep<F> {
    func: F,
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&WorkflowState, &mut StepContext) -> Result<StepOutcome, StepError> + Send + Sync,
{
    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &mut StepContext,
    ) -> Result<StepOutcome, StepError> {
        (self.func)(state, ctx)
    }
}

/// Wrap a closure as a shareable step
pub fn step_fn<F>(func: F) -> Arc<dyn Step>
where
    F: Fn(&WorkflowState, &mut StepContext) -> Result<StepOutcome, StepError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnStep { func })
}
