// SPDX-License-Identifier: MIT

//! YAML schema types for workflow definitions
//!
//! This module contains the data structures parsed from workflow files.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sdk::error::GraphError;
use crate::waypoint::workflow::state::StateSchema;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// State fields shared by all steps
    #[serde(default)]
    pub state: StateSchema,
    /// Entry step
    pub start: String,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub transitions: Vec<TransitionDefinition>,
}

/// A step in a workflow
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct StepDefinition {
    /// Unique step name
    pub name: String,
    /// Step kind, looked up in the step registry
    pub uses: String,
    /// Parameters handed to the step kind
    #[serde(default)]
    pub with: Value,
}

/// Outgoing edge of a step: exactly one of `to`, `routes` or `repeat`
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct TransitionDefinition {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<RouteDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatDefinition>,
}

/// One candidate of a routed transition
#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct RouteDefinition {
    /// Condition; a route without one is the default
    #[serde(default)]
    pub when: Option<String>,
    pub to: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct RepeatDefinition {
    pub times: u32,
    pub then: String,
}

/// Borrowed view of a transition once its form is known
#[derive(Debug, Clone, Copy)]
pub enum EdgeDefinition<'a> {
    To(&'a str),
    Routes(&'a [RouteDefinition]),
    Repeat(&'a RepeatDefinition),
}

impl TransitionDefinition {
    pub fn edge(&self) -> Result<EdgeDefinition<'_>, GraphError> {
        match (&self.to, &self.routes, &self.repeat) {
            (Some(to), None, None) => Ok(EdgeDefinition::To(to)),
            (None, Some(routes), None) => Ok(EdgeDefinition::Routes(routes)),
            (None, None, Some(repeat)) => Ok(EdgeDefinition::Repeat(repeat)),
            _ => Err(GraphError::definition(format!(
                "transition from '{}' must set exactly one of 'to', 'routes' or 'repeat'",
                self.from
            ))),
        }
    }
}
