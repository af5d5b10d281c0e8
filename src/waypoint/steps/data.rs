// SPDX-License-Identifier: MIT

//! Step kinds that only write to the state

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{parse_params, render_template};
use crate::sdk::context::StepContext;
use crate::sdk::error::{GraphError, StepError};
use crate::sdk::kind::StepKind;
use crate::sdk::step::{Step, StepOutcome};
use crate::waypoint::workflow::state::{ReducerType, WorkflowState};

/// `set`: write fixed values; string values may use `{field}` placeholders
pub struct SetKind;

#[derive(Deserialize)]
struct SetParams {
    #[serde(default)]
    values: Map<String, Value>,
}

struct SetStep {
    values: Map<String, Value>,
}

impl StepKind for SetKind {
    fn name(&self) -> &str {
        "set"
    }

    fn description(&self) -> &str {
        "Write the fields of `values` into the state"
    }

    fn build(&self, params: &Value) -> Result<Arc<dyn Step>, GraphError> {
        let params: SetParams = parse_params(self.name(), params)?;
        Ok(Arc::new(SetStep {
            values: params.values,
        }))
    }
}

#[async_trait]
impl Step for SetStep {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: &mut StepContext,
    ) -> Result<StepOutcome, StepError> {
        let update = self
            .values
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(template) => Value::String(render_template(template, state)),
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        Ok(StepOutcome::Update(update))
    }
}

/// `increment`: add to an integer field
pub struct IncrementKind;

#[derive(Deserialize)]
struct IncrementParams {
    field: String,
    #[serde(default = "default_by")]
    by: i64,
}

fn default_by() -> i64 {
    1
}

struct IncrementStep {
    field: String,
    by: i64,
}

impl StepKind for IncrementKind {
    fn name(&self) -> &str {
        "increment"
    }

    fn description(&self) -> &str {
        "Add `by` (default 1) to the integer `field`"
    }

    fn build(&self, params: &Value) -> Result<Arc<dyn Step>, GraphError> {
        let params: IncrementParams = parse_params(self.name(), params)?;
        Ok(Arc::new(IncrementStep {
            field: params.field,
            by: params.by,
        }))
    }
}

#[async_trait]
impl Step for IncrementStep {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: &mut StepContext,
    ) -> Result<StepOutcome, StepError> {
        let current = match state.get(&self.field) {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_i64().ok_or_else(|| {
                StepError::failed(format!(
                    "field '{}' is not an integer: {}",
                    self.field, value
                ))
            })?,
        };
        let next = current.checked_add(self.by).ok_or_else(|| {
            StepError::failed(format!(
                "field '{}' overflows when adding {} to {}",
                self.field, self.by, current
            ))
        })?;
        Ok(StepOutcome::unchanged().set(self.field.clone(), json!(next)))
    }
}

/// `message`: append a `[role, text]` pair to a message list
pub struct MessageKind;

#[derive(Deserialize)]
struct MessageParams {
    #[serde(default = "default_role")]
    role: String,
    text: String,
    #[serde(default = "default_messages_field")]
    field: String,
}

fn default_role() -> String {
    "assistant".to_string()
}

fn default_messages_field() -> String {
    "messages".to_string()
}

struct MessageStep {
    role: String,
    text: String,
    field: String,
}

impl StepKind for MessageKind {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Append a [role, text] message to `field`; text may use {field} placeholders"
    }

    fn build(&self, params: &Value) -> Result<Arc<dyn Step>, GraphError> {
        let params: MessageParams = parse_params(self.name(), params)?;
        Ok(Arc::new(MessageStep {
            role: params.role,
            text: params.text,
            field: params.field,
        }))
    }
}

#[async_trait]
impl Step for MessageStep {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: &mut StepContext,
    ) -> Result<StepOutcome, StepError> {
        let entry = json!([self.role, render_template(&self.text, state)]);

        let value = if state.reducer_for(&self.field) == ReducerType::Append {
            json!([entry])
        } else {
            let mut items = state
                .get(&self.field)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            items.push(entry);
            Value::Array(items)
        };
        Ok(StepOutcome::unchanged().set(self.field.clone(), value))
    }
}
