// SPDX-License-Identifier: MIT

//! Graph construction

use std::collections::HashMap;
use std::sync::Arc;

use super::executor::StepGraph;
use super::types::Transition;
use crate::sdk::error::GraphError;
use crate::sdk::router::Router;
use crate::sdk::step::{Step, END};
use crate::waypoint::workflow::state::StateSchema;

/// Collects steps and transitions, then compiles them into a [`StepGraph`]
///
/// Steps must be registered before any transition mentions them.
pub struct GraphBuilder {
    name: String,
    description: String,
    schema: StateSchema,
    steps: HashMap<String, Arc<dyn Step>>,
    order: Vec<String>,
    transitions: HashMap<String, Transition>,
    start: Option<String>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            schema: StateSchema::default(),
            steps: HashMap::new(),
            order: Vec::new(),
            transitions: HashMap::new(),
            start: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Register a step under a unique name
    pub fn register_step(
        &mut self,
        name: impl Into<String>,
        step: Arc<dyn Step>,
    ) -> Result<&mut Self, GraphError> {
        let name = name.into();
        if name == END || self.steps.contains_key(&name) {
            return Err(GraphError::DuplicateName(name));
        }
        self.order.push(name.clone());
        self.steps.insert(name, step);
        Ok(self)
    }

    /// Declare a fixed edge; `to` may be `END`
    pub fn add_transition(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<&mut Self, GraphError> {
        let from = from.into();
        let to = to.into();
        self.ensure_step(&from)?;
        self.ensure_target(&to)?;
        self.insert_transition(from, Transition::Static(to))
    }

    /// Declare an edge decided at runtime by `router`, which must answer
    /// with one of `candidates`
    pub fn add_conditional_transition<S, R>(
        &mut self,
        from: impl Into<String>,
        candidates: impl IntoIterator<Item = S>,
        router: R,
    ) -> Result<&mut Self, GraphError>
    where
        S: Into<String>,
        R: Router + 'static,
    {
        let from = from.into();
        self.ensure_step(&from)?;

        let candidates: Vec<String> = candidates.into_iter().map(Into::into).collect();
        if candidates.is_empty() {
            return Err(GraphError::definition(format!(
                "conditional transition from '{}' has no candidates",
                from
            )));
        }
        for candidate in &candidates {
            self.ensure_target(candidate)?;
        }

        self.insert_transition(
            from,
            Transition::Routed {
                candidates,
                router: Arc::new(router),
            },
        )
    }

    /// Run `step` `times` times in a row, then continue with `then`
    pub fn add_repeat(
        &mut self,
        step: impl Into<String>,
        times: u32,
        then: impl Into<String>,
    ) -> Result<&mut Self, GraphError> {
        let step = step.into();
        let then = then.into();
        self.ensure_step(&step)?;
        self.ensure_target(&then)?;
        if times == 0 {
            return Err(GraphError::definition(format!(
                "repeat on '{}' must run at least once",
                step
            )));
        }
        self.insert_transition(step, Transition::Repeat { times, then })
    }

    /// Designate the entry step
    pub fn set_start(&mut self, name: impl Into<String>) -> Result<&mut Self, GraphError> {
        let name = name.into();
        self.ensure_step(&name)?;
        self.start = Some(name);
        Ok(self)
    }

    pub fn compile(self) -> Result<StepGraph, GraphError> {
        let start = self
            .start
            .clone()
            .ok_or_else(|| GraphError::MissingStart(self.name.clone()))?;

        for name in &self.order {
            if let Some(step) = self.steps.get(name) {
                for target in step.targets() {
                    self.ensure_target(&target)?;
                }
            }
        }

        log::debug!(
            "Compiled graph '{}' with {} steps, starting at '{}'",
            self.name,
            self.order.len(),
            start
        );

        Ok(StepGraph::new(
            self.name,
            self.description,
            Arc::new(self.schema),
            self.steps,
            self.order,
            self.transitions,
            start,
        ))
    }

    fn ensure_step(&self, name: &str) -> Result<(), GraphError> {
        if self.steps.contains_key(name) {
            Ok(())
        } else {
            Err(GraphError::UnknownStep(name.to_string()))
        }
    }

    fn ensure_target(&self, name: &str) -> Result<(), GraphError> {
        if name == END {
            Ok(())
        } else {
            self.ensure_step(name)
        }
    }

    fn insert_transition(
        &mut self,
        from: String,
        transition: Transition,
    ) -> Result<&mut Self, GraphError> {
        if self.transitions.contains_key(&from) {
            return Err(GraphError::DuplicateTransition(from));
        }
        self.transitions.insert(from, transition);
        Ok(self)
    }
}
