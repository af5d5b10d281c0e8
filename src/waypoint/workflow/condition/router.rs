// SPDX-License-Identifier: MIT

//! Router driven by `when` conditions

use std::error::Error;

use super::ast::Expression;
use super::evaluator::evaluate;
use super::parser::parse;
use crate::sdk::error::GraphError;
use crate::sdk::router::Router;
use crate::waypoint::workflow::state::WorkflowState;

/// Ordered list of `(condition, target)` routes; the first match wins and a
/// route without a condition always matches
#[derive(Debug, Clone, Default)]
pub struct ConditionRouter {
    routes: Vec<(Option<Expression>, String)>,
}

impl ConditionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route; `when` is parsed immediately so errors surface at build time
    pub fn route(
        mut self,
        when: Option<&str>,
        target: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let condition = when.map(parse).transpose()?;
        self.routes.push((condition, target.into()));
        Ok(self)
    }

    /// All targets, in declaration order
    pub fn targets(&self) -> Vec<String> {
        self.routes.iter().map(|(_, target)| target.clone()).collect()
    }
}

impl Router for ConditionRouter {
    fn route(&self, state: &WorkflowState) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.routes
            .iter()
            .find(|(condition, _)| condition.as_ref().map_or(true, |c| evaluate(c, state)))
            .map(|(_, target)| target.clone())
            .ok_or_else(|| "no route condition matched".into())
    }
}
