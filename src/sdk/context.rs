// SPDX-License-Identifier: MIT

//! Per-invocation context handed to steps

use serde_json::Value;
use std::sync::Arc;

use super::error::StepError;
use crate::waypoint::config::Config;

/// Context for a single step invocation
///
/// Carries the run identity, the shared configuration and any answers
/// supplied by `resume` for this step's pause points.
pub struct StepContext {
    run_id: String,
    step: String,
    visit: u32,
    answers: Vec<Value>,
    cursor: usize,
    config: Arc<Config>,
}

impl StepContext {
    pub fn new(
        run_id: impl Into<String>,
        step: impl Into<String>,
        visit: u32,
        answers: Vec<Value>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            step: step.into(),
            visit,
            answers,
            cursor: 0,
            config,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Name of the step being executed
    pub fn step(&self) -> &str {
        &self.step
    }

    /// How many times this step has been entered in the run, this one included
    pub fn visit(&self) -> u32 {
        self.visit
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up a free-form parameter from the configuration
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.config.params.get(key)
    }

    /// True when the step is re-entered with answers from `resume`
    pub fn is_resuming(&self) -> bool {
        !self.answers.is_empty()
    }

    /// Ask for outside input.
    ///
    /// Pause points are matched by order: the n-th call returns the n-th
    /// answer supplied for this step. Once the answers run out the call fails
    /// with [`StepError::Interrupted`] carrying `payload`, which the executor
    /// turns into a paused run.
    pub fn interrupt(&mut self, payload: Value) -> Result<Value, StepError> {
        match self.answers.get(self.cursor) {
            Some(answer) => {
                self.cursor += 1;
                Ok(answer.clone())
            }
            None => Err(StepError::Interrupted(payload)),
        }
    }

    /// Answers consumed or supplied so far, kept in the pause token
    pub(crate) fn into_answers(self) -> Vec<Value> {
        self.answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(answers: Vec<Value>) -> StepContext {
        StepContext::new("run", "ask", 1, answers, Arc::new(Config::default()))
    }

    #[test]
    fn test_interrupt_without_answer_pauses() {
        let mut ctx = ctx(vec![]);
        match ctx.interrupt(json!("approve?")) {
            Err(StepError::Interrupted(payload)) => assert_eq!(payload, json!("approve?")),
            other => panic!("expected interrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_interrupt_returns_answers_in_order() {
        let mut ctx = ctx(vec![json!("first"), json!("second")]);
        assert!(ctx.is_resuming());
        assert_eq!(ctx.interrupt(json!("q1")).unwrap(), json!("first"));
        assert_eq!(ctx.interrupt(json!("q2")).unwrap(), json!("second"));
        assert!(ctx.interrupt(json!("q3")).is_err());
    }

    #[test]
    fn test_param_reads_config() {
        let mut config = Config::default();
        config.params.insert("tone".to_string(), json!("formal"));
        let ctx = StepContext::new("run", "s", 1, vec![], Arc::new(config));
        assert_eq!(ctx.param("tone"), Some(&json!("formal")));
        assert_eq!(ctx.param("missing"), None);
    }
}
