// SPDX-License-Identifier: MIT

//! Step kinds that pause for human input

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{answer_text, parse_params, render_template};
use crate::sdk::context::StepContext;
use crate::sdk::error::{GraphError, StepError};
use crate::sdk::kind::StepKind;
use crate::sdk::step::{Step, StepOutcome};
use crate::waypoint::workflow::builder::resolve_target;
use crate::waypoint::workflow::state::WorkflowState;

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// `ask`: pause with a prompt and store the answer
pub struct AskKind;

#[derive(Deserialize)]
struct AskParams {
    prompt: String,
    field: String,
}

struct AskStep {
    prompt: String,
    field: String,
}

impl StepKind for AskKind {
    fn name(&self) -> &str {
        "ask"
    }

    fn description(&self) -> &str {
        "Pause with `prompt` and store the answer in `field`"
    }

    fn build(&self, params: &Value) -> Result<Arc<dyn Step>, GraphError> {
        let params: AskParams = parse_params(self.name(), params)?;
        Ok(Arc::new(AskStep {
            prompt: params.prompt,
            field: params.field,
        }))
    }
}

#[async_trait]
impl Step for AskStep {
    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &mut StepContext,
    ) -> Result<StepOutcome, StepError> {
        if !ctx.is_resuming() {
            log::info!(
                "Run {} step {} asking for '{}' (visit {})",
                ctx.run_id(),
                ctx.step(),
                self.field,
                ctx.visit()
            );
        }
        let answer = ctx.interrupt(json!(render_template(&self.prompt, state)))?;
        Ok(StepOutcome::unchanged().set(self.field.clone(), answer))
    }
}

/// `approval`: pause for a yes/no decision and branch on it
pub struct ApprovalKind;

#[derive(Deserialize)]
struct ApprovalParams {
    #[serde(default = "default_task")]
    task: String,
    /// State fields shown to the approver
    #[serde(default)]
    context: Vec<String>,
    #[serde(default = "default_approval_field")]
    field: String,
    #[serde(default = "default_approve_words")]
    approve: Vec<String>,
    on_approve: String,
    #[serde(default = "default_on_reject")]
    on_reject: String,
}

fn default_task() -> String {
    "Is this correct?".to_string()
}

fn default_approval_field() -> String {
    "approval".to_string()
}

fn default_approve_words() -> Vec<String> {
    vec!["yes".to_string(), "y".to_string()]
}

fn default_on_reject() -> String {
    "END".to_string()
}

struct ApprovalStep {
    task: String,
    context: Vec<String>,
    field: String,
    approve: Vec<String>,
    on_approve: String,
    on_reject: String,
}

impl StepKind for ApprovalKind {
    fn name(&self) -> &str {
        "approval"
    }

    fn description(&self) -> &str {
        "Pause for approval, then go to `on_approve` or `on_reject`"
    }

    fn build(&self, params: &Value) -> Result<Arc<dyn Step>, GraphError> {
        let params: ApprovalParams = parse_params(self.name(), params)?;
        if params.approve.is_empty() {
            return Err(GraphError::definition(
                "approval needs at least one approve word",
            ));
        }
        Ok(Arc::new(ApprovalStep {
            task: params.task,
            context: params.context,
            field: params.field,
            approve: params.approve.iter().map(|w| normalize(w)).collect(),
            on_approve: resolve_target(&params.on_approve),
            on_reject: resolve_target(&params.on_reject),
        }))
    }
}

#[async_trait]
impl Step for ApprovalStep {
    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &mut StepContext,
    ) -> Result<StepOutcome, StepError> {
        let mut payload = Map::new();
        payload.insert("task".to_string(), json!(render_template(&self.task, state)));
        for field in &self.context {
            let value = state.get_path(field).cloned().unwrap_or(Value::Null);
            payload.insert(field.clone(), value);
        }

        let answer = ctx.interrupt(Value::Object(payload))?;
        let approved = self.approve.contains(&normalize(&answer_text(&answer)));
        log::info!(
            "Run {} step {}: {}",
            ctx.run_id(),
            ctx.step(),
            if approved { "approved" } else { "rejected" }
        );

        let target = if approved {
            &self.on_approve
        } else {
            &self.on_reject
        };
        Ok(StepOutcome::goto(target.clone()).set(self.field.clone(), answer))
    }

    fn targets(&self) -> Vec<String> {
        vec![self.on_approve.clone(), self.on_reject.clone()]
    }
}

/// `quiz`: ask a question and score the answer
pub struct QuizKind;

#[derive(Deserialize)]
struct QuizParams {
    question: String,
    /// Accepted answers, compared case-insensitively
    answers: Vec<String>,
    #[serde(default = "default_answer_field")]
    answer_field: String,
    #[serde(default = "default_score_field")]
    score_field: String,
}

fn default_answer_field() -> String {
    "user_input".to_string()
}

fn default_score_field() -> String {
    "score".to_string()
}

struct QuizStep {
    question: String,
    answers: Vec<String>,
    answer_field: String,
    score_field: String,
}

impl StepKind for QuizKind {
    fn name(&self) -> &str {
        "quiz"
    }

    fn description(&self) -> &str {
        "Ask `question`; a matching answer adds one to `score`"
    }

    fn build(&self, params: &Value) -> Result<Arc<dyn Step>, GraphError> {
        let params: QuizParams = parse_params(self.name(), params)?;
        if params.answers.is_empty() {
            return Err(GraphError::definition("quiz needs at least one answer"));
        }
        Ok(Arc::new(QuizStep {
            question: params.question,
            answers: params.answers.iter().map(|a| normalize(a)).collect(),
            answer_field: params.answer_field,
            score_field: params.score_field,
        }))
    }
}

#[async_trait]
impl Step for QuizStep {
    async fn run(
        &self,
        state: &WorkflowState,
        ctx: &mut StepContext,
    ) -> Result<StepOutcome, StepError> {
        let answer = answer_text(&ctx.interrupt(json!(self.question))?);
        let correct = self.answers.contains(&normalize(&answer));

        let mut outcome = StepOutcome::unchanged().set(self.answer_field.clone(), json!(answer));
        if correct {
            let score = state
                .get(&self.score_field)
                .and_then(Value::as_i64)
                .unwrap_or(0);
            outcome = outcome.set(self.score_field.clone(), json!(score + 1));
        } else {
            log::debug!("Incorrect answer to '{}'", self.question);
        }
        Ok(outcome)
    }
}
