//! Step graph executor

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{PauseToken, RunEvent, RunOutcome, Transition};
use crate::sdk::context::StepContext;
use crate::sdk::error::{GraphError, StepError};
use crate::sdk::step::{Step, END};
use crate::waypoint::config::Config;
use crate::waypoint::workflow::state::{StateSchema, WorkflowState};

/// Compiled, immutable step graph
pub struct StepGraph {
    name: String,
    description: String,
    schema: Arc<StateSchema>,
    steps: HashMap<String, Arc<dyn Step>>,
    order: Vec<String>, // Registration order, for listings
    transitions: HashMap<String, Transition>,
    start: String,
}

/// Where a run currently stands
struct Cursor {
    run_id: String,
    state: WorkflowState,
    current: String,
    answers: Vec<Value>,
    resuming: bool,
    steps_taken: usize,
    visits: HashMap<String, u32>,
    path: Vec<String>,
}

impl StepGraph {
    pub(super) fn new(
        name: String,
        description: String,
        schema: Arc<StateSchema>,
        steps: HashMap<String, Arc<dyn Step>>,
        order: Vec<String>,
        transitions: HashMap<String, Transition>,
        start: String,
    ) -> Self {
        Self {
            name,
            description,
            schema,
            steps,
            order,
            transitions,
            start,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    /// Step names in registration order
    pub fn steps(&self) -> &[String] {
        &self.order
    }

    pub fn transition(&self, step: &str) -> Option<&Transition> {
        self.transitions.get(step)
    }

    /// Build and validate the initial state of a run from caller input
    pub fn initial_state(&self, input: Value) -> Result<WorkflowState, GraphError> {
        WorkflowState::from_input(self.schema.clone(), input)
    }

    /// JSON summary of the graph's structure
    pub fn describe(&self) -> Value {
        let transitions: serde_json::Map<String, Value> = self
            .order
            .iter()
            .filter_map(|name| {
                self.transitions.get(name).map(|t| {
                    let edge = match t {
                        Transition::Static(to) => json!({ "to": to }),
                        Transition::Routed { candidates, .. } => json!({ "routes": candidates }),
                        Transition::Repeat { times, then } => {
                            json!({ "repeat": { "times": times, "then": then } })
                        }
                    };
                    (name.clone(), edge)
                })
            })
            .collect();

        json!({
            "name": self.name,
            "description": self.description,
            "start": self.start,
            "steps": self.order,
            "transitions": transitions,
            "state": self.schema.as_ref(),
        })
    }

    /// Run from the start step under a fresh run id
    pub async fn run(
        &self,
        state: WorkflowState,
        config: Arc<Config>,
    ) -> Result<RunOutcome, GraphError> {
        let run_id = Uuid::new_v4().to_string();
        self.start_run(&run_id, state, config, None).await
    }

    /// Run from the start step, optionally streaming progress events
    pub async fn start_run(
        &self,
        run_id: &str,
        state: WorkflowState,
        config: Arc<Config>,
        events: Option<&mpsc::Sender<RunEvent>>,
    ) -> Result<RunOutcome, GraphError> {
        log::info!("Starting run {} of graph '{}'", run_id, self.name);

        let cursor = Cursor {
            run_id: run_id.to_string(),
            state,
            current: self.start.clone(),
            answers: Vec::new(),
            resuming: false,
            steps_taken: 0,
            visits: HashMap::new(),
            path: Vec::new(),
        };
        self.drive(cursor, &config, events).await
    }

    /// Continue a paused run, handing `answer` to the paused step
    pub async fn resume(
        &self,
        token: PauseToken,
        answer: Value,
        config: Arc<Config>,
    ) -> Result<RunOutcome, GraphError> {
        self.resume_run(token, answer, config, None).await
    }

    pub async fn resume_run(
        &self,
        token: PauseToken,
        answer: Value,
        config: Arc<Config>,
        events: Option<&mpsc::Sender<RunEvent>>,
    ) -> Result<RunOutcome, GraphError> {
        if token.graph != self.name {
            return Err(GraphError::checkpoint(format!(
                "run {} belongs to graph '{}', not '{}'",
                token.run_id, token.graph, self.name
            )));
        }
        if !self.steps.contains_key(&token.step) {
            return Err(GraphError::UnknownStep(token.step));
        }

        log::info!(
            "Resuming run {} of graph '{}' at step '{}'",
            token.run_id,
            self.name,
            token.step
        );

        let mut answers = token.answers;
        answers.push(answer);

        let cursor = Cursor {
            run_id: token.run_id,
            state: WorkflowState::restore(self.schema.clone(), token.state)?,
            current: token.step,
            answers,
            resuming: true,
            steps_taken: token.steps_taken,
            visits: token.visits,
            path: token.path,
        };
        self.drive(cursor, &config, events).await
    }

    /// Execute steps one at a time until `END`, a pause or a failure
    async fn drive(
        &self,
        mut cursor: Cursor,
        config: &Arc<Config>,
        events: Option<&mpsc::Sender<RunEvent>>,
    ) -> Result<RunOutcome, GraphError> {
        loop {
            if cursor.current == END {
                log::info!(
                    "Run {} completed after {} steps",
                    cursor.run_id,
                    cursor.steps_taken
                );
                emit(
                    events,
                    RunEvent::Completed {
                        run_id: cursor.run_id.clone(),
                        state: cursor.state.to_json(),
                    },
                )
                .await;
                return Ok(RunOutcome::Completed {
                    run_id: cursor.run_id,
                    state: cursor.state,
                    path: cursor.path,
                });
            }

            if cursor.steps_taken >= config.max_steps {
                let err = GraphError::StepLimitExceeded {
                    limit: config.max_steps,
                };
                return Err(fail(events, &cursor, err).await);
            }

            let step_name = cursor.current.clone();
            let Some(step) = self.steps.get(&step_name) else {
                let err = GraphError::UnknownStep(step_name);
                return Err(fail(events, &cursor, err).await);
            };

            if !cursor.resuming {
                *cursor.visits.entry(step_name.clone()).or_insert(0) += 1;
                cursor.path.push(step_name.clone());
            }
            cursor.resuming = false;

            let visit = cursor.visits.get(&step_name).copied().unwrap_or(1);
            let mut ctx = StepContext::new(
                cursor.run_id.clone(),
                step_name.clone(),
                visit,
                std::mem::take(&mut cursor.answers),
                config.clone(),
            );

            log::info!("Executing step: {}", step_name);
            emit(
                events,
                RunEvent::StepStarted {
                    run_id: cursor.run_id.clone(),
                    step: step_name.clone(),
                },
            )
            .await;

            match step.run(&cursor.state, &mut ctx).await {
                Ok(outcome) => {
                    cursor.steps_taken += 1;
                    let (update, goto) = outcome.into_parts();

                    if let Err(e) = cursor.state.apply(update) {
                        let err = GraphError::StepFailed {
                            step: step_name,
                            state: cursor.state.to_json(),
                            source: Box::new(e),
                        };
                        return Err(fail(events, &cursor, err).await);
                    }

                    let next = match goto {
                        Some(target) => self.check_directive(&step_name, target),
                        None => self.next_after(&step_name, &cursor),
                    };
                    let next = match next {
                        Ok(next) => next,
                        Err(err) => return Err(fail(events, &cursor, err).await),
                    };

                    log::debug!("Step {} completed, next: {}", step_name, next);
                    emit(
                        events,
                        RunEvent::StepCompleted {
                            run_id: cursor.run_id.clone(),
                            step: step_name,
                            next: next.clone(),
                        },
                    )
                    .await;
                    cursor.current = next;
                }
                Err(StepError::Interrupted(payload)) => {
                    log::info!("Run {} paused at step {}", cursor.run_id, step_name);
                    emit(
                        events,
                        RunEvent::Paused {
                            run_id: cursor.run_id.clone(),
                            step: step_name.clone(),
                            payload: payload.clone(),
                        },
                    )
                    .await;
                    return Ok(RunOutcome::Paused(PauseToken {
                        run_id: cursor.run_id,
                        graph: self.name.clone(),
                        step: step_name,
                        payload,
                        answers: ctx.into_answers(),
                        state: cursor.state.into_json(),
                        steps_taken: cursor.steps_taken,
                        visits: cursor.visits,
                        path: cursor.path,
                    }));
                }
                Err(StepError::Failed(source)) => {
                    log::error!("Step {} failed: {}", step_name, source);
                    let err = GraphError::StepFailed {
                        step: step_name,
                        state: cursor.state.to_json(),
                        source,
                    };
                    return Err(fail(events, &cursor, err).await);
                }
            }
        }
    }

    /// Validate a step's own routing directive
    fn check_directive(&self, step: &str, target: String) -> Result<String, GraphError> {
        if target == END || self.steps.contains_key(&target) {
            Ok(target)
        } else {
            Err(GraphError::Routing {
                step: step.to_string(),
                reason: format!("'{}' is not a registered step", target),
            })
        }
    }

    /// Consult the transition table; a step without one ends the run
    fn next_after(&self, step: &str, cursor: &Cursor) -> Result<String, GraphError> {
        match self.transitions.get(step) {
            None => Ok(END.to_string()),
            Some(Transition::Static(to)) => Ok(to.clone()),
            Some(Transition::Routed { candidates, router }) => {
                let target = router
                    .route(&cursor.state)
                    .map_err(|e| GraphError::Routing {
                        step: step.to_string(),
                        reason: e.to_string(),
                    })?;
                if candidates.contains(&target) {
                    Ok(target)
                } else {
                    Err(GraphError::Routing {
                        step: step.to_string(),
                        reason: format!("'{}' is not one of {:?}", target, candidates),
                    })
                }
            }
            Some(Transition::Repeat { times, then }) => {
                let streak = cursor
                    .path
                    .iter()
                    .rev()
                    .take_while(|s| s.as_str() == step)
                    .count();
                if (streak as u32) < *times {
                    Ok(step.to_string())
                } else {
                    Ok(then.clone())
                }
            }
        }
    }
}

async fn emit(events: Option<&mpsc::Sender<RunEvent>>, event: RunEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

async fn fail(
    events: Option<&mpsc::Sender<RunEvent>>,
    cursor: &Cursor,
    err: GraphError,
) -> GraphError {
    emit(
        events,
        RunEvent::Failed {
            run_id: cursor.run_id.clone(),
            step: err.step().map(str::to_string),
            error: err.to_string(),
        },
    )
    .await;
    err
}
