// SPDX-License-Identifier: MIT

//! Session runner
//!
//! Wraps compiled graphs with run bookkeeping: run ids, checkpointed run
//! records and per-run locks. This is what callers (CLI, HTTP) talk to.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::sdk::error::GraphError;
use crate::waypoint::checkpoint::{Checkpointer, RunRecord, RunStatus};
use crate::waypoint::config::Config;
use crate::waypoint::workflow::graph::{RunEvent, RunOutcome, StepGraph};
use crate::waypoint::workflow::registry::GraphRegistry;

/// What a caller gets back from `start` or `resume`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunResponse {
    Completed {
        run_id: String,
        state: Value,
    },
    Paused {
        run_id: String,
        step: String,
        payload: Value,
    },
}

impl RunResponse {
    pub fn run_id(&self) -> &str {
        match self {
            RunResponse::Completed { run_id, .. } | RunResponse::Paused { run_id, .. } => run_id,
        }
    }
}

type RunLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

pub struct Runner {
    graphs: GraphRegistry,
    checkpointer: Arc<dyn Checkpointer>,
    config: Arc<Config>,
    locks: RunLocks,
}

/// Exclusive hold on one run; the map entry goes away with the last holder
struct RunLock {
    guard: Option<OwnedMutexGuard<()>>,
    locks: RunLocks,
    run_id: String,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // The guard keeps its own handle on the mutex, release it first
        self.guard.take();
        self.locks
            .remove_if(self.run_id.as_str(), |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl Runner {
    pub fn new(graphs: GraphRegistry, checkpointer: Arc<dyn Checkpointer>, config: Arc<Config>) -> Self {
        Self {
            graphs,
            checkpointer,
            config,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn graphs(&self) -> &GraphRegistry {
        &self.graphs
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Start a new run of `graph` with `input` as the initial state
    pub async fn start(
        &self,
        graph: &str,
        input: Value,
        run_id: Option<String>,
    ) -> Result<RunResponse, GraphError> {
        self.start_with_events(graph, input, run_id, None).await
    }

    pub async fn start_with_events(
        &self,
        graph: &str,
        input: Value,
        run_id: Option<String>,
        events: Option<&mpsc::Sender<RunEvent>>,
    ) -> Result<RunResponse, GraphError> {
        let graph = self.graph(graph).await?;
        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let _guard = self.acquire(&run_id)?;

        if let Some(existing) = self.checkpointer.load(&run_id).await? {
            if existing.status.is_paused() {
                return Err(GraphError::RunExists(run_id));
            }
            if !existing.status.is_terminal() {
                return Err(GraphError::ConcurrentResume(run_id));
            }
            log::info!("Reusing run id {} of a finished run", run_id);
        }

        let state = graph.initial_state(input)?;
        let record = RunRecord::running(&run_id, graph.name(), state.to_json());
        self.checkpointer.save(&record).await?;

        let result = graph
            .start_run(&run_id, state, self.config.clone(), events)
            .await;
        self.finish(record, result).await
    }

    /// Continue a paused run with `answer`
    ///
    /// Resuming a completed run returns its stored final state without
    /// executing anything.
    pub async fn resume(&self, run_id: &str, answer: Value) -> Result<RunResponse, GraphError> {
        self.resume_with_events(run_id, answer, None).await
    }

    pub async fn resume_with_events(
        &self,
        run_id: &str,
        answer: Value,
        events: Option<&mpsc::Sender<RunEvent>>,
    ) -> Result<RunResponse, GraphError> {
        let _guard = self.acquire(run_id)?;

        let mut record = self
            .checkpointer
            .load(run_id)
            .await?
            .ok_or_else(|| GraphError::NoSuchRun(run_id.to_string()))?;

        let token = match &record.status {
            RunStatus::Completed => {
                log::debug!("Run {} already completed, returning stored state", run_id);
                return Ok(RunResponse::Completed {
                    run_id: record.run_id,
                    state: record.state,
                });
            }
            RunStatus::Failed { error, .. } => {
                return Err(GraphError::RunFailed {
                    run_id: run_id.to_string(),
                    error: error.clone(),
                })
            }
            // Left behind by a call that died without finishing
            RunStatus::Running => return Err(GraphError::ConcurrentResume(run_id.to_string())),
            RunStatus::Paused { .. } => record.checkpoint.take().ok_or_else(|| {
                GraphError::checkpoint(format!("paused run {} has no checkpoint", run_id))
            })?,
        };

        let graph = self.graph(&record.graph).await?;
        record.transition(RunStatus::Running);
        self.checkpointer.save(&record).await?;

        let result = graph
            .resume_run(token, answer, self.config.clone(), events)
            .await;
        self.finish(record, result).await
    }

    /// Stored record of a run
    pub async fn get(&self, run_id: &str) -> Result<RunRecord, GraphError> {
        self.checkpointer
            .load(run_id)
            .await?
            .ok_or_else(|| GraphError::NoSuchRun(run_id.to_string()))
    }

    /// Forget a run, whatever its status
    pub async fn discard(&self, run_id: &str) -> Result<(), GraphError> {
        let _guard = self.acquire(run_id)?;
        let existed = self.checkpointer.delete(run_id).await?;

        if existed {
            log::info!("Discarded run {}", run_id);
            Ok(())
        } else {
            Err(GraphError::NoSuchRun(run_id.to_string()))
        }
    }

    pub async fn list(&self) -> Result<Vec<RunRecord>, GraphError> {
        self.checkpointer.list().await
    }

    async fn graph(&self, name: &str) -> Result<Arc<StepGraph>, GraphError> {
        self.graphs
            .get(name)
            .await
            .ok_or_else(|| GraphError::UnknownGraph(name.to_string()))
    }

    /// Take the run's lock without waiting; a held lock means another call
    /// is working on the run
    fn acquire(&self, run_id: &str) -> Result<RunLock, GraphError> {
        let lock = self
            .locks
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let mut held = RunLock {
            guard: None,
            locks: self.locks.clone(),
            run_id: run_id.to_string(),
        };
        match lock.try_lock_owned() {
            Ok(guard) => {
                held.guard = Some(guard);
                Ok(held)
            }
            Err(_) => Err(GraphError::ConcurrentResume(run_id.to_string())),
        }
    }

    /// Record how a run ended up and translate it for the caller
    async fn finish(
        &self,
        mut record: RunRecord,
        result: Result<RunOutcome, GraphError>,
    ) -> Result<RunResponse, GraphError> {
        match result {
            Ok(RunOutcome::Completed { run_id, state, path }) => {
                record.state = state.into_json();
                record.path = path;
                record.checkpoint = None;
                record.transition(RunStatus::Completed);
                self.checkpointer.save(&record).await?;
                Ok(RunResponse::Completed {
                    run_id,
                    state: record.state,
                })
            }
            Ok(RunOutcome::Paused(token)) => {
                let response = RunResponse::Paused {
                    run_id: token.run_id.clone(),
                    step: token.step.clone(),
                    payload: token.payload.clone(),
                };
                record.state = token.state.clone();
                record.path = token.path.clone();
                record.transition(RunStatus::Paused {
                    step: token.step.clone(),
                    payload: token.payload.clone(),
                });
                record.checkpoint = Some(token);
                self.checkpointer.save(&record).await?;
                Ok(response)
            }
            Err(err) => {
                log::error!("Run {} failed: {}", record.run_id, err);
                if let GraphError::StepFailed { state, .. } = &err {
                    record.state = state.clone();
                }
                record.checkpoint = None;
                record.transition(RunStatus::Failed {
                    step: err.step().map(str::to_string),
                    error: err.to_string(),
                });
                if let Err(save_err) = self.checkpointer.save(&record).await {
                    log::error!("Failed to record failure of run {}: {}", record.run_id, save_err);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::step::{step_fn, StepOutcome};
    use crate::waypoint::checkpoint::MemoryCheckpointer;
    use crate::waypoint::workflow::graph::GraphBuilder;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// draft -> review (pauses for approval) -> publish | END
    fn review_graph(executions: Arc<AtomicUsize>) -> StepGraph {
        let mut builder = GraphBuilder::new("review");
        builder
            .register_step(
                "draft",
                step_fn(move |_, _| {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(StepOutcome::unchanged().set("draft", json!("hello")))
                }),
            )
            .unwrap()
            .register_step(
                "review",
                step_fn(|_, ctx| {
                    let answer = ctx.interrupt(json!({"question": "publish?"}))?;
                    let target = if answer == json!("yes") { "publish" } else { "__end__" };
                    Ok(StepOutcome::goto(target).set("answer", answer))
                }),
            )
            .unwrap()
            .register_step(
                "publish",
                step_fn(|_, _| Ok(StepOutcome::unchanged().set("published", json!(true)))),
            )
            .unwrap();
        builder.add_transition("draft", "review").unwrap();
        builder.add_transition("publish", "__end__").unwrap();
        builder.set_start("draft").unwrap();
        builder.compile().unwrap()
    }

    async fn runner_with(graph: StepGraph) -> Runner {
        let graphs = GraphRegistry::new();
        graphs.register(Arc::new(graph)).await;
        Runner::new(
            graphs,
            Arc::new(MemoryCheckpointer::new()),
            Arc::new(Config::default()),
        )
    }

    async fn runner() -> (Runner, Arc<AtomicUsize>) {
        let executions = Arc::new(AtomicUsize::new(0));
        (runner_with(review_graph(executions.clone())).await, executions)
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (runner, _) = runner().await;

        let paused = runner.start("review", json!({}), None).await.unwrap();
        let RunResponse::Paused { run_id, step, payload } = paused else {
            panic!("expected pause");
        };
        assert_eq!(step, "review");
        assert_eq!(payload, json!({"question": "publish?"}));

        let record = runner.get(&run_id).await.unwrap();
        assert!(record.status.is_paused());
        assert!(record.checkpoint.is_some());

        let done = runner.resume(&run_id, json!("yes")).await.unwrap();
        match done {
            RunResponse::Completed { state, .. } => {
                assert_eq!(state["published"], json!(true));
                assert_eq!(state["draft"], json!("hello"));
            }
            other => panic!("expected completion, got {:?}", other),
        }

        let record = runner.get(&run_id).await.unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.checkpoint.is_none());
        assert_eq!(record.path, vec!["draft", "review", "publish"]);
    }

    #[tokio::test]
    async fn test_resume_completed_run_is_idempotent() {
        let (runner, executions) = runner().await;

        let paused = runner
            .start("review", json!({}), Some("run-1".to_string()))
            .await
            .unwrap();
        assert!(matches!(paused, RunResponse::Paused { .. }));

        let first = runner.resume("run-1", json!("no")).await.unwrap();
        let second = runner.resume("run-1", json!("yes")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resume_unknown_run() {
        let (runner, _) = runner().await;
        let err = runner.resume("missing", json!("yes")).await.err().unwrap();
        assert!(matches!(err, GraphError::NoSuchRun(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_concurrent_resume_is_rejected() {
        let (runner, _) = runner().await;
        runner
            .start("review", json!({}), Some("run-1".to_string()))
            .await
            .unwrap();

        let _held = runner.acquire("run-1").unwrap();
        let err = runner.resume("run-1", json!("yes")).await.err().unwrap();
        assert!(matches!(err, GraphError::ConcurrentResume(_)));
        drop(_held);

        assert!(runner.resume("run-1", json!("yes")).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_runs() {
        let (runner, _) = runner().await;
        for i in 0..50 {
            let run_id = format!("run-{}", i);
            runner
                .start("review", json!({}), Some(run_id.clone()))
                .await
                .unwrap();
            runner.resume(&run_id, json!("yes")).await.unwrap();
        }
        assert_eq!(runner.list().await.unwrap().len(), 50);
        assert!(runner.locks.is_empty());

        let _held = runner.acquire("run-0").unwrap();
        assert!(runner.acquire("run-0").is_err());
        assert_eq!(runner.locks.len(), 1);
        drop(_held);
        assert!(runner.locks.is_empty());
    }

    #[tokio::test]
    async fn test_start_over_paused_run_is_rejected() {
        let (runner, _) = runner().await;
        runner
            .start("review", json!({}), Some("run-1".to_string()))
            .await
            .unwrap();

        let err = runner
            .start("review", json!({}), Some("run-1".to_string()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GraphError::RunExists(_)));
    }

    #[tokio::test]
    async fn test_unknown_graph() {
        let (runner, _) = runner().await;
        let err = runner.start("nope", json!({}), None).await.err().unwrap();
        assert!(matches!(err, GraphError::UnknownGraph(_)));
    }

    #[tokio::test]
    async fn test_discard() {
        let (runner, _) = runner().await;
        let paused = runner.start("review", json!({}), None).await.unwrap();
        let run_id = paused.run_id().to_string();

        assert_eq!(runner.list().await.unwrap().len(), 1);
        runner.discard(&run_id).await.unwrap();
        assert!(runner.list().await.unwrap().is_empty());

        let err = runner.resume(&run_id, json!("yes")).await.err().unwrap();
        assert!(matches!(err, GraphError::NoSuchRun(_)));
        assert!(matches!(
            runner.discard(&run_id).await,
            Err(GraphError::NoSuchRun(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_run_is_recorded() {
        let mut builder = GraphBuilder::new("fragile");
        builder
            .register_step("boom", step_fn(|_, _| Err("disk full".into())))
            .unwrap();
        builder.set_start("boom").unwrap();
        let runner = runner_with(builder.compile().unwrap()).await;

        let err = runner
            .start("fragile", json!({"n": 1}), Some("run-1".to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.step(), Some("boom"));

        let record = runner.get("run-1").await.unwrap();
        match &record.status {
            RunStatus::Failed { step, error } => {
                assert_eq!(step.as_deref(), Some("boom"));
                assert!(error.contains("disk full"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(record.state, json!({"n": 1}));

        let err = runner.resume("run-1", json!("retry")).await.err().unwrap();
        assert!(matches!(err, GraphError::RunFailed { .. }));
    }

    #[tokio::test]
    async fn test_events_are_streamed() {
        let (runner, _) = runner().await;
        let (tx, mut rx) = mpsc::channel(32);

        runner
            .start_with_events("review", json!({}), None, Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events.last(), Some(RunEvent::Paused { step, .. }) if step == "review"));
    }
}
