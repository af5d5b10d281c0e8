// SPDX-License-Identifier: MIT

//! Run record storage
//!
//! A `Checkpointer` keeps one `RunRecord` per run id: the run's status, its
//! latest state and, while paused, the token needed to resume it.

mod file;
mod memory;

pub use file::FileCheckpointer;
pub use memory::MemoryCheckpointer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sdk::error::GraphError;
use crate::waypoint::workflow::graph::PauseToken;

/// Lifecycle of a run; `resume` is the only way out of `Paused`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Paused { step: String, payload: Value },
    Completed,
    Failed { step: Option<String>, error: String },
}

impl RunStatus {
    pub fn is_paused(&self) -> bool {
        matches!(self, RunStatus::Paused { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed { .. })
    }
}

/// Persisted record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub graph: String,
    #[serde(flatten)]
    pub status: RunStatus,
    /// Latest known state; the final state once completed
    pub state: Value,
    /// Present while the run is paused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<PauseToken>,
    /// Steps entered so far, in order
    #[serde(default)]
    pub path: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// A fresh record for a run that is about to execute
    pub fn running(run_id: impl Into<String>, graph: impl Into<String>, state: Value) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            graph: graph.into(),
            status: RunStatus::Running,
            state,
            checkpoint: None,
            path: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new status, stamping `updated_at`
    pub fn transition(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Store of run records keyed by run id
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, GraphError>;

    /// Insert or replace the record stored under `record.run_id`
    async fn save(&self, record: &RunRecord) -> Result<(), GraphError>;

    /// Remove a record; returns whether one existed
    async fn delete(&self, run_id: &str) -> Result<bool, GraphError>;

    /// All records, oldest first
    async fn list(&self) -> Result<Vec<RunRecord>, GraphError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serializes_flat() {
        let mut record = RunRecord::running("run-1", "approval", json!({"task": "post"}));
        record.transition(RunStatus::Paused {
            step: "review".to_string(),
            payload: json!({"task": "post"}),
        });

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], json!("paused"));
        assert_eq!(value["step"], json!("review"));
        assert!(value.get("checkpoint").is_none());

        let back: RunRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_status_predicates() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Failed {
            step: None,
            error: "boom".to_string()
        }
        .is_terminal());
        assert!(RunStatus::Paused {
            step: "a".to_string(),
            payload: Value::Null
        }
        .is_paused());
    }
}
