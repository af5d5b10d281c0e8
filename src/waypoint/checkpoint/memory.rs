// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Checkpointer, RunRecord};
use crate::sdk::error::GraphError;

/// In-process checkpointer; records are lost when the process exits
#[derive(Clone, Default)]
pub struct MemoryCheckpointer {
    runs: Arc<RwLock<HashMap<String, RunRecord>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, GraphError> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).cloned())
    }

    async fn save(&self, record: &RunRecord) -> Result<(), GraphError> {
        let mut runs = self.runs.write().await;
        runs.insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, run_id: &str) -> Result<bool, GraphError> {
        let mut runs = self.runs.write().await;
        Ok(runs.remove(run_id).is_some())
    }

    async fn list(&self) -> Result<Vec<RunRecord>, GraphError> {
        let runs = self.runs.read().await;
        let mut records: Vec<RunRecord> = runs.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoint::checkpoint::RunStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = MemoryCheckpointer::new();
        assert!(store.load("r1").await.unwrap().is_none());

        let mut record = RunRecord::running("r1", "g", json!({"n": 1}));
        store.save(&record).await.unwrap();

        record.transition(RunStatus::Completed);
        store.save(&record).await.unwrap();

        let loaded = store.load("r1").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Completed);
        assert_eq!(store.list().await.unwrap().len(), 1);

        assert!(store.delete("r1").await.unwrap());
        assert!(!store.delete("r1").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = MemoryCheckpointer::new();
        let cloned = store.clone();
        cloned
            .save(&RunRecord::running("r1", "g", json!({})))
            .await
            .unwrap();
        assert!(store.load("r1").await.unwrap().is_some());
    }
}
