// SPDX-License-Identifier: MIT

//! JSON file checkpointer
//!
//! All records live in one JSON document. Every operation re-reads the file
//! under an advisory lock, so several processes (or checkpointer instances)
//! can share a store.

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Checkpointer, RunRecord};
use crate::sdk::error::GraphError;

/// Root JSON document
#[derive(Debug, Default, Serialize, Deserialize)]
struct RunStore {
    runs: BTreeMap<String, RunRecord>,
}

pub struct FileCheckpointer {
    path: PathBuf,
    /// Serializes access from this process; the file lock covers other processes
    guard: Mutex<()>,
}

impl FileCheckpointer {
    /// Open (or create) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GraphError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GraphError::checkpoint(format!(
                        "failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let store = Self {
            path,
            guard: Mutex::new(()),
        };
        // Surface unreadable or corrupt stores at startup
        store.read_store()?;
        log::debug!("Opened run store at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_store(&self) -> Result<RunStore, GraphError> {
        let _guard = self.lock()?;
        if !self.path.exists() {
            return Ok(RunStore::default());
        }

        let mut file = File::open(&self.path).map_err(|e| self.io_error("open", e))?;
        file.lock_shared().map_err(|e| self.io_error("lock", e))?;

        let mut contents = String::new();
        let read = file.read_to_string(&mut contents);
        // Unlock errors are harmless; the lock is released on close anyway
        let _ = file.unlock();
        read.map_err(|e| self.io_error("read", e))?;

        parse_store(&contents)
    }

    /// Read, change and write back the store under an exclusive lock
    fn modify<T>(&self, change: impl FnOnce(&mut RunStore) -> T) -> Result<T, GraphError> {
        let _guard = self.lock()?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_error("open", e))?;
        file.lock_exclusive().map_err(|e| self.io_error("lock", e))?;

        let result = self.rewrite(&mut file, change);
        let _ = file.unlock();
        result
    }

    fn rewrite<T>(
        &self,
        file: &mut File,
        change: impl FnOnce(&mut RunStore) -> T,
    ) -> Result<T, GraphError> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| self.io_error("read", e))?;

        let mut store = parse_store(&contents)?;
        let result = change(&mut store);

        let json = serde_json::to_string_pretty(&store)?;
        file.set_len(0).map_err(|e| self.io_error("truncate", e))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| self.io_error("seek", e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| self.io_error("write", e))?;
        file.flush().map_err(|e| self.io_error("flush", e))?;

        Ok(result)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, GraphError> {
        self.guard
            .lock()
            .map_err(|_| GraphError::checkpoint("run store lock poisoned"))
    }

    fn io_error(&self, action: &str, err: std::io::Error) -> GraphError {
        GraphError::checkpoint(format!(
            "failed to {} {}: {}",
            action,
            self.path.display(),
            err
        ))
    }
}

fn parse_store(contents: &str) -> Result<RunStore, GraphError> {
    if contents.trim().is_empty() {
        return Ok(RunStore::default());
    }
    serde_json::from_str(contents)
        .map_err(|e| GraphError::checkpoint(format!("corrupt run store: {}", e)))
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, GraphError> {
        let mut store = self.read_store()?;
        Ok(store.runs.remove(run_id))
    }

    async fn save(&self, record: &RunRecord) -> Result<(), GraphError> {
        self.modify(|store| {
            store.runs.insert(record.run_id.clone(), record.clone());
        })
    }

    async fn delete(&self, run_id: &str) -> Result<bool, GraphError> {
        self.modify(|store| store.runs.remove(run_id).is_some())
    }

    async fn list(&self) -> Result<Vec<RunRecord>, GraphError> {
        let store = self.read_store()?;
        let mut records: Vec<RunRecord> = store.runs.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoint::checkpoint::RunStatus;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_path(dir: &TempDir) -> PathBuf {
        dir.path().join("nested").join("runs.json")
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointer::open(store_path(&dir)).unwrap();

        assert!(dir.path().join("nested").is_dir());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let store = FileCheckpointer::open(&path).unwrap();
            let mut record = RunRecord::running("r1", "quiz", json!({"score": 0}));
            record.transition(RunStatus::Paused {
                step: "ask".to_string(),
                payload: json!("What is 2 + 2?"),
            });
            store.save(&record).await.unwrap();
        }

        let reopened = FileCheckpointer::open(&path).unwrap();
        let record = reopened.load("r1").await.unwrap().unwrap();
        assert_eq!(record.graph, "quiz");
        assert!(record.status.is_paused());
    }

    #[tokio::test]
    async fn test_two_instances_see_each_other() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);
        let a = FileCheckpointer::open(&path).unwrap();
        let b = FileCheckpointer::open(&path).unwrap();

        a.save(&RunRecord::running("r1", "g", json!({}))).await.unwrap();
        b.save(&RunRecord::running("r2", "g", json!({}))).await.unwrap();

        assert_eq!(a.list().await.unwrap().len(), 2);
        assert!(b.delete("r1").await.unwrap());
        assert!(a.load("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_store_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileCheckpointer::open(&path).err().unwrap();
        assert!(matches!(err, GraphError::Checkpoint(_)));
    }
}
