// SPDX-License-Identifier: MIT

//! Runtime configuration
//!
//! Loaded once at startup from an optional YAML file, then overridden by
//! `WAYPOINT_*` environment variables. The resulting `Config` is passed into
//! the runner and exposed to steps through `StepContext::config`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::sdk::error::GraphError;
use crate::waypoint::checkpoint::{Checkpointer, FileCheckpointer, MemoryCheckpointer};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "waypoint.yaml";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Upper bound on steps executed by one run, pauses excluded
    pub max_steps: usize,
    pub checkpoint: CheckpointConfig,
    pub server: ServerConfig,
    /// Directory scanned for workflow files by `serve`
    pub workflows_dir: PathBuf,
    /// Free-form values available to steps
    pub params: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_steps: 100,
            checkpoint: CheckpointConfig::default(),
            server: ServerConfig::default(),
            workflows_dir: PathBuf::from("workflows"),
            params: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    /// Store file for the `file` backend
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Memory,
            path: PathBuf::from(".waypoint/runs.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `waypoint.yaml` when present,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, GraphError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    pub fn parse_yaml(content: &str) -> Result<Self, GraphError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `WAYPOINT_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("WAYPOINT_MAX_STEPS") {
            match v.parse() {
                Ok(n) => self.max_steps = n,
                Err(_) => log::warn!("Ignoring invalid WAYPOINT_MAX_STEPS: {}", v),
            }
        }
        if let Some(v) = lookup("WAYPOINT_CHECKPOINT") {
            match v.to_lowercase().as_str() {
                "memory" => self.checkpoint.backend = CheckpointBackend::Memory,
                "file" => self.checkpoint.backend = CheckpointBackend::File,
                _ => log::warn!("Ignoring invalid WAYPOINT_CHECKPOINT: {}", v),
            }
        }
        if let Some(v) = lookup("WAYPOINT_CHECKPOINT_PATH") {
            self.checkpoint.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("WAYPOINT_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("WAYPOINT_PORT") {
            match v.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => log::warn!("Ignoring invalid WAYPOINT_PORT: {}", v),
            }
        }
        if let Some(v) = lookup("WAYPOINT_WORKFLOWS_DIR") {
            self.workflows_dir = PathBuf::from(v);
        }
    }

    /// Open the configured checkpoint store
    pub fn checkpointer(&self) -> Result<Arc<dyn Checkpointer>, GraphError> {
        match self.checkpoint.backend {
            CheckpointBackend::Memory => Ok(Arc::new(MemoryCheckpointer::new())),
            CheckpointBackend::File => Ok(Arc::new(FileCheckpointer::open(&self.checkpoint.path)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_steps, 100);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::Memory);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
max_steps: 25
checkpoint:
  backend: file
  path: /tmp/runs.json
params:
  approver: alice
"#;
        let config = Config::parse_yaml(yaml).unwrap();
        assert_eq!(config.max_steps, 25);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::File);
        assert_eq!(config.checkpoint.path, PathBuf::from("/tmp/runs.json"));
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.params.get("approver"), Some(&json!("alice")));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WAYPOINT_MAX_STEPS", "7"),
            ("WAYPOINT_CHECKPOINT", "FILE"),
            ("WAYPOINT_PORT", "not-a-port"),
            ("WAYPOINT_HOST", "0.0.0.0"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.max_steps, 7);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::File);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
    }
}
