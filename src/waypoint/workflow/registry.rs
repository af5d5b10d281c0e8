// SPDX-License-Identifier: MIT

use crate::sdk::kind::StepKind;
use crate::waypoint::workflow::graph::StepGraph;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Step kinds available to workflow files, keyed by `uses:` name
#[derive(Clone)]
pub struct StepRegistry {
    kinds: Arc<RwLock<HashMap<String, Arc<dyn StepKind>>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            kinds: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, kind: Arc<dyn StepKind>) {
        let mut kinds = self.kinds.write().await;
        kinds.insert(kind.name().to_string(), kind);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn StepKind>> {
        let kinds = self.kinds.read().await;
        kinds.get(name).cloned()
    }

    /// Registered kind names, sorted
    pub async fn names(&self) -> Vec<String> {
        let kinds = self.kinds.read().await;
        let mut names: Vec<String> = kinds.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiled graphs, keyed by workflow name
#[derive(Clone)]
pub struct GraphRegistry {
    graphs: Arc<RwLock<HashMap<String, Arc<StepGraph>>>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self {
            graphs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a graph, replacing any graph with the same name
    pub async fn register(&self, graph: Arc<StepGraph>) {
        let name = graph.name().to_string();
        let mut graphs = self.graphs.write().await;
        if graphs.insert(name.clone(), graph).is_some() {
            log::warn!("Replaced previously registered graph '{}'", name);
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<StepGraph>> {
        let graphs = self.graphs.read().await;
        graphs.get(name).cloned()
    }

    /// All graphs, sorted by name
    pub async fn list(&self) -> Vec<Arc<StepGraph>> {
        let graphs = self.graphs.read().await;
        let mut all: Vec<Arc<StepGraph>> = graphs.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub async fn len(&self) -> usize {
        self.graphs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.graphs.read().await.is_empty()
    }
}

impl Default for GraphRegistry {
    fn default() -> Self {
        Self::new()
    }
}
