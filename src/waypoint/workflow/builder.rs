// SPDX-License-Identifier: MIT

//! Workflow builder - orchestrates workflow construction
//!
//! This module provides the high-level Builder that loads workflow definitions,
//! resolves step kinds and compiles executable step graphs.

use crate::sdk::error::GraphError;
use crate::sdk::step::END;
use crate::waypoint::workflow::condition::ConditionRouter;
use crate::waypoint::workflow::graph::{GraphBuilder, StepGraph};
use crate::waypoint::workflow::loader::WorkflowLoader;
use crate::waypoint::workflow::registry::{GraphRegistry, StepRegistry};
use crate::waypoint::workflow::types::{EdgeDefinition, WorkflowDefinition};

use std::path::Path;
use std::sync::Arc;

/// Map the `END` spelling used in workflow files onto the end marker
pub fn resolve_target(name: &str) -> String {
    if name == "END" {
        END.to_string()
    } else {
        name.to_string()
    }
}

/// High-level builder for constructing step graphs from YAML definitions
pub struct Builder {
    loader: WorkflowLoader,
    kinds: StepRegistry,
}

impl Builder {
    pub fn new(kinds: StepRegistry) -> Self {
        Self {
            loader: WorkflowLoader::new(),
            kinds,
        }
    }

    /// Build a step graph from a YAML file path
    pub async fn build_graph<P: AsRef<Path>>(&self, path: P) -> Result<StepGraph, GraphError> {
        let def = self.loader.load_workflow(path)?;
        self.build_from_def(&def).await
    }

    /// Build a step graph from a parsed definition
    pub async fn build_from_def(&self, def: &WorkflowDefinition) -> Result<StepGraph, GraphError> {
        let mut builder = GraphBuilder::new(def.name.clone())
            .description(def.description.clone())
            .schema(def.state.clone());

        for step_def in &def.steps {
            let kind = self.kinds.get(&step_def.uses).await.ok_or_else(|| {
                GraphError::definition(format!(
                    "step '{}' uses unknown kind '{}'",
                    step_def.name, step_def.uses
                ))
            })?;
            let step = kind.build(&step_def.with).map_err(|e| {
                GraphError::definition(format!("step '{}': {}", step_def.name, e))
            })?;
            builder.register_step(step_def.name.clone(), step)?;
        }

        builder.set_start(def.start.clone())?;

        for transition in &def.transitions {
            match transition.edge()? {
                EdgeDefinition::To(to) => {
                    builder.add_transition(transition.from.clone(), resolve_target(to))?;
                }
                EdgeDefinition::Routes(routes) => {
                    let mut router = ConditionRouter::new();
                    for route in routes {
                        router = router.route(route.when.as_deref(), resolve_target(&route.to))?;
                    }
                    let candidates = router.targets();
                    builder.add_conditional_transition(
                        transition.from.clone(),
                        candidates,
                        router,
                    )?;
                }
                EdgeDefinition::Repeat(repeat) => {
                    builder.add_repeat(
                        transition.from.clone(),
                        repeat.times,
                        resolve_target(&repeat.then),
                    )?;
                }
            }
        }

        let graph = builder.compile()?;
        log::info!(
            "Built graph '{}' with {} steps",
            graph.name(),
            graph.steps().len()
        );
        Ok(graph)
    }

    /// Build every `*.yaml` / `*.yml` file in `dir` into `graphs`
    ///
    /// Files that fail to build are logged and skipped. Returns the number of
    /// graphs registered.
    pub async fn load_dir<P: AsRef<Path>>(
        &self,
        dir: P,
        graphs: &GraphRegistry,
    ) -> Result<usize, GraphError> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match self.build_graph(&path).await {
                Ok(graph) => {
                    graphs.register(Arc::new(graph)).await;
                    loaded += 1;
                }
                Err(e) => log::error!("Failed to build workflow {}: {}", path.display(), e),
            }
        }

        log::info!("Loaded {} workflows from {}", loaded, dir.display());
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoint::config::Config;
    use crate::waypoint::steps::register_builtin;
    use serde_json::json;

    async fn builder() -> Builder {
        let kinds = StepRegistry::new();
        register_builtin(&kinds).await;
        Builder::new(kinds)
    }

    fn parse(yaml: &str) -> WorkflowDefinition {
        WorkflowLoader::parse_yaml(yaml).unwrap()
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("END"), END);
        assert_eq!(resolve_target("review"), "review");
    }

    #[tokio::test]
    async fn test_unknown_kind_returns_error() {
        let def = parse(
            r#"
name: broken
start: a
steps:
  - name: a
    uses: teleport
"#,
        );
        let err = builder().await.build_from_def(&def).await.err().unwrap();
        assert!(err.to_string().contains("unknown kind 'teleport'"));
    }

    #[tokio::test]
    async fn test_unknown_transition_target_returns_error() {
        let def = parse(
            r#"
name: broken
start: a
steps:
  - name: a
    uses: set
transitions:
  - from: a
    to: nowhere
"#,
        );
        let err = builder().await.build_from_def(&def).await.err().unwrap();
        assert!(matches!(err, GraphError::UnknownStep(name) if name == "nowhere"));
    }

    #[tokio::test]
    async fn test_misspelled_jump_target_fails_build() {
        let def = parse(
            r#"
name: review
start: review
steps:
  - name: review
    uses: approval
    with:
      on_approve: publsh
  - name: publish
    uses: set
"#,
        );
        let err = builder().await.build_from_def(&def).await.err().unwrap();
        assert!(matches!(err, GraphError::UnknownStep(name) if name == "publsh"));

        let def = parse(
            r#"
name: triage
start: route
steps:
  - name: route
    uses: keyword_route
    with:
      field: query
      routes:
        - keyword: bill
          to: billing
      default: suport
  - name: billing
    uses: set
"#,
        );
        let err = builder().await.build_from_def(&def).await.err().unwrap();
        assert!(matches!(err, GraphError::UnknownStep(name) if name == "suport"));
    }

    #[tokio::test]
    async fn test_bad_condition_returns_error() {
        let def = parse(
            r#"
name: broken
start: a
steps:
  - name: a
    uses: set
transitions:
  - from: a
    routes:
      - when: "count >"
        to: END
"#,
        );
        let err = builder().await.build_from_def(&def).await.err().unwrap();
        assert!(matches!(err, GraphError::Condition(_)));
    }

    #[tokio::test]
    async fn test_ambiguous_transition_returns_error() {
        let def = parse(
            r#"
name: broken
start: a
steps:
  - name: a
    uses: set
transitions:
  - from: a
    to: END
    repeat:
      times: 2
      then: END
"#,
        );
        let err = builder().await.build_from_def(&def).await.err().unwrap();
        assert!(matches!(err, GraphError::Definition(_)));
    }

    #[tokio::test]
    async fn test_build_and_run_routed_workflow() {
        let def = parse(
            r#"
name: parity
start: bump
state:
  count:
    type: integer
    default: 0
  label:
    type: string
steps:
  - name: bump
    uses: increment
    with:
      field: count
  - name: even
    uses: set
    with:
      values:
        label: even
  - name: odd
    uses: set
    with:
      values:
        label: odd
transitions:
  - from: bump
    routes:
      - when: "count % 2 == 0"
        to: even
      - to: odd
  - from: even
    to: END
  - from: odd
    to: END
"#,
        );
        let graph = builder().await.build_from_def(&def).await.unwrap();

        let state = graph.initial_state(json!({"count": 1})).unwrap();
        let outcome = graph.run(state, Arc::new(Config::default())).await.unwrap();
        assert_eq!(outcome.state().unwrap().get("label"), Some(&json!("even")));
        assert_eq!(outcome.path(), ["bump", "even"]);

        let state = graph.initial_state(json!({"count": 2})).unwrap();
        let outcome = graph.run(state, Arc::new(Config::default())).await.unwrap();
        assert_eq!(outcome.state().unwrap().get("label"), Some(&json!("odd")));
    }

    #[tokio::test]
    async fn test_build_repeat_workflow() {
        let def = parse(
            r#"
name: poller
start: poll
state:
  polls:
    type: integer
    default: 0
steps:
  - name: poll
    uses: increment
    with:
      field: polls
transitions:
  - from: poll
    repeat:
      times: 3
      then: END
"#,
        );
        let graph = builder().await.build_from_def(&def).await.unwrap();
        let state = graph.initial_state(json!({})).unwrap();
        let outcome = graph.run(state, Arc::new(Config::default())).await.unwrap();
        assert_eq!(outcome.state().unwrap().get("polls"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_load_dir_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("good.yaml"),
            "name: good\nstart: a\nsteps:\n  - name: a\n    uses: set\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.yml"), "name: [oops").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let graphs = GraphRegistry::new();
        let loaded = builder().await.load_dir(dir.path(), &graphs).await.unwrap();

        assert_eq!(loaded, 1);
        assert!(graphs.get("good").await.is_some());
    }
}
