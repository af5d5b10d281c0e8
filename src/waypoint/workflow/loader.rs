//! Workflow loader - YAML file loading and parsing
//!
//! This module handles loading workflow definitions from YAML files.

use super::types::WorkflowDefinition;
use crate::sdk::error::GraphError;
use std::fs;
use std::path::Path;

/// Loads workflow definitions from YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition, GraphError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            GraphError::definition(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse_yaml(&content)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, GraphError> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoint::workflow::state::{FieldType, ReducerType};
    use crate::waypoint::workflow::types::EdgeDefinition;
    use serde_json::json;

    #[test]
    fn test_parse_linear_workflow() {
        let yaml = r#"
name: greeter
description: "Says hello"
start: hello
steps:
  - name: hello
    uses: message
    with:
      role: assistant
      text: "Hello {name}"
transitions:
  - from: hello
    to: END
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.name, "greeter");
        assert_eq!(def.start, "hello");
        assert_eq!(def.steps.len(), 1);
        assert_eq!(def.steps[0].uses, "message");
        assert_eq!(def.steps[0].with["text"], json!("Hello {name}"));
        assert!(matches!(def.transitions[0].edge().unwrap(), EdgeDefinition::To("END")));
    }

    #[test]
    fn test_parse_state_schema() {
        let yaml = r#"
name: quiz
start: ask
state:
  score:
    type: integer
    default: 0
  messages:
    type: array
    reducer: append
steps:
  - name: ask
    uses: quiz
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert!(def.description.is_empty());
        assert!(def.transitions.is_empty());

        let score = def.state.get("score").unwrap();
        assert_eq!(score.field_type, FieldType::Integer);
        assert_eq!(score.default, Some(json!(0)));

        let messages = def.state.get("messages").unwrap();
        assert_eq!(messages.reducer, ReducerType::Append);
        assert_eq!(def.steps[0].with, serde_json::Value::Null);
    }

    #[test]
    fn test_parse_routes_and_repeat() {
        let yaml = r#"
name: router
start: check
steps:
  - name: check
    uses: set
  - name: poll
    uses: increment
transitions:
  - from: check
    routes:
      - when: "count % 2 == 0"
        to: even
      - to: odd
  - from: poll
    repeat:
      times: 3
      then: END
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        match def.transitions[0].edge().unwrap() {
            EdgeDefinition::Routes(routes) => {
                assert_eq!(routes.len(), 2);
                assert_eq!(routes[0].when.as_deref(), Some("count % 2 == 0"));
                assert!(routes[1].when.is_none());
            }
            other => panic!("Expected routes, got {:?}", other),
        }
        match def.transitions[1].edge().unwrap() {
            EdgeDefinition::Repeat(repeat) => {
                assert_eq!(repeat.times, 3);
                assert_eq!(repeat.then, "END");
            }
            other => panic!("Expected repeat, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_yaml_returns_error() {
        let yaml = r#"
name:
  - invalid structure
"#;
        let result = WorkflowLoader::parse_yaml(yaml);
        assert!(matches!(result, Err(GraphError::Yaml(_))));
    }

    #[test]
    fn test_missing_file_returns_definition_error() {
        let result = WorkflowLoader::new().load_workflow("does/not/exist.yaml");
        assert!(matches!(result, Err(GraphError::Definition(_))));
    }
}
