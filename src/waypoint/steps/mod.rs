// SPDX-License-Identifier: MIT

//! Built-in step kinds for workflow files
//!
//! - `set`, `increment`, `message` - write to the state
//! - `ask`, `approval`, `quiz` - pause for human input
//! - `keyword_route` - pick the next step from text in the state

mod data;
mod human;
mod route;

pub use data::{IncrementKind, MessageKind, SetKind};
pub use human::{ApprovalKind, AskKind, QuizKind};
pub use route::KeywordRouteKind;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::sdk::error::GraphError;
use crate::waypoint::workflow::registry::StepRegistry;
use crate::waypoint::workflow::state::WorkflowState;

/// Register every built-in kind
pub async fn register_builtin(registry: &StepRegistry) {
    registry.register(Arc::new(SetKind)).await;
    registry.register(Arc::new(IncrementKind)).await;
    registry.register(Arc::new(MessageKind)).await;
    registry.register(Arc::new(AskKind)).await;
    registry.register(Arc::new(ApprovalKind)).await;
    registry.register(Arc::new(QuizKind)).await;
    registry.register(Arc::new(KeywordRouteKind)).await;
}

/// Deserialize `with:` parameters; a missing block counts as `{}`
pub(crate) fn parse_params<T: DeserializeOwned>(kind: &str, params: &Value) -> Result<T, GraphError> {
    let params = match params {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(params)
        .map_err(|e| GraphError::definition(format!("invalid '{}' parameters: {}", kind, e)))
}

/// Replace `{path}` placeholders with state values; unknown paths are kept
pub fn render_template(template: &str, state: &WorkflowState) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match state.get_path(key.trim()) {
                    Some(value) if !key.trim().is_empty() => out.push_str(&answer_text(value)),
                    _ => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Plain text of an answer: strings as-is, anything else as JSON
pub fn answer_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> WorkflowState {
        let mut state = WorkflowState::empty();
        state.update("topic", json!("Rust")).unwrap();
        state.update("count", json!(3)).unwrap();
        state.update("post", json!({"title": "Ownership"})).unwrap();
        state
    }

    #[test]
    fn test_render_template() {
        let state = state();
        assert_eq!(
            render_template("Write about {topic} ({count} drafts)", &state),
            "Write about Rust (3 drafts)"
        );
        assert_eq!(render_template("Title: {post.title}", &state), "Title: Ownership");
    }

    #[test]
    fn test_render_template_keeps_unknown_placeholders() {
        let state = state();
        assert_eq!(render_template("{missing} and {}", &state), "{missing} and {}");
        assert_eq!(render_template("open { brace", &state), "open { brace");
    }

    #[test]
    fn test_answer_text() {
        assert_eq!(answer_text(&json!("yes")), "yes");
        assert_eq!(answer_text(&json!(8)), "8");
        assert_eq!(answer_text(&json!(true)), "true");
    }

    #[test]
    fn test_parse_params_null_is_empty() {
        #[derive(serde::Deserialize)]
        struct Params {
            #[serde(default)]
            by: Option<i64>,
        }
        let params: Params = parse_params("increment", &Value::Null).unwrap();
        assert!(params.by.is_none());

        let err = parse_params::<Params>("increment", &json!({"by": "two"})).err().unwrap();
        assert!(matches!(err, GraphError::Definition(msg) if msg.contains("increment")));
    }

    #[tokio::test]
    async fn test_register_builtin() {
        let registry = StepRegistry::new();
        register_builtin(&registry).await;
        assert_eq!(
            registry.names().await,
            vec![
                "approval",
                "ask",
                "increment",
                "keyword_route",
                "message",
                "quiz",
                "set"
            ]
        );
    }
}
