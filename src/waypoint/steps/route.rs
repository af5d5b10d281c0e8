// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{answer_text, parse_params};
use crate::sdk::context::StepContext;
use crate::sdk::error::{GraphError, StepError};
use crate::sdk::kind::StepKind;
use crate::sdk::step::{Step, StepOutcome};
use crate::waypoint::workflow::builder::resolve_target;
use crate::waypoint::workflow::state::WorkflowState;

/// `keyword_route`: jump to the first route whose keyword occurs in a text field
pub struct KeywordRouteKind;

#[derive(Deserialize)]
struct KeywordRouteParams {
    field: String,
    routes: Vec<KeywordRoute>,
    #[serde(default = "default_target")]
    default: String,
}

#[derive(Deserialize)]
struct KeywordRoute {
    keyword: String,
    to: String,
}

fn default_target() -> String {
    "END".to_string()
}

struct KeywordRouteStep {
    field: String,
    /// (lowercased keyword, target), in declaration order
    routes: Vec<(String, String)>,
    default: String,
}

impl StepKind for KeywordRouteKind {
    fn name(&self) -> &str {
        "keyword_route"
    }

    fn description(&self) -> &str {
        "Go to the first route whose keyword appears in `field`, else `default`"
    }

    fn build(&self, params: &Value) -> Result<Arc<dyn Step>, GraphError> {
        let params: KeywordRouteParams = parse_params(self.name(), params)?;
        Ok(Arc::new(KeywordRouteStep {
            field: params.field,
            routes: params
                .routes
                .into_iter()
                .map(|r| (r.keyword.to_lowercase(), resolve_target(&r.to)))
                .collect(),
            default: resolve_target(&params.default),
        }))
    }
}

#[async_trait]
impl Step for KeywordRouteStep {
    async fn run(
        &self,
        state: &WorkflowState,
        _ctx: &mut StepContext,
    ) -> Result<StepOutcome, StepError> {
        let text = state
            .get_path(&self.field)
            .map(answer_text)
            .unwrap_or_default()
            .to_lowercase();

        let target = self
            .routes
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .map(|(_, target)| target)
            .unwrap_or(&self.default);
        Ok(StepOutcome::goto(target.clone()))
    }

    fn targets(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|(_, target)| target.clone())
            .chain(std::iter::once(self.default.clone()))
            .collect()
    }
}
