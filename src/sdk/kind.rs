// SPDX-License-Identifier: MIT

use serde_json::Value;
use std::sync::Arc;

use super::error::GraphError;
use super::step::Step;

/// Factory for steps declared in workflow files
///
/// A workflow step names its kind with `uses:` and passes parameters with
/// `with:`; the kind validates the parameters and builds the step.
pub trait StepKind: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn build(&self, params: &Value) -> Result<Arc<dyn Step>, GraphError>;
}
