// SPDX-License-Identifier: MIT

//! Routing functions for conditional transitions

use std::error::Error;

use crate::waypoint::workflow::state::WorkflowState;

/// Picks the next step of a routed transition from the current state
///
/// The returned name must be one of the candidates declared with the
/// transition, otherwise the run aborts with a routing error.
pub trait Router: Send + Sync {
    fn route(&self, state: &WorkflowState) -> Result<String, Box<dyn Error + Send + Sync>>;
}

impl<F> Router for F
where
    F: Fn(&WorkflowState) -> String + Send + Sync,
{
    fn route(&self, state: &WorkflowState) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(self(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_closure_router() {
        let router = |state: &WorkflowState| {
            if state.get("count").and_then(|v| v.as_i64()).unwrap_or(0) % 2 == 0 {
                "even".to_string()
            } else {
                "odd".to_string()
            }
        };

        let mut state = WorkflowState::empty();
        state.update("count", json!(4)).unwrap();
        assert_eq!(router.route(&state).unwrap(), "even");

        state.update("count", json!(3)).unwrap();
        assert_eq!(router.route(&state).unwrap(), "odd");
    }
}
