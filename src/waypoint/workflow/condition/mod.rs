// SPDX-License-Identifier: MIT

//! Condition evaluation for routed transitions
//!
//! Workflow files pick a route with `when` expressions such as:
//! - `intent == 'search'`
//! - `count % 2 == 0`
//! - `not (approved == true) or retries >= 3`
//! - `messages` (truthiness of a field)

mod ast;
mod evaluator;
mod parser;
mod router;

pub use ast::{CompareOp, Expression, Literal, Operand};
pub use evaluator::evaluate;
pub use parser::parse;
pub use router::ConditionRouter;
