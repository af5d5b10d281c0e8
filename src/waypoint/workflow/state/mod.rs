// SPDX-License-Identifier: MIT

//! State management for step graphs
//!
//! This module provides:
//! - `StateSchema` - declares each state field once per workflow
//! - `WorkflowState` - the record threaded through a run, with reducer support
//! - `ReducerType` - strategies for merging values into state

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::WorkflowState;
