// SPDX-License-Identifier: MIT

//! Step graph construction and execution
//!
//! `GraphBuilder` registers steps and transitions and compiles them into an
//! immutable `StepGraph`, which runs a state record from the start step to
//! `END`, pausing whenever a step asks for outside input.

mod construct;
pub mod executor;
pub mod types;

pub use construct::GraphBuilder;
pub use executor::StepGraph;
pub use types::{PauseToken, RunEvent, RunOutcome, Transition};
