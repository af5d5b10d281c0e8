// SPDX-License-Identifier: MIT

//! Step development kit
//!
//! Contracts implemented by workflow code:
//! - `Step` - one named unit of work in a graph
//! - `Router` - picks the next step for a routed transition
//! - `StepKind` - builds steps from declarative parameters

pub mod context;
pub mod error;
pub mod kind;
pub mod router;
pub mod step;

pub use context::StepContext;
pub use error::{GraphError, StepError};
pub use kind::StepKind;
pub use router::Router;
pub use step::{step_fn, FnStep, Step, StepOutcome, StateUpdate, END};
