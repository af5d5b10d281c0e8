// SPDX-License-Identifier: MIT

//! waypoint-rs: step graphs with conditional routing and human-in-the-loop
//! pause/resume.
//!
//! - [`sdk`] holds the contracts steps and routers implement.
//! - [`waypoint`] holds the runtime: graphs, state, checkpoints, the HTTP
//!   service and the built-in step kinds.

pub mod sdk;
pub mod waypoint;
