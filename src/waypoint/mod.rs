// SPDX-License-Identifier: MIT

pub mod checkpoint;
pub mod config;
pub mod runner;
pub mod server;
pub mod steps;
pub mod workflow;
