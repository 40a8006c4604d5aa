// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Core types and traits
//!
//! This module contains the traits and types necessary for defining optimization problems,
//! running solvers and observing the state of optimization runs.

/// Macros
#[macro_use]
pub mod macros;
/// Error handling
mod errors;
/// Executor
mod executor;
/// Trait alias for float types
mod float;
/// Key value datastructure
mod kv;
/// Observers
pub mod observers;
/// Traits and structs for defining and handling optimization problems
mod problem;
/// Definition of the return type of the solvers
mod result;
/// Trait alias for `serde`s `Serialize` and `DeserializeOwned`
mod serialization;
/// `Solver` trait
mod solver;
/// Iteration state
mod state;
/// Definition of termination reasons
mod termination;
/// Shared test utilities
#[cfg(test)]
pub mod test_utils;

pub use anyhow::Error;
pub use errors::SolverError;
pub use executor::Executor;
pub use float::LincoaFloat;
pub use kv::KV;
pub use problem::{CostFunction, Problem};
pub use result::OptimizationResult;
pub use serialization::{DeserializeOwnedAlias, SerializeAlias};
pub use solver::Solver;
pub use state::{IterState, State};
pub use termination::TerminationReason;
