// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! lincoa is a derivative-free optimization library written entirely in Rust.
//!
//! It minimizes smooth objective functions subject to linear inequality constraints
//! `a_j'x <= b_j`, sampling nothing but function values. The objective is assumed expensive: the
//! solver maintains a quadratic interpolation model over a moving set of sample points and
//! spends its evaluations either on reducing a trust-region subproblem or on keeping the
//! geometry of the interpolation set healthy.
//!
//! The interface follows the common executor pattern: a problem implements
//! [`CostFunction`](`crate::core::CostFunction`), a solver is plugged into an
//! [`Executor`](`crate::core::Executor`), and observers can be attached to follow the progress
//! of the run.
//!
//! # Algorithms
//!
//! - [LINCOA](`crate::solver::lincoa::Lincoa`): trust-region interpolation method for linearly
//!   constrained derivative-free minimization
//! - [Moré-Sorensen](`crate::solver::trustregion::MoreSorensen`): nearly exact solution of the
//!   dense trust-region subproblem, as used by quadratic-model methods
//!
//! # Example
//!
//! ```
//! use lincoa::core::{CostFunction, Error, Executor, State};
//! use lincoa::solver::lincoa::Lincoa;
//!
//! struct Rosenbrock {}
//!
//! impl CostFunction for Rosenbrock {
//!     type Param = Vec<f64>;
//!     type Output = f64;
//!
//!     fn cost(&self, p: &Self::Param) -> Result<Self::Output, Error> {
//!         Ok(100.0 * (p[1] - p[0].powi(2)).powi(2) + (1.0 - p[0]).powi(2))
//!     }
//! }
//!
//! fn main() -> Result<(), Error> {
//!     let solver = Lincoa::new().with_rho(0.5, 1e-6)?;
//!     let res = Executor::new(Rosenbrock {}, solver)
//!         .configure(|state| state.param(vec![-1.2, 1.0]))
//!         .run()?;
//!     println!("{}", res);
//!     # assert!(res.state().get_best_cost() < 1e-4);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `slog-logger` (default): observer logging progress to the terminal via `slog`
//! - `serde1` (default): serialization of solvers, states and results
//! - `ctrlc`: graceful stop on Ctrl-C
//!
//! # License
//!
//! Licensed under either of
//!
//!   * Apache License, Version 2.0, ([LICENSE-APACHE](https://github.com/lincoa-rs/lincoa/blob/main/LICENSE-APACHE) or
//!     <http://www.apache.org/licenses/LICENSE-2.0>)
//!   * MIT License ([LICENSE-MIT](https://github.com/lincoa-rs/lincoa/blob/main/LICENSE-MIT) or
//!     <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![allow(clippy::float_cmp)]

#[macro_use]
pub mod core;

/// Dense linear algebra helpers
pub mod linalg;

/// Solvers
pub mod solver;
