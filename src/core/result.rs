// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Final result of an optimization run
//!
//! Returned by [`Executor::run`](`crate::core::Executor::run`). Gives access to the wrapped
//! problem (including evaluation counts), the solver and the final iteration state. The best
//! parameter vector and the best cost function value are obtained from the state.

use crate::core::{Problem, State};
use std::fmt;

/// Final struct returned by the `run` method of `Executor`.
#[derive(Clone)]
pub struct OptimizationResult<O, S, I> {
    /// Problem, including evaluation counts
    pub problem: Problem<O>,
    /// Solver
    pub solver: S,
    /// Iteration state
    pub state: I,
}

impl<O, S, I> OptimizationResult<O, S, I> {
    /// Constructor
    pub fn new(problem: Problem<O>, solver: S, state: I) -> Self {
        OptimizationResult {
            problem,
            solver,
            state,
        }
    }

    /// Returns a reference to the stored problem.
    pub fn problem(&self) -> &Problem<O> {
        &self.problem
    }

    /// Returns a reference to the stored solver.
    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Returns a reference to the stored iteration state.
    pub fn state(&self) -> &I {
        &self.state
    }
}

impl<O, S, I> fmt::Display for OptimizationResult<O, S, I>
where
    I: State,
    I::Param: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "OptimizationResult:")?;
        writeln!(f, "    param (best):  {:?}", self.state.get_best_param())?;
        writeln!(f, "    cost (best):   {}", self.state.get_best_cost())?;
        writeln!(f, "    iters (best):  {}", self.state.get_last_best_iter())?;
        writeln!(f, "    iters (total): {}", self.state.get_iter())?;
        writeln!(
            f,
            "    termination:   {}",
            self.state.get_termination_reason()
        )?;
        writeln!(f, "    time:          {:?}", self.state.get_time())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::IterState;

    send_sync_test!(
        optimization_result,
        OptimizationResult<(), (), IterState<Vec<f64>, f64>>
    );
}
