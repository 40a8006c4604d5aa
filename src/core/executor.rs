// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::core::observers::{Observe, ObserverMode, Observers};
use crate::core::{Error, OptimizationResult, Problem, Solver, State, TerminationReason, KV};
use instant;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Solves an optimization problem with a solver
pub struct Executor<O, S, I> {
    /// Solver
    solver: S,
    /// Problem
    problem: Problem<O>,
    /// State
    state: Option<I>,
    /// Storage for observers
    observers: Observers<I>,
    /// Indicates whether Ctrl-C functionality should be active or not
    ctrlc: bool,
    /// Indicates whether to time execution or not
    timer: bool,
}

impl<O, S, I> Executor<O, S, I>
where
    S: Solver<O, I>,
    I: State,
{
    /// Constructs an `Executor` from a user defined problem and a solver.
    ///
    /// # Example
    ///
    /// ```
    /// # use lincoa::core::{CostFunction, Error, Executor, IterState};
    /// # use lincoa::solver::lincoa::Lincoa;
    /// #
    /// # struct Sphere {}
    /// #
    /// # impl CostFunction for Sphere {
    /// #     type Param = Vec<f64>;
    /// #     type Output = f64;
    /// #
    /// #     fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
    /// #         Ok(param.iter().map(|x| x * x).sum())
    /// #     }
    /// # }
    /// #
    /// // Construct an instance of the desired solver
    /// let solver: Lincoa<f64> = Lincoa::new();
    ///
    /// // Construct an executor which plugs the solver and the problem together
    /// let executor = Executor::new(Sphere {}, solver);
    /// ```
    pub fn new(problem: O, solver: S) -> Self {
        let state = Some(I::new());
        Executor {
            solver,
            problem: Problem::new(problem),
            state,
            observers: Observers::new(),
            ctrlc: true,
            timer: true,
        }
    }

    /// Runs the executor by applying the solver to the optimization problem.
    pub fn run(mut self) -> Result<OptimizationResult<O, S, I>, Error> {
        let total_time = if self.timer {
            Some(instant::Instant::now())
        } else {
            None
        };

        let state = self.state.take().unwrap();

        let running = Arc::new(AtomicBool::new(true));

        if self.ctrlc {
            #[cfg(feature = "ctrlc")]
            {
                // Set up the Ctrl-C handler
                let r = running.clone();
                // Subsequent runs within the same process are not able to install another
                // handler, which is fine: the already installed one keeps working through the
                // shared flag.
                match ctrlc::set_handler(move || {
                    r.store(false, Ordering::SeqCst);
                }) {
                    Err(ctrlc::Error::MultipleHandlers) => Ok(()),
                    r => r,
                }?;
            }
        }

        let (mut state, kv) = self.solver.init(&mut self.problem, state)?;
        state.update();

        if !self.observers.is_empty() {
            let mut logs = kv!("max_iters" => state.get_max_iters(););

            if let Some(kv) = kv {
                logs = logs.merge(kv);
            }

            // Observe after init
            self.observers.observe_init(S::NAME, &logs)?;
        }

        state.func_counts(&self.problem);

        while running.load(Ordering::SeqCst) {
            // Check whether the solver has terminated already within `init` or within the
            // previous call to `next_iter` before evaluating the stopping criteria: doing it in
            // this order makes sure that a termination reason set by the solver itself is not
            // overwritten.
            state = if !state.terminated() {
                let term = self.solver.terminate_internal(&state);
                state.terminate_with(term)
            } else {
                state
            };
            if state.terminated() {
                break;
            }

            // Start time measurement
            let start = if self.timer {
                Some(instant::Instant::now())
            } else {
                None
            };

            let (state_t, kv) = self.solver.next_iter(&mut self.problem, state)?;
            state = state_t;

            state.func_counts(&self.problem);

            // End time measurement
            let duration = if self.timer {
                Some(start.unwrap().elapsed())
            } else {
                None
            };

            state.update();

            if !self.observers.is_empty() {
                let mut log = if let Some(kv) = kv { kv } else { KV::new() };

                if self.timer {
                    let duration = duration.unwrap();
                    let tmp = kv!(
                        "time" => duration.as_secs() as f64
                            + f64::from(duration.subsec_nanos()) * 1e-9;
                    );
                    log = log.merge(tmp);
                }
                self.observers.observe_iter(&state, &log)?;
            }

            // increment iteration number
            state.increment_iter();

            if let Some(total_time) = total_time {
                state.time(Some(total_time.elapsed()));
            }

            // Check if termination occurred inside next_iter()
            if state.terminated() {
                break;
            }
        }

        // If the loop stopped without a termination reason, someone must have pulled the
        // handbrake.
        if !state.terminated() {
            state = state.terminate_with(TerminationReason::KeyboardInterrupt);
        }
        Ok(OptimizationResult::new(self.problem, self.solver, state))
    }

    /// Attaches an observer to the executor.
    #[must_use]
    pub fn add_observer<OBS: Observe<I> + 'static>(
        mut self,
        observer: OBS,
        mode: ObserverMode,
    ) -> Self {
        self.observers.push(observer, mode);
        self
    }

    /// Configures the iteration state before the run.
    ///
    /// # Example
    ///
    /// ```
    /// # use lincoa::core::{CostFunction, Error, Executor, IterState};
    /// # use lincoa::solver::lincoa::Lincoa;
    /// #
    /// # struct Sphere {}
    /// #
    /// # impl CostFunction for Sphere {
    /// #     type Param = Vec<f64>;
    /// #     type Output = f64;
    /// #
    /// #     fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
    /// #         Ok(param.iter().map(|x| x * x).sum())
    /// #     }
    /// # }
    /// # let solver: Lincoa<f64> = Lincoa::new();
    /// let executor = Executor::new(Sphere {}, solver)
    ///     .configure(|state| state.param(vec![1.0, 1.0]).max_iters(100));
    /// ```
    #[must_use]
    pub fn configure<F: FnOnce(I) -> I>(mut self, init: F) -> Self {
        let state = self.state.take().unwrap();
        let state = init(state);
        self.state = Some(state);
        self
    }

    /// Turns Ctrl-C handling on or off (default: on)
    #[must_use]
    pub fn ctrlc(mut self, ctrlc: bool) -> Self {
        self.ctrlc = ctrlc;
        self
    }

    /// Turns timer on or off (default: on)
    #[must_use]
    pub fn timer(mut self, timer: bool) -> Self {
        self.timer = timer;
        self
    }
}
