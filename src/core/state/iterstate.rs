// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::core::{LincoaFloat, Problem, State, TerminationReason};
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maintains the state from iteration to iteration of a solver
///
/// Keeps track of
///
/// * parameter vector of current and previous iteration
/// * best parameter vector of current and previous iteration
/// * cost function value of current and previous iteration
/// * current and previous best cost function value
/// * constraint violation of the current and the best parameter vector
/// * target cost function value
/// * current iteration number
/// * iteration number where the last best parameter vector was found
/// * maximum number of iterations that will be executed
/// * problem function evaluation counts
/// * elapsed time
/// * termination reason
///
/// Unlike state types of gradient-based frameworks there are no slots for gradients, Jacobians
/// or Hessians: the solvers of this crate only ever sample cost function values.
#[derive(Clone, Default, Debug)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct IterState<P, F> {
    /// Current parameter vector
    pub param: Option<P>,
    /// Previous parameter vector
    pub prev_param: Option<P>,
    /// Current best parameter vector
    pub best_param: Option<P>,
    /// Previous best parameter vector
    pub prev_best_param: Option<P>,
    /// Current cost function value
    pub cost: F,
    /// Previous cost function value
    pub prev_cost: F,
    /// Current best cost function value
    pub best_cost: F,
    /// Previous best cost function value
    pub prev_best_cost: F,
    /// Target cost function value
    pub target_cost: F,
    /// Constraint violation of the current parameter vector, in the units of the original
    /// constraints
    pub cstrv: F,
    /// Constraint violation of the best parameter vector
    pub best_cstrv: F,
    /// Current iteration
    pub iter: u64,
    /// Iteration number of last best cost
    pub last_best_iter: u64,
    /// Maximum number of iterations
    pub max_iters: u64,
    /// Evaluation counts
    pub counts: HashMap<String, u64>,
    /// Time required so far
    pub time: Option<instant::Duration>,
    /// Reason of termination
    pub termination_reason: TerminationReason,
}

impl<P, F> IterState<P, F>
where
    Self: State<Float = F>,
    F: LincoaFloat,
{
    /// Set parameter vector. This shifts the stored parameter vector to the previous parameter
    /// vector.
    ///
    /// # Example
    ///
    /// ```
    /// # use lincoa::core::{IterState, State};
    /// # let state: IterState<Vec<f64>, f64> = IterState::new();
    /// let state = state.param(vec![1.0, 2.0]);
    /// # assert_eq!(state.param.as_ref().unwrap()[0].to_ne_bytes(), 1.0f64.to_ne_bytes());
    /// ```
    #[must_use]
    pub fn param(mut self, param: P) -> Self {
        std::mem::swap(&mut self.prev_param, &mut self.param);
        self.param = Some(param);
        self
    }

    /// Set the current cost function value. This shifts the stored cost function value to the
    /// previous cost function value.
    ///
    /// # Example
    ///
    /// ```
    /// # use lincoa::core::{IterState, State};
    /// # let state: IterState<Vec<f64>, f64> = IterState::new();
    /// let state = state.cost(2.0);
    /// # assert_eq!(state.cost.to_ne_bytes(), 2.0f64.to_ne_bytes());
    /// ```
    #[must_use]
    pub fn cost(mut self, cost: F) -> Self {
        std::mem::swap(&mut self.prev_cost, &mut self.cost);
        self.cost = cost;
        self
    }

    /// Set target cost.
    ///
    /// When a feasible point with this cost is reached, the algorithm will stop. The default is
    /// `Self::Float::NEG_INFINITY`.
    ///
    /// # Example
    ///
    /// ```
    /// # use lincoa::core::{IterState, State};
    /// # let state: IterState<Vec<f64>, f64> = IterState::new();
    /// let state = state.target_cost(0.0);
    /// # assert_eq!(state.target_cost.to_ne_bytes(), 0.0f64.to_ne_bytes());
    /// ```
    #[must_use]
    pub fn target_cost(mut self, target_cost: F) -> Self {
        self.target_cost = target_cost;
        self
    }

    /// Set maximum number of iterations
    ///
    /// # Example
    ///
    /// ```
    /// # use lincoa::core::{IterState, State};
    /// # let state: IterState<Vec<f64>, f64> = IterState::new();
    /// let state = state.max_iters(1000);
    /// # assert_eq!(state.max_iters, 1000);
    /// ```
    #[must_use]
    pub fn max_iters(mut self, iters: u64) -> Self {
        self.max_iters = iters;
        self
    }

    /// Set the constraint violation of the current parameter vector.
    ///
    /// # Example
    ///
    /// ```
    /// # use lincoa::core::{IterState, State};
    /// # let state: IterState<Vec<f64>, f64> = IterState::new();
    /// let state = state.constraint_violation(0.25);
    /// # assert_eq!(state.cstrv.to_ne_bytes(), 0.25f64.to_ne_bytes());
    /// ```
    #[must_use]
    pub fn constraint_violation(mut self, cstrv: F) -> Self {
        self.cstrv = cstrv;
        self
    }

    /// Returns the current cost function value
    pub fn get_cost(&self) -> F {
        self.cost
    }

    /// Returns the previous cost function value
    pub fn get_prev_cost(&self) -> F {
        self.prev_cost
    }

    /// Returns the current best cost function value
    pub fn get_best_cost(&self) -> F {
        self.best_cost
    }

    /// Returns the previous best cost function value
    pub fn get_prev_best_cost(&self) -> F {
        self.prev_best_cost
    }

    /// Returns the target cost function value
    pub fn get_target_cost(&self) -> F {
        self.target_cost
    }

    /// Returns the constraint violation of the current parameter vector
    pub fn get_constraint_violation(&self) -> F {
        self.cstrv
    }

    /// Returns the constraint violation of the best parameter vector
    pub fn get_best_constraint_violation(&self) -> F {
        self.best_cstrv
    }

    /// Moves the current parameter vector out of the state and replaces it with `None`.
    pub fn take_param(&mut self) -> Option<P> {
        self.param.take()
    }

    /// Returns a reference to the previous parameter vector
    pub fn get_prev_param(&self) -> Option<&P> {
        self.prev_param.as_ref()
    }

    /// Returns a reference to the previous best parameter vector
    pub fn get_prev_best_param(&self) -> Option<&P> {
        self.prev_best_param.as_ref()
    }
}

impl<P, F> State for IterState<P, F>
where
    P: Clone,
    F: LincoaFloat,
{
    type Param = P;
    type Float = F;

    /// Create a new `IterState` instance
    ///
    /// # Example
    ///
    /// ```
    /// # use lincoa::core::{IterState, State};
    /// let state: IterState<Vec<f64>, f64> = IterState::new();
    /// # assert!(state.param.is_none());
    /// # assert!(state.cost.is_infinite());
    /// ```
    fn new() -> Self {
        IterState {
            param: None,
            prev_param: None,
            best_param: None,
            prev_best_param: None,
            cost: F::infinity(),
            prev_cost: F::infinity(),
            best_cost: F::infinity(),
            prev_best_cost: F::infinity(),
            target_cost: F::neg_infinity(),
            cstrv: F::zero(),
            best_cstrv: F::zero(),
            iter: 0,
            last_best_iter: 0,
            max_iters: std::u64::MAX,
            counts: HashMap::new(),
            time: Some(instant::Duration::new(0, 0)),
            termination_reason: TerminationReason::NotTerminated,
        }
    }

    /// Checks if the current parameter vector is better than the previous best parameter vector.
    /// If so, the current parameter vector becomes the best parameter vector (and the same for
    /// the cost function value and the constraint violation).
    fn update(&mut self) {
        if self.cost < self.best_cost
            || (self.cost.is_infinite()
                && self.best_cost.is_infinite()
                && self.cost.is_sign_positive() == self.best_cost.is_sign_positive())
        {
            if let Some(param) = self.param.clone() {
                std::mem::swap(&mut self.prev_best_param, &mut self.best_param);
                self.best_param = Some(param);
            }
            std::mem::swap(&mut self.prev_best_cost, &mut self.best_cost);
            self.best_cost = self.cost;
            self.best_cstrv = self.cstrv;
            self.last_best_iter = self.iter;
        }
    }

    fn get_param(&self) -> Option<&P> {
        self.param.as_ref()
    }

    fn get_best_param(&self) -> Option<&P> {
        self.best_param.as_ref()
    }

    fn get_max_iters(&self) -> u64 {
        self.max_iters
    }

    fn increment_iter(&mut self) {
        self.iter += 1;
    }

    fn get_iter(&self) -> u64 {
        self.iter
    }

    fn get_cost(&self) -> Self::Float {
        self.cost
    }

    fn get_best_cost(&self) -> Self::Float {
        self.best_cost
    }

    fn get_target_cost(&self) -> Self::Float {
        self.target_cost
    }

    fn func_counts<O>(&mut self, problem: &Problem<O>) {
        for (k, &v) in problem.counts.iter() {
            let count = self.counts.entry(k.to_string()).or_insert(0);
            *count = v
        }
    }

    fn get_func_counts(&self) -> &HashMap<String, u64> {
        &self.counts
    }

    fn terminated(&self) -> bool {
        self.termination_reason.terminated()
    }

    fn terminate_with(mut self, termination_reason: TerminationReason) -> Self {
        self.termination_reason = termination_reason;
        self
    }

    fn get_termination_reason(&self) -> TerminationReason {
        self.termination_reason
    }

    fn time(&mut self, time: Option<instant::Duration>) -> &mut Self {
        self.time = time;
        self
    }

    fn get_time(&self) -> Option<instant::Duration> {
        self.time
    }

    fn get_last_best_iter(&self) -> u64 {
        self.last_best_iter
    }

    fn is_best(&self) -> bool {
        self.last_best_iter == self.iter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    send_sync_test!(iterstate, IterState<Vec<f64>, f64>);

    #[test]
    fn test_new() {
        let state: IterState<Vec<f64>, f64> = IterState::new();
        assert!(state.get_param().is_none());
        assert!(state.get_best_param().is_none());
        assert!(state.get_cost().is_infinite());
        assert!(state.get_cost().is_sign_positive());
        assert!(state.get_best_cost().is_infinite());
        assert!(state.get_target_cost().is_infinite());
        assert!(state.get_target_cost().is_sign_negative());
        assert_eq!(state.get_iter(), 0);
        assert_eq!(state.get_max_iters(), std::u64::MAX);
        assert!(!state.terminated());
    }

    #[test]
    fn test_update_promotes_better_param() {
        let mut state: IterState<Vec<f64>, f64> = IterState::new();
        state = state.param(vec![1.0, 1.0]).cost(10.0).constraint_violation(0.5);
        state.update();
        assert_eq!(*state.get_best_param().unwrap(), vec![1.0, 1.0]);
        assert_eq!(state.get_best_cost().to_ne_bytes(), 10.0f64.to_ne_bytes());
        assert_eq!(
            state.get_best_constraint_violation().to_ne_bytes(),
            0.5f64.to_ne_bytes()
        );

        // A worse parameter vector must not become best.
        state = state.param(vec![2.0, 2.0]).cost(11.0);
        state.increment_iter();
        state.update();
        assert_eq!(*state.get_best_param().unwrap(), vec![1.0, 1.0]);
        assert_eq!(state.get_best_cost().to_ne_bytes(), 10.0f64.to_ne_bytes());
        assert!(!state.is_best());

        // A better one must.
        state = state.param(vec![0.0, 0.0]).cost(1.0).constraint_violation(0.0);
        state.update();
        assert_eq!(*state.get_best_param().unwrap(), vec![0.0, 0.0]);
        assert_eq!(state.get_best_cost().to_ne_bytes(), 1.0f64.to_ne_bytes());
        assert_eq!(
            state.get_best_constraint_violation().to_ne_bytes(),
            0.0f64.to_ne_bytes()
        );
        assert!(state.is_best());
    }

    #[test]
    fn test_param_shifts_previous() {
        let state: IterState<Vec<f64>, f64> = IterState::new();
        let state = state.param(vec![1.0]);
        assert!(state.get_prev_param().is_none());
        let state = state.param(vec![2.0]);
        assert_eq!(*state.get_prev_param().unwrap(), vec![1.0]);
        assert_eq!(*state.get_param().unwrap(), vec![2.0]);
    }

    #[test]
    fn test_terminate_with() {
        let state: IterState<Vec<f64>, f64> = IterState::new();
        let state = state.terminate_with(TerminationReason::RhoEndReached);
        assert!(state.terminated());
        assert_eq!(
            state.get_termination_reason(),
            TerminationReason::RhoEndReached
        );
    }
}
