// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Reasons for optimization algorithms to stop
///
/// The trust-region solvers of this crate finish regularly with [`RhoEndReached`], which covers
/// both the "lower bound on the trust radius reached" and the "trust radius exhausted" outcomes.
/// The `Nan*` variants and [`DamagingRounding`] report numerical breakdown; the best parameter
/// vector found before the breakdown is still available from the final state.
///
/// [`RhoEndReached`]: TerminationReason::RhoEndReached
/// [`DamagingRounding`]: TerminationReason::DamagingRounding
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub enum TerminationReason {
    /// The optimization algorithm is not terminated
    NotTerminated,
    /// The lower bound on the trust-region radius was reached
    RhoEndReached,
    /// Reached target cost function value at a feasible point
    TargetCostReached,
    /// Reached maximum number of cost function evaluations
    MaxFuncEvalsReached,
    /// Reached maximum number of iterations
    MaxItersReached,
    /// A parameter vector contains non-finite entries
    NanInput,
    /// The objective function returned a non-finite value
    NanObjective,
    /// The interpolation model became non-finite
    NanModel,
    /// Rounding errors are damaging the interpolation; continuing is pointless
    DamagingRounding,
    /// Algorithm manually interrupted with Ctrl+C
    KeyboardInterrupt,
    /// Algorithm aborted
    Aborted,
}

impl TerminationReason {
    /// Returns `true` if a solver terminated and `false` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// use lincoa::core::TerminationReason;
    ///
    /// assert!(TerminationReason::RhoEndReached.terminated());
    /// assert!(TerminationReason::MaxFuncEvalsReached.terminated());
    /// assert!(!TerminationReason::NotTerminated.terminated());
    /// ```
    pub fn terminated(self) -> bool {
        !matches!(self, TerminationReason::NotTerminated)
    }

    /// Returns a textual representation of what happened.
    ///
    /// # Example
    ///
    /// ```
    /// use lincoa::core::TerminationReason;
    ///
    /// assert_eq!(
    ///     TerminationReason::RhoEndReached.text(),
    ///     "Lower bound on the trust-region radius reached"
    /// );
    /// assert_eq!(
    ///     TerminationReason::TargetCostReached.text(),
    ///     "Target cost value reached"
    /// );
    /// ```
    pub fn text(&self) -> &str {
        match *self {
            TerminationReason::NotTerminated => "Not terminated",
            TerminationReason::RhoEndReached => {
                "Lower bound on the trust-region radius reached"
            }
            TerminationReason::TargetCostReached => "Target cost value reached",
            TerminationReason::MaxFuncEvalsReached => {
                "Maximum number of function evaluations reached"
            }
            TerminationReason::MaxItersReached => "Maximum number of iterations reached",
            TerminationReason::NanInput => "Parameter vector contains non-finite entries",
            TerminationReason::NanObjective => "Objective function value is not finite",
            TerminationReason::NanModel => "Interpolation model is not finite",
            TerminationReason::DamagingRounding => "Rounding errors are damaging the model",
            TerminationReason::KeyboardInterrupt => "Keyboard interrupt",
            TerminationReason::Aborted => "Optimization aborted",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

impl Default for TerminationReason {
    fn default() -> Self {
        TerminationReason::NotTerminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    send_sync_test!(termination_reason, TerminationReason);

    #[test]
    fn test_terminated() {
        for reason in [
            TerminationReason::RhoEndReached,
            TerminationReason::TargetCostReached,
            TerminationReason::MaxFuncEvalsReached,
            TerminationReason::MaxItersReached,
            TerminationReason::NanInput,
            TerminationReason::NanObjective,
            TerminationReason::NanModel,
            TerminationReason::DamagingRounding,
            TerminationReason::KeyboardInterrupt,
            TerminationReason::Aborted,
        ] {
            assert!(reason.terminated());
        }
        assert!(!TerminationReason::NotTerminated.terminated());
    }

    #[test]
    fn test_default() {
        assert_eq!(TerminationReason::default(), TerminationReason::NotTerminated);
    }
}
