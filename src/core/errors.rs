// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Errors

use thiserror::Error;

/// Errors which can be returned by solvers and the surrounding machinery.
///
/// Numerical breakdown inside the interpolation machinery is reported through the
/// `ModelCorrupt` and `DegenerateDenominator` variants. The outer solver loop catches those and
/// converts them into the matching [`TerminationReason`](`crate::core::TerminationReason`); they
/// only escape from functions which are called outside of a solver run.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Indicates an invalid parameter
    #[error("Invalid parameter: {text:?}")]
    InvalidParameter {
        /// Text
        text: String,
    },

    /// Indicates that a function is not initialized
    #[error("Not initialized: {text:?}")]
    NotInitialized {
        /// Text
        text: String,
    },

    /// Indicates that a condition is violated
    #[error("Condition violated: {text:?}")]
    ConditionViolated {
        /// Text
        text: String,
    },

    /// The interpolation model contains non-finite quantities
    #[error("Model corrupt: {text:?}")]
    ModelCorrupt {
        /// Text
        text: String,
    },

    /// The denominator of the interpolation update has collapsed, which signals that the sample
    /// set has lost unisolvency
    #[error("Degenerate denominator: {text:?}")]
    DegenerateDenominator {
        /// Text
        text: String,
    },

    /// For errors which are likely bugs.
    #[error("Potential bug: {text:?}. This is potentially a bug. Please file a report on https://github.com/lincoa-rs/lincoa/issues")]
    PotentialBug {
        /// Text
        text: String,
    },
}
