// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Utilities shared by the tests of several modules.

use crate::core::{CostFunction, Error};

/// A simple test problem: the sphere function.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct TestProblem {}

impl TestProblem {
    /// Constructor
    pub fn new() -> Self {
        TestProblem {}
    }
}

impl Default for TestProblem {
    fn default() -> Self {
        TestProblem::new()
    }
}

impl CostFunction for TestProblem {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        Ok(param.iter().map(|x| x * x).sum())
    }
}
