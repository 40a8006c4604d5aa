// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use lincoa::core::observers::{ObserverMode, SlogLogger};
use lincoa::core::{CostFunction, Error, Executor, State};
use lincoa::solver::lincoa::Lincoa;

/// Distance to the point (2, 2), to be minimized over the triangle
/// `x + y <= 1`, `x >= 0`, `y >= 0`. The solution is the vertex-facing edge
/// point (0.5, 0.5).
struct Distance {}

impl CostFunction for Distance {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> Result<Self::Output, Error> {
        Ok((p[0] - 2.0).powi(2) + (p[1] - 2.0).powi(2))
    }
}

fn run() -> Result<(), Error> {
    let solver = Lincoa::new()
        .with_rho(0.2, 1e-8)?
        .with_constraints(
            vec![vec![1.0, 1.0], vec![-1.0, 0.0], vec![0.0, -1.0]],
            vec![1.0, 0.0, 0.0],
        )?;

    let res = Executor::new(Distance {}, solver)
        .configure(|state| state.param(vec![0.2, 0.2]))
        .add_observer(SlogLogger::term(), ObserverMode::NewBest)
        .run()?;

    // Wait for the logger to flush.
    std::thread::sleep(std::time::Duration::from_millis(10));

    println!("{}", res);
    println!(
        "best parameters: {:?}, constraint violation: {}",
        res.state().get_best_param().unwrap(),
        res.state().get_best_constraint_violation()
    );
    Ok(())
}

fn main() {
    if let Err(ref e) = run() {
        println!("{}", e);
        std::process::exit(1);
    }
}
