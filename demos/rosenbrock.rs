// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use lincoa::core::observers::{ObserverMode, SlogLogger};
use lincoa::core::{CostFunction, Error, Executor, State};
use lincoa::solver::lincoa::Lincoa;

struct Rosenbrock {}

impl CostFunction for Rosenbrock {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> Result<Self::Output, Error> {
        Ok(100.0 * (p[1] - p[0].powi(2)).powi(2) + (1.0 - p[0]).powi(2))
    }
}

fn run() -> Result<(), Error> {
    let solver = Lincoa::new().with_rho(0.5, 1e-8)?;

    let res = Executor::new(Rosenbrock {}, solver)
        .configure(|state| state.param(vec![-1.2, 1.0]))
        .add_observer(SlogLogger::term(), ObserverMode::Every(10))
        .run()?;

    // Wait for the logger to flush.
    std::thread::sleep(std::time::Duration::from_millis(10));

    println!("{}", res);
    println!(
        "best parameters: {:?}",
        res.state().get_best_param().unwrap()
    );
    Ok(())
}

fn main() {
    if let Err(ref e) = run() {
        println!("{}", e);
        std::process::exit(1);
    }
}
