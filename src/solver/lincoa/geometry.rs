// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Geometry-improving step.
//!
//! Replaces a chosen sample point by one that keeps the interpolation set well poised: the step
//! approximately maximizes the absolute value of the sample's Lagrange function inside the
//! given radius, subject to the constraints which are near-active at the best point. Two
//! candidate constructions are compared: a step along the Lagrange gradient and a step along
//! the straight line towards one of the other samples.

use crate::core::{Error, LincoaFloat};
use crate::linalg;
use crate::solver::lincoa::model::InterpolationModel;
use ndarray::{Array1, Array2};

/// Result of the geometry step construction.
pub(crate) struct GeometryStep<F> {
    /// The step, relative to the best point
    pub(crate) step: Array1<F>,
    /// Whether the step satisfies every constraint residual
    pub(crate) ifeas: bool,
}

/// Value of the 1-d section of the Lagrange function: `l0 + alpha g + alpha^2 h / 2`.
fn section<F: LincoaFloat>(l0: F, g: F, h: F, alpha: F) -> F {
    l0 + alpha * g + float!(0.5) * h * alpha * alpha
}

/// Largest absolute value of the section over `[lo, hi]` and the argument attaining it.
fn max_abs_on_interval<F: LincoaFloat>(l0: F, g: F, h: F, lo: F, hi: F) -> (F, F) {
    let mut best = (section(l0, g, h, hi).abs(), hi);
    let v = section(l0, g, h, lo).abs();
    if v > best.0 {
        best = (v, lo);
    }
    if h != F::zero() {
        let vertex = -g / h;
        if vertex > lo && vertex < hi {
            let v = section(l0, g, h, vertex).abs();
            if v > best.0 {
                best = (v, vertex);
            }
        }
    }
    best
}

/// Clips the step interval `[-bound, bound]` along direction `u` by the constraints which are
/// near-active at the best point.
fn clip_interval<F: LincoaFloat>(
    u: &Array1<F>,
    bound: F,
    amat: &Array2<F>,
    rescon: &Array1<F>,
) -> (F, F) {
    let mut lo = -bound;
    let mut hi = bound;
    for j in 0..amat.ncols() {
        let r = rescon[j];
        if r < F::zero() {
            continue;
        }
        let au = amat.column(j).dot(u);
        if au > F::epsilon() {
            hi = hi.min(r / au);
        } else if au < -F::epsilon() {
            lo = lo.max(r / au);
        }
    }
    (lo.min(F::zero()), hi.max(F::zero()))
}

/// Computes a step of length at most `delta` from the best point which approximately maximizes
/// `|L_knew|`, honoring the constraints with nonnegative residual encoding.
///
/// `ifeas` reports whether the final step respects every constraint's residual, including the
/// ones the construction ignored.
pub(crate) fn geometry_step<F: LincoaFloat>(
    model: &InterpolationModel<F>,
    knew: usize,
    delta: F,
    amat: &Array2<F>,
    rescon: &Array1<F>,
    feas_tol: F,
) -> Result<GeometryStep<F>, Error> {
    let n = model.n;
    let m = amat.ncols();
    let coeff = model.lagrange_coeff(knew)?;
    let gl = model.lagrange_gradient(knew)?;
    let l_at_opt = if knew == model.kopt {
        F::one()
    } else {
        F::zero()
    };

    // Curvature of the Lagrange function along a direction u is sum_k c_k (x_k'u)^2.
    let curvature = |u: &Array1<F>| -> F {
        let mut h = F::zero();
        for k in 0..model.npt {
            let t = model.xpt.column(k).dot(u);
            h = h + coeff[k] * t * t;
        }
        h
    };

    // For every candidate direction, track both the maximizer over the constraint-clipped
    // interval and the one over the full interval. The unconstrained step is kept as a fallback:
    // when the near-active constraints leave almost nothing of the Lagrange function (which
    // happens when opposing constraints pin the samples onto a hyperplane), an infeasible
    // replacement point is the only way to keep the interpolation set unisolvent.
    let mut best_feas: Option<(F, Array1<F>)> = None;
    let mut best_free: Option<(F, Array1<F>)> = None;
    let mut consider = |u: &Array1<F>, g1: F, h1: F| {
        let (lo, hi) = clip_interval(u, delta, amat, rescon);
        let (val, alpha) = max_abs_on_interval(l_at_opt, g1, h1, lo, hi);
        match best_feas {
            Some((bv, _)) if val <= bv => {}
            _ => best_feas = Some((val, u.mapv(|x| x * alpha))),
        }
        let (val, alpha) = max_abs_on_interval(l_at_opt, g1, h1, -delta, delta);
        match best_free {
            Some((bv, _)) if val <= bv => {}
            _ => best_free = Some((val, u.mapv(|x| x * alpha))),
        }
    };

    // Candidate along the Lagrange gradient.
    let glnorm = linalg::norm(gl.view());
    if glnorm > F::zero() {
        let u = gl.mapv(|x| x / glnorm);
        let g1 = gl.dot(&u);
        let h1 = curvature(&u);
        consider(&u, g1, h1);
    }

    // Candidates along the lines through the other samples.
    let xopt = model.xopt();
    for k in 0..model.npt {
        if k == model.kopt {
            continue;
        }
        let u = model.xpt.column(k).to_owned() - &xopt;
        let unorm = linalg::norm(u.view());
        if unorm <= F::zero() {
            continue;
        }
        let u = u.mapv(|x| x / unorm);
        let g1 = gl.dot(&u);
        let h1 = curvature(&u);
        consider(&u, g1, h1);
    }

    let feas_val = best_feas.as_ref().map(|b| b.0).unwrap_or(F::zero());
    let free_val = best_free.as_ref().map(|b| b.0).unwrap_or(F::zero());
    let (mut step, trim) = if feas_val >= float!(0.1) * free_val {
        (
            best_feas.map(|b| b.1).unwrap_or_else(|| Array1::zeros(n)),
            true,
        )
    } else {
        (best_free.map(|b| b.1).unwrap_or_else(|| Array1::zeros(n)), false)
    };

    // Pull the feasible pick back onto the near-active constraints it overruns by roundoff.
    // The gradients have unit norm, so subtracting the excess along the gradient removes the
    // violation.
    if trim {
        for _ in 0..3 {
            let mut worst: Option<(usize, F)> = None;
            for j in 0..m {
                if rescon[j] < F::zero() {
                    continue;
                }
                let v = amat.column(j).dot(&step) - rescon[j];
                match worst {
                    Some((_, w)) if v <= w => {}
                    _ if v > feas_tol => worst = Some((j, v)),
                    _ => {}
                }
            }
            match worst {
                Some((j, v)) => {
                    for i in 0..n {
                        step[i] = step[i] - v * amat[[i, j]];
                    }
                }
                None => break,
            }
        }
    }
    let snorm = linalg::norm(step.view());
    if snorm > delta && snorm > F::zero() {
        let scale = delta / snorm;
        step.mapv_inplace(|x| x * scale);
    }

    let mut ifeas = true;
    for j in 0..m {
        if rescon[j] < F::zero() {
            continue;
        }
        if amat.column(j).dot(&step) > rescon[j] + feas_tol {
            ifeas = false;
            break;
        }
    }

    Ok(GeometryStep { step, ifeas })
}
