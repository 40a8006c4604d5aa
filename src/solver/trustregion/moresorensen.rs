// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Moré-Sorensen trust-region subproblem solver
//!
//! Solves `min g'd + d'Hd/2` subject to `|d| <= radius` for a dense symmetric `H`, to the
//! accuracy needed by trust-region methods built on quadratic models. The Hessian is reduced to
//! tridiagonal form once; the multiplier `lambda` with `(H + lambda I) d = -g`, `|d| = radius`
//! is then located by a safeguarded Newton iteration on the secular equation, with explicit
//! handling of the hard case.
//!
//! ## References:
//!
//! \[0\] Jorge J. Moré and D. C. Sorensen (1983). Computing a trust region step. SIAM Journal
//! on Scientific and Statistical Computing, 4(3):553-572.
//!
//! \[1\] M. J. D. Powell (2002). UOBYQA: unconstrained optimization by quadratic approximation.
//! Mathematical Programming, Series B, 92:555-582.

use crate::core::{Error, LincoaFloat};
use crate::linalg;
use ndarray::{Array1, Array2};
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Solution of the trust-region subproblem.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct TrustRegionStep<F> {
    /// The computed step
    pub step: Array1<F>,
    /// Least eigenvalue of the Hessian if the step is an interior Newton step, otherwise zero
    pub crvmin: F,
}

/// # Moré-Sorensen method
///
/// Computes a nearly exact solution of the trust-region subproblem for an explicit dense
/// symmetric Hessian. Non-finite input never causes a panic or an error: the solver falls back
/// to a zero step.
///
/// # Example
///
/// ```
/// use lincoa::solver::trustregion::MoreSorensen;
/// use ndarray::{array, Array2};
///
/// let solver: MoreSorensen<f64> = MoreSorensen::new();
/// let g = array![-2.0, -4.0];
/// let mut h = Array2::zeros((2, 2));
/// h[[0, 0]] = 2.0;
/// h[[1, 1]] = 4.0;
/// let sol = solver.solve(&g, &h, 2.0);
/// // The Newton step (1, 1) lies inside the radius.
/// assert!((sol.step[0] - 1.0).abs() < 1e-8);
/// assert!((sol.step[1] - 1.0).abs() < 1e-8);
/// assert!(sol.crvmin > 0.0);
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct MoreSorensen<F> {
    /// Relative accuracy of the model reduction
    tol: F,
}

impl<F: LincoaFloat> MoreSorensen<F> {
    /// Constructs a solver with the default accuracy of `0.01`.
    pub fn new() -> Self {
        MoreSorensen { tol: float!(0.01) }
    }

    /// Sets the relative accuracy.
    ///
    /// Must be in `(0, 1)`.
    pub fn with_tolerance(mut self, tol: F) -> Result<Self, Error> {
        if tol <= F::zero() || tol >= F::one() {
            return Err(solver_error!(
                InvalidParameter,
                "`MoreSorensen`: tol must be in (0, 1)."
            ));
        }
        self.tol = tol;
        Ok(self)
    }

    /// Solves `min g'd + d'Hd/2` subject to `|d| <= radius`.
    ///
    /// Returns the step together with `crvmin`, the least eigenvalue of the Hessian when the
    /// returned step is an interior Newton step and zero otherwise.
    pub fn solve(&self, g: &Array1<F>, hessian: &Array2<F>, radius: F) -> TrustRegionStep<F> {
        let n = g.len();
        let zero = TrustRegionStep {
            step: Array1::zeros(n),
            crvmin: F::zero(),
        };
        if n == 0
            || !radius.is_finite()
            || radius <= F::zero()
            || !linalg::all_finite(g.iter())
            || !linalg::all_finite(hessian.iter())
        {
            return zero;
        }
        if n == 1 {
            return solve_1d(g[0], hessian[[0, 0]], radius);
        }

        let gnorm = linalg::norm(g.view());
        let mut hnorm = F::zero();
        for i in 0..n {
            let mut row = F::zero();
            for j in 0..n {
                row = row + hessian[[i, j]].abs();
            }
            hnorm = hnorm.max(row);
        }
        if hnorm == F::zero() {
            if gnorm == F::zero() {
                return zero;
            }
            let scale = -radius / gnorm;
            return TrustRegionStep {
                step: g.mapv(|x| x * scale),
                crvmin: F::zero(),
            };
        }

        let tri = linalg::tridiagonalize(hessian);
        let gh = tri.transform(g);
        let td = &tri.diag;
        let tn = &tri.offdiag;

        let mut tdmin = td[0];
        for i in 1..n {
            tdmin = tdmin.min(td[i]);
        }
        let mut parl = F::zero().max(-tdmin).max(gnorm / radius - hnorm);
        let mut paru = gnorm / radius + hnorm;
        let mut par = parl;
        let interior_possible = parl == F::zero();

        let max_iters = 1000.min(100 * n);
        let mut best: Option<(F, Array1<F>)> = None;

        for _ in 0..max_iters {
            match factor(td, tn, par) {
                Err((k, pivk, piv)) => {
                    // A nonpositive pivot exposes a direction of nonpositive curvature; it
                    // raises the lower bound on the multiplier.
                    let z = pivot_direction(tn, &piv, k);
                    let zsq = z.dot(&z);
                    parl = parl.max(par).max(par - pivk / zsq);
                    if paru - parl <= F::epsilon() * (F::one() + paru) {
                        // The bracket has collapsed onto -lambda_min with g orthogonal to the
                        // eigenspace; step along the eigendirection to the boundary.
                        let znorm = zsq.sqrt();
                        let sign = if gh.dot(&z) > F::zero() {
                            -F::one()
                        } else {
                            F::one()
                        };
                        let y = z.mapv(|x| sign * radius * x / znorm);
                        return TrustRegionStep {
                            step: tri.back_transform(&y),
                            crvmin: F::zero(),
                        };
                    }
                    par = next_par(parl, paru);
                }
                Ok(piv) => {
                    let y = solve_tridiag(&gh, tn, &piv);
                    let dnorm = linalg::norm(y.view());
                    if !dnorm.is_finite() {
                        return zero;
                    }
                    match best {
                        Some((b, _)) if dnorm <= b => {}
                        _ => best = Some((dnorm, y.clone())),
                    }

                    if par == F::zero() && interior_possible && dnorm <= radius {
                        // Interior Newton step; the Hessian is positive definite.
                        let crvmin = least_eigenvalue(td, tn);
                        return TrustRegionStep {
                            step: tri.back_transform(&y),
                            crvmin: crvmin.max(F::zero()),
                        };
                    }
                    if (dnorm - radius).abs() <= self.tol * radius {
                        return TrustRegionStep {
                            step: tri.back_transform(&y),
                            crvmin: F::zero(),
                        };
                    }

                    if dnorm < radius {
                        paru = par;
                        // Possible hard case: complete the step with an approximate
                        // eigendirection if that already achieves the required accuracy.
                        let (k, _) = piv
                            .iter()
                            .enumerate()
                            .fold((0, piv[0]), |acc, (i, &p)| if p < acc.1 { (i, p) } else { acc });
                        let z = pivot_direction(tn, &piv, k);
                        let t = tridiag_mul(td, tn, &z, par);
                        let wwsq = z.dot(&t);
                        let yz = y.dot(&z);
                        let zz = z.dot(&z);
                        let yy = y.dot(&y);
                        let radicand = yz * yz + zz * (radius * radius - yy);
                        if radicand >= F::zero() && zz > F::zero() {
                            let root = radicand.sqrt();
                            let g1 = (-yz + root) / zz;
                            let g2 = (-yz - root) / zz;
                            let q1 = section_value(&gh, td, tn, &y, &z, g1);
                            let q2 = section_value(&gh, td, tn, &y, &z, g2);
                            let (gamma, _) = if q1 <= q2 { (g1, q1) } else { (g2, q2) };
                            let wsq = -gh.dot(&y);
                            if gamma * gamma * wwsq
                                <= self.tol * (wsq + par * radius * radius)
                            {
                                let mut ynew = y.clone();
                                for i in 0..n {
                                    ynew[i] = ynew[i] + gamma * z[i];
                                }
                                return TrustRegionStep {
                                    step: tri.back_transform(&ynew),
                                    crvmin: F::zero(),
                                };
                            }
                        }
                        par = newton_par(&y, tn, &piv, dnorm, radius, par, parl, paru);
                    } else {
                        parl = par;
                        par = newton_par(&y, tn, &piv, dnorm, radius, par, parl, paru);
                    }
                }
            }
        }

        // Iteration cap: fall back to the best iterate clipped to the radius.
        match best {
            Some((dnorm, y)) => {
                let y = if dnorm > radius {
                    y.mapv(|x| x * radius / dnorm)
                } else {
                    y
                };
                TrustRegionStep {
                    step: tri.back_transform(&y),
                    crvmin: F::zero(),
                }
            }
            None => zero,
        }
    }
}

impl<F: LincoaFloat> Default for MoreSorensen<F> {
    fn default() -> Self {
        MoreSorensen::new()
    }
}

fn solve_1d<F: LincoaFloat>(g: F, h: F, radius: F) -> TrustRegionStep<F> {
    let (step, crvmin) = if h > F::zero() && (g / h).abs() <= radius {
        (-g / h, h)
    } else if g == F::zero() {
        if h >= F::zero() {
            (F::zero(), h)
        } else {
            (radius, F::zero())
        }
    } else {
        (-g.signum() * radius, F::zero())
    };
    TrustRegionStep {
        step: Array1::from(vec![step]),
        crvmin,
    }
}

/// Attempts the `L D L'` factorization of `T + par I`. On success the pivots are returned; on a
/// nonpositive pivot the failing index, the failing pivot and the pivots computed so far come
/// back instead.
#[allow(clippy::type_complexity)]
fn factor<F: LincoaFloat>(
    td: &Array1<F>,
    tn: &Array1<F>,
    par: F,
) -> Result<Array1<F>, (usize, F, Array1<F>)> {
    let n = td.len();
    let mut piv = Array1::<F>::zeros(n);
    for i in 0..n {
        let mut p = td[i] + par;
        if i > 0 {
            p = p - tn[i - 1] * tn[i - 1] / piv[i - 1];
        }
        if p <= F::epsilon() * (td[i].abs() + par + F::one()) {
            return Err((i, p, piv));
        }
        piv[i] = p;
    }
    Ok(piv)
}

/// Direction associated with the pivot at index `k`: unit at `k`, back-substituted above,
/// zero below.
fn pivot_direction<F: LincoaFloat>(tn: &Array1<F>, piv: &Array1<F>, k: usize) -> Array1<F> {
    let n = tn.len() + 1;
    let mut z = Array1::<F>::zeros(n);
    z[k] = F::one();
    for i in (0..k).rev() {
        z[i] = -tn[i] * z[i + 1] / piv[i];
    }
    z
}

/// Solves `(T + par I) y = -gh` given the pivots of the factorization.
fn solve_tridiag<F: LincoaFloat>(gh: &Array1<F>, tn: &Array1<F>, piv: &Array1<F>) -> Array1<F> {
    let n = gh.len();
    let mut z = Array1::<F>::zeros(n);
    z[0] = -gh[0];
    for i in 1..n {
        z[i] = -gh[i] - tn[i - 1] / piv[i - 1] * z[i - 1];
    }
    let mut y = Array1::<F>::zeros(n);
    y[n - 1] = z[n - 1] / piv[n - 1];
    for i in (0..n - 1).rev() {
        y[i] = (z[i] - tn[i] * y[i + 1]) / piv[i];
    }
    y
}

/// Computes `(T + par I) v`.
fn tridiag_mul<F: LincoaFloat>(td: &Array1<F>, tn: &Array1<F>, v: &Array1<F>, par: F) -> Array1<F> {
    let n = v.len();
    let mut out = Array1::<F>::zeros(n);
    for i in 0..n {
        let mut s = (td[i] + par) * v[i];
        if i > 0 {
            s = s + tn[i - 1] * v[i - 1];
        }
        if i + 1 < n {
            s = s + tn[i] * v[i + 1];
        }
        out[i] = s;
    }
    out
}

/// Model value `gh'v + v'Tv/2` at `v = y + gamma z`.
fn section_value<F: LincoaFloat>(
    gh: &Array1<F>,
    td: &Array1<F>,
    tn: &Array1<F>,
    y: &Array1<F>,
    z: &Array1<F>,
    gamma: F,
) -> F {
    let n = y.len();
    let mut v = Array1::<F>::zeros(n);
    for i in 0..n {
        v[i] = y[i] + gamma * z[i];
    }
    let tv = tridiag_mul(td, tn, &v, F::zero());
    gh.dot(&v) + float!(0.5) * v.dot(&tv)
}

/// Safeguarded interior point of the bracket.
fn next_par<F: LincoaFloat>(parl: F, paru: F) -> F {
    (parl * paru).sqrt().max(parl + float!(0.01) * (paru - parl))
}

/// One Newton step on the secular equation, safeguarded into the bracket.
fn newton_par<F: LincoaFloat>(
    y: &Array1<F>,
    tn: &Array1<F>,
    piv: &Array1<F>,
    dnorm: F,
    radius: F,
    par: F,
    parl: F,
    paru: F,
) -> F {
    let n = y.len();
    // w = R^-T y for the Cholesky factor R of T + par I.
    let mut w = Array1::<F>::zeros(n);
    w[0] = y[0] / piv[0].sqrt();
    for i in 1..n {
        w[i] = (y[i] - tn[i - 1] / piv[i - 1].sqrt() * w[i - 1]) / piv[i].sqrt();
    }
    let wsq = w.dot(&w);
    let candidate = if wsq > F::zero() {
        par + dnorm * dnorm / wsq * (dnorm - radius) / radius
    } else {
        par
    };
    if candidate.is_finite() && candidate > parl && candidate < paru {
        candidate
    } else {
        next_par(parl, paru)
    }
}

/// Least eigenvalue of the tridiagonal matrix by bisection on the inertia.
fn least_eigenvalue<F: LincoaFloat>(td: &Array1<F>, tn: &Array1<F>) -> F {
    let n = td.len();
    let mut lo = td[0];
    let mut hi = td[0];
    for i in 0..n {
        let mut r = F::zero();
        if i > 0 {
            r = r + tn[i - 1].abs();
        }
        if i < n - 1 {
            r = r + tn[i].abs();
        }
        lo = lo.min(td[i] - r);
        hi = hi.min(td[i]);
    }
    let neg_count = |sigma: F| -> usize {
        let mut count = 0;
        let mut p = F::one();
        for i in 0..n {
            let mut v = td[i] - sigma;
            if i > 0 {
                v = v - tn[i - 1] * tn[i - 1] / p;
            }
            if v == F::zero() {
                v = F::epsilon() * (td[i].abs() + F::one());
            }
            if v < F::zero() {
                count += 1;
            }
            p = v;
        }
        count
    };
    for _ in 0..64 {
        let mid = float!(0.5) * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if neg_count(mid) == 0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    float!(0.5) * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_trait_impl;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn model_value(g: &Array1<f64>, h: &Array2<f64>, d: &Array1<f64>) -> f64 {
        let n = g.len();
        let mut v = g.dot(d);
        for i in 0..n {
            for j in 0..n {
                v += 0.5 * d[i] * h[[i, j]] * d[j];
            }
        }
        v
    }

    test_trait_impl!(more_sorensen, MoreSorensen<f64>);

    #[test]
    fn test_with_tolerance() {
        assert!(MoreSorensen::<f64>::new().with_tolerance(0.1).is_ok());
        assert!(MoreSorensen::<f64>::new().with_tolerance(0.0).is_err());
        assert!(MoreSorensen::<f64>::new().with_tolerance(1.0).is_err());
    }

    #[test]
    fn test_interior_newton_step() {
        let g = array![-2.0, -4.0];
        let mut h = Array2::<f64>::zeros((2, 2));
        h[[0, 0]] = 2.0;
        h[[1, 1]] = 4.0;
        let sol = MoreSorensen::new().solve(&g, &h, 3.0);
        assert_relative_eq!(sol.step[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(sol.step[1], 1.0, epsilon = 1e-10);
        // crvmin is the least eigenvalue of H.
        assert_relative_eq!(sol.crvmin, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_boundary_solution() {
        let g = array![-2.0, -4.0];
        let mut h = Array2::<f64>::zeros((2, 2));
        h[[0, 0]] = 2.0;
        h[[1, 1]] = 4.0;
        let radius = 0.5;
        let sol = MoreSorensen::new().solve(&g, &h, radius);
        let snorm = sol.step.dot(&sol.step).sqrt();
        assert!(snorm <= radius * (1.0 + 1e-9));
        assert!(snorm >= radius * 0.95);
        assert_eq!(sol.crvmin, 0.0);
        // The achieved reduction must be close to the best possible one; compare against a
        // dense sweep of boundary directions.
        let q = model_value(&g, &h, &sol.step);
        assert!(q < 0.0);
        for k in 0..64 {
            let t = 2.0 * std::f64::consts::PI * (k as f64) / 64.0;
            let d = array![radius * t.cos(), radius * t.sin()];
            assert!(q <= model_value(&g, &h, &d) + 0.05 * q.abs());
        }
    }

    #[test]
    fn test_indefinite_hessian() {
        let g = array![1.0, 0.5];
        let mut h = Array2::<f64>::zeros((2, 2));
        h[[0, 0]] = 1.0;
        h[[1, 1]] = -2.0;
        let radius = 1.0;
        let sol = MoreSorensen::new().solve(&g, &h, radius);
        let snorm = sol.step.dot(&sol.step).sqrt();
        // Negative curvature forces the solution to the boundary.
        assert!(snorm >= radius * 0.95 && snorm <= radius * (1.0 + 1e-9));
        assert_eq!(sol.crvmin, 0.0);
        let q = model_value(&g, &h, &sol.step);
        for k in 0..64 {
            let t = 2.0 * std::f64::consts::PI * (k as f64) / 64.0;
            let d = array![radius * t.cos(), radius * t.sin()];
            assert!(q <= model_value(&g, &h, &d) + 0.05 * q.abs());
        }
    }

    #[test]
    fn test_hard_case() {
        // g is orthogonal to the eigenvector of the least eigenvalue.
        let g = array![1.0, 0.0];
        let mut h = Array2::<f64>::zeros((2, 2));
        h[[0, 0]] = 1.0;
        h[[1, 1]] = -2.0;
        let radius = 1.0;
        let sol = MoreSorensen::new().solve(&g, &h, radius);
        let snorm = sol.step.dot(&sol.step).sqrt();
        assert!(snorm >= radius * 0.95 && snorm <= radius * (1.0 + 1e-9));
        let q = model_value(&g, &h, &sol.step);
        // The optimum is at d = (-1/3, +-sqrt(1 - 1/9)) with value -7/6.
        assert!(q <= -1.1, "q = {}", q);
    }

    #[test]
    fn test_zero_hessian_takes_gradient_step() {
        let g = array![3.0, 4.0];
        let h = Array2::<f64>::zeros((2, 2));
        let sol = MoreSorensen::new().solve(&g, &h, 2.0);
        assert_relative_eq!(sol.step[0], -1.2, epsilon = 1e-12);
        assert_relative_eq!(sol.step[1], -1.6, epsilon = 1e-12);
        assert_eq!(sol.crvmin, 0.0);
    }

    #[test]
    fn test_one_dimensional() {
        let h = Array2::from_elem((1, 1), 2.0);
        let sol = MoreSorensen::new().solve(&array![-1.0], &h, 5.0);
        assert_relative_eq!(sol.step[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(sol.crvmin, 2.0, epsilon = 1e-12);

        let h = Array2::from_elem((1, 1), -1.0);
        let sol = MoreSorensen::new().solve(&array![1.0], &h, 5.0);
        assert_relative_eq!(sol.step[0], -5.0, epsilon = 1e-12);
        assert_eq!(sol.crvmin, 0.0);
    }

    #[test]
    fn test_non_finite_input_gives_zero_step() {
        let g = array![f64::NAN, 1.0];
        let h = Array2::<f64>::eye(2);
        let sol = MoreSorensen::new().solve(&g, &h, 1.0);
        assert!(sol.step.iter().all(|&s| s == 0.0));
        assert_eq!(sol.crvmin, 0.0);

        let sol = MoreSorensen::new().solve(&array![1.0, 1.0], &h, f64::NAN);
        assert!(sol.step.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_larger_random_like_problem() {
        // A fixed 5x5 symmetric matrix with mixed curvature.
        let h = array![
            [2.0, 0.5, 0.0, 0.3, -0.2],
            [0.5, 1.5, -0.4, 0.0, 0.1],
            [0.0, -0.4, -1.0, 0.2, 0.0],
            [0.3, 0.0, 0.2, 3.0, -0.5],
            [-0.2, 0.1, 0.0, -0.5, 0.5]
        ];
        let g = array![1.0, -2.0, 0.5, 0.0, 1.5];
        let radius = 1.3;
        let sol = MoreSorensen::<f64>::new().solve(&g, &h, radius);
        let snorm = sol.step.dot(&sol.step).sqrt();
        assert!(snorm <= radius * (1.0 + 1e-9));
        // Indefinite Hessian, so the solution sits on the boundary and reduces the model.
        assert!(snorm >= radius * 0.9);
        assert!(model_value(&g, &h, &sol.step) < 0.0);
    }
}
