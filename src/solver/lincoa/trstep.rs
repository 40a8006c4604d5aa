// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Trust-region subproblem with linear inequality constraints.
//!
//! Minimizes the quadratic model inside the trust region intersected with the feasible
//! polyhedron, by truncated conjugate gradients restricted to the null space of the active
//! constraints. A constraint whose residual runs out during the line search joins the active
//! set and the iteration restarts in the smaller null space; active constraints with negative
//! multiplier estimates are released. When the trust-region boundary is reached, the step is
//! bent along the boundary while it keeps reducing the model.

use crate::core::LincoaFloat;
use crate::linalg;
use crate::solver::lincoa::activeset::ActiveSet;
use crate::solver::lincoa::model::InterpolationModel;
use ndarray::{Array1, Array2};

/// Result of the constrained trust-region subproblem.
pub(crate) struct ConstrainedStep<F> {
    /// The step, relative to the best point
    pub(crate) step: Array1<F>,
    /// Its Euclidean norm
    pub(crate) snorm: F,
    /// Number of active-set changes
    pub(crate) ngetact: usize,
}

/// Computes a step reducing the model inside the trust region of radius `delta` while keeping
/// all linear constraints satisfied, starting from the best point.
///
/// `rescon` carries the sign-encoded constraint residuals at the best point: a nonnegative entry
/// is the exact residual, a negative entry guarantees a residual of at least `delta` so that the
/// constraint can be ignored here. The active-set factorization is carried across calls.
pub(crate) fn constrained_trust_step<F: LincoaFloat>(
    model: &InterpolationModel<F>,
    amat: &Array2<F>,
    rescon: &Array1<F>,
    delta: F,
    active: &mut ActiveSet<F>,
) -> ConstrainedStep<F> {
    let n = model.n;
    let m = amat.ncols();
    let tiny = F::epsilon();

    let mut step = Array1::<F>::zeros(n);
    if !linalg::all_finite(model.gopt.iter()) {
        return ConstrainedStep {
            step,
            snorm: F::zero(),
            ngetact: 0,
        };
    }

    // Residual budget from the best point for every constraint which can be reached within the
    // trust region; `None` marks the unreachable ones.
    let mut budget: Vec<Option<F>> = (0..m)
        .map(|j| {
            let r = rescon[j];
            if r < F::zero() || r >= delta {
                None
            } else {
                Some(r)
            }
        })
        .collect();

    // Release active constraints which are no longer tight at the best point.
    let tol_act = delta * F::epsilon().sqrt();
    let mut pos = 0;
    while pos < active.nact() {
        let j = active.indices()[pos];
        let r = rescon[j].abs();
        if r > tol_act {
            active.remove(pos);
        } else {
            pos += 1;
        }
    }

    let mut gcur = model.gopt.clone();
    let gnorm0 = linalg::norm(model.gopt.view());
    let gtol = F::epsilon() * float!(100.0) * (F::one() + gnorm0);
    let mut ngetact = 0usize;
    let mut total_red = F::zero();
    let mut hit_boundary = false;
    let maxiter = 10 * (n + m) + 10;
    let mut iters = 0usize;

    'outer: loop {
        let r0 = active.project_null(&gcur);
        let rnorm = linalg::norm(r0.view());
        if rnorm <= gtol {
            if !release_one(active, &gcur, &mut ngetact) {
                break 'outer;
            }
            continue 'outer;
        }

        let mut d = r0.mapv(|x| -x);
        let mut rtr = rnorm * rnorm;

        loop {
            iters += 1;
            if iters > maxiter {
                break 'outer;
            }
            let hd = model.hess_vec(&d);
            let dhd = d.dot(&hd);
            let dd = d.dot(&d);
            if dd <= tiny {
                break 'outer;
            }

            let sd = step.dot(&d);
            let ss = step.dot(&step);
            let radicand = sd * sd + dd * (delta * delta - ss);
            let alpha_delta = if radicand > F::zero() {
                (-sd + radicand.sqrt()) / dd
            } else {
                F::zero()
            };

            let mut alpha_line = F::infinity();
            let mut jhit: Option<usize> = None;
            for j in 0..m {
                if active.contains(j) {
                    continue;
                }
                if let Some(b) = budget[j] {
                    let ad = amat.column(j).dot(&d);
                    if ad > tiny {
                        let remaining = b - amat.column(j).dot(&step);
                        let a = (remaining / ad).max(F::zero());
                        if a < alpha_line {
                            alpha_line = a;
                            jhit = Some(j);
                        }
                    }
                }
            }

            let alpha_q = if dhd > tiny {
                rtr / dhd
            } else {
                F::infinity()
            };
            let alpha = alpha_q.min(alpha_delta).min(alpha_line);
            if !alpha.is_finite() {
                break 'outer;
            }

            if alpha > F::zero() {
                for i in 0..n {
                    step[i] = step[i] + alpha * d[i];
                }
                for i in 0..n {
                    gcur[i] = gcur[i] + alpha * hd[i];
                }
                let red = alpha * rtr - float!(0.5) * alpha * alpha * dhd;
                if red > F::zero() {
                    total_red = total_red + red;
                }
            }

            if alpha >= alpha_delta {
                hit_boundary = true;
                break 'outer;
            }
            if let Some(j) = jhit {
                if alpha >= alpha_line {
                    // The step has reached the boundary of constraint j.
                    ngetact += 1;
                    if !active.add(j, amat.column(j)) {
                        // Numerically dependent on the active gradients; the projected
                        // directions keep its residual unchanged, so it can be dropped from the
                        // line searches.
                        budget[j] = None;
                    }
                    continue 'outer;
                }
            }
            if alpha <= F::zero() {
                break 'outer;
            }

            // Plain conjugate-gradient step.
            let rnew = active.project_null(&gcur);
            let rtr_new = rnew.dot(&rnew);
            if rtr_new.sqrt() <= gtol {
                if release_one(active, &gcur, &mut ngetact) {
                    continue 'outer;
                }
                break 'outer;
            }
            let red = alpha * rtr - float!(0.5) * alpha * alpha * dhd;
            if red <= float!(0.01) * total_red {
                if release_one(active, &gcur, &mut ngetact) {
                    continue 'outer;
                }
                break 'outer;
            }
            let beta = rtr_new / rtr;
            for i in 0..n {
                d[i] = -rnew[i] + beta * d[i];
            }
            rtr = rtr_new;
        }
    }

    // Bend the step along the trust-region boundary while the model keeps decreasing.
    if hit_boundary {
        bend_on_boundary(
            model, amat, rescon, delta, active, &mut step, &mut gcur, &mut ngetact, &mut iters,
            maxiter,
        );
    }

    let mut snorm = linalg::norm(step.view());
    if snorm > delta && snorm > F::zero() {
        let scale = delta / snorm;
        for i in 0..n {
            step[i] = step[i] * scale;
        }
        snorm = delta;
    }
    if !linalg::all_finite(step.iter()) {
        step.fill(F::zero());
        snorm = F::zero();
    }

    ConstrainedStep {
        step,
        snorm,
        ngetact,
    }
}

/// Releases the active constraint with the most negative multiplier estimate, if any.
fn release_one<F: LincoaFloat>(
    active: &mut ActiveSet<F>,
    gcur: &Array1<F>,
    ngetact: &mut usize,
) -> bool {
    if active.nact() == 0 {
        return false;
    }
    let neg_g = gcur.mapv(|x| -x);
    let lam = active.multipliers(&neg_g);
    let tol = F::epsilon().sqrt() * (F::one() + linalg::norm(gcur.view()));
    let mut worst: Option<(usize, F)> = None;
    for (pos, &l) in lam.iter().enumerate() {
        if l < -tol {
            match worst {
                Some((_, w)) if l >= w => {}
                _ => worst = Some((pos, l)),
            }
        }
    }
    if let Some((pos, _)) = worst {
        active.remove(pos);
        *ngetact += 1;
        true
    } else {
        false
    }
}

/// Arc search on the sphere `|step| = delta`: rotates the step towards the projected descent
/// direction while all reachable constraints stay satisfied.
#[allow(clippy::too_many_arguments)]
fn bend_on_boundary<F: LincoaFloat>(
    model: &InterpolationModel<F>,
    amat: &Array2<F>,
    rescon: &Array1<F>,
    delta: F,
    active: &mut ActiveSet<F>,
    step: &mut Array1<F>,
    gcur: &mut Array1<F>,
    ngetact: &mut usize,
    iters: &mut usize,
    maxiter: usize,
) {
    let n = model.n;
    let m = amat.ncols();
    let feas_tol = delta * F::epsilon().sqrt();
    let nsample = 16usize;

    for _ in 0..10 {
        *iters += 1;
        if *iters > maxiter {
            return;
        }
        let snorm = linalg::norm(step.view());
        if snorm <= F::zero() {
            return;
        }

        let p = active.project_null(gcur).mapv(|x| -x);
        // Tangential component of the projected descent direction.
        let shat = step.mapv(|x| x / snorm);
        let radial = p.dot(&shat);
        let mut t = Array1::<F>::zeros(n);
        for i in 0..n {
            t[i] = p[i] - radial * shat[i];
        }
        let tnorm = linalg::norm(t.view());
        let gscale = F::one() + linalg::norm(gcur.view());
        if tnorm <= F::epsilon().sqrt() * gscale {
            if release_one(active, gcur, ngetact) {
                continue;
            }
            return;
        }
        for i in 0..n {
            t[i] = t[i] / tnorm;
        }

        let qcur = model.eval_quad(step);
        let theta_max = F::FRAC_PI_4();
        let mut best: Option<(F, Array1<F>)> = None;
        for s in 1..=nsample {
            let theta = theta_max * float!(s as f64) / float!(nsample as f64);
            let (sin, cos) = theta.sin_cos();
            let mut cand = Array1::<F>::zeros(n);
            for i in 0..n {
                cand[i] = cos * step[i] + delta * sin * t[i];
            }
            let mut feasible = true;
            for j in 0..m {
                let r = rescon[j];
                if r < F::zero() {
                    continue;
                }
                if amat.column(j).dot(&cand) > r + feas_tol {
                    feasible = false;
                    break;
                }
            }
            if !feasible {
                break;
            }
            let q = model.eval_quad(&cand);
            match best {
                Some((bq, _)) if q >= bq => {}
                _ => best = Some((q, cand)),
            }
        }

        let (qbest, cand) = match best {
            Some(b) => b,
            None => return,
        };
        if qbest >= qcur - F::epsilon() * (F::one() + qcur.abs()) {
            return;
        }
        *step = cand;
        let hs = model.hess_vec(step);
        for i in 0..n {
            gcur[i] = model.gopt[i] + hs[i];
        }
        // A rotation which lands on a new constraint boundary makes it active.
        for j in 0..m {
            let r = rescon[j];
            if r < F::zero() || active.contains(j) {
                continue;
            }
            if amat.column(j).dot(step) >= r - feas_tol {
                *ngetact += 1;
                let _ = active.add(j, amat.column(j));
            }
        }
    }
}
