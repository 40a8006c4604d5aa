// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Quadratic interpolation model over a moving sample set.
//!
//! The model interpolates the objective on `npt` sample points stored as offsets from a base
//! point. Its Hessian is split into an explicit symmetric part `HQ` and an implicit part
//! `sum_k PQ[k] * x_k x_k^T` over the sample points. The inverse of the interpolation KKT matrix
//! is kept in factored form `{BMAT, ZMAT, idz}`: the leading `npt x npt` block is
//! `ZMAT * D * ZMAT^T` where `D` is a sign diagonal with `-1` in the first `idz` columns, and
//! `BMAT` holds the trailing `n` block rows. The factorization is carried across point
//! replacements by a rank-two update and across base shifts by a closed-form rewrite, so no
//! matrix is ever refactored from scratch.

use crate::core::{Error, LincoaFloat};
use crate::linalg;
use ndarray::{Array1, Array2};
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Interpolation set, quadratic model and factored inverse KKT matrix.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub(crate) struct InterpolationModel<F> {
    /// Problem dimension
    pub(crate) n: usize,
    /// Number of interpolation points
    pub(crate) npt: usize,
    /// Base point, in absolute coordinates
    pub(crate) xbase: Array1<F>,
    /// Sample points as offsets from `xbase`, one per column
    pub(crate) xpt: Array2<F>,
    /// Objective values at the sample points
    pub(crate) fval: Array1<F>,
    /// Column index of the current best sample
    pub(crate) kopt: usize,
    /// Trailing `n` block rows of the inverse KKT matrix, `n x (npt + n)`
    pub(crate) bmat: Array2<F>,
    /// Factor of the leading block of the inverse KKT matrix, `npt x (npt - n - 1)`
    pub(crate) zmat: Array2<F>,
    /// Number of leading `zmat` columns carrying a negative sign
    pub(crate) idz: usize,
    /// Explicit part of the model Hessian
    pub(crate) hq: Array2<F>,
    /// Coefficients of the implicit part of the model Hessian
    pub(crate) pq: Array1<F>,
    /// Model gradient at the current best sample
    pub(crate) gopt: Array1<F>,
}

impl<F: LincoaFloat> InterpolationModel<F> {
    pub(crate) fn new(n: usize, npt: usize) -> Self {
        InterpolationModel {
            n,
            npt,
            xbase: Array1::zeros(n),
            xpt: Array2::zeros((n, npt)),
            fval: Array1::zeros(npt),
            kopt: 0,
            bmat: Array2::zeros((n, npt + n)),
            zmat: Array2::zeros((npt, npt - n - 1)),
            idz: 0,
            hq: Array2::zeros((n, n)),
            pq: Array1::zeros(npt),
            gopt: Array1::zeros(n),
        }
    }

    /// Offset of the current best sample from the base point.
    pub(crate) fn xopt(&self) -> Array1<F> {
        self.xpt.column(self.kopt).to_owned()
    }

    /// Objective value at the current best sample.
    pub(crate) fn fopt(&self) -> F {
        self.fval[self.kopt]
    }

    /// Builds the initial sample geometry and the matching inverse factorization.
    ///
    /// The first point sits at the base. Point `j + 1` is offset by `signs[j] * rhobeg` along
    /// coordinate `j`; if `npt` allows a second point per coordinate it carries the opposite
    /// offset. Any further points combine two coordinate offsets. The inverse KKT matrix of this
    /// structured set is known in closed form, which is what the `bmat`/`zmat` entries below
    /// spell out.
    pub(crate) fn initialize_geometry(&mut self, rhobeg: F, signs: &[F]) {
        let n = self.n;
        let npt = self.npt;
        let half = float!(0.5);
        let sqrt2 = float!(2.0).sqrt();

        self.xbase.fill(F::zero());
        self.xpt.fill(F::zero());
        self.bmat.fill(F::zero());
        self.zmat.fill(F::zero());
        self.hq.fill(F::zero());
        self.pq.fill(F::zero());
        self.gopt.fill(F::zero());
        self.idz = 0;
        self.kopt = 0;

        // Coordinate offsets.
        for j in 0..n {
            let a = signs[j] * rhobeg;
            self.xpt[[j, j + 1]] = a;
        }
        let npairs = npt.saturating_sub(n + 1).min(n);
        for j in 0..npairs {
            let a = signs[j] * rhobeg;
            self.xpt[[j, n + 1 + j]] = -a;
        }
        for k in 2 * n + 1..npt {
            let (p, q) = pair_coordinates(n, k);
            self.xpt[[p, k]] = signs[p] * rhobeg;
            self.xpt[[q, k]] = signs[q] * rhobeg;
        }

        // Coordinates with two offset points: three collinear samples determine the gradient
        // and the curvature along the coordinate.
        for j in 0..npairs {
            let a = signs[j] * rhobeg;
            let b = -a;
            let p = j + 1;
            let q = n + 1 + j;
            self.bmat[[j, p]] = -b / (a * (a - b));
            self.bmat[[j, q]] = a / (b * (a - b));
            let c = sqrt2 / (a * b * (a - b)).abs();
            self.zmat[[0, j]] = c * (a - b);
            self.zmat[[p, j]] = c * b;
            self.zmat[[q, j]] = -c * a;
        }
        // Coordinates with a single offset point: the model is linear along them.
        for j in npairs..n {
            let a = signs[j] * rhobeg;
            self.bmat[[j, 0]] = -F::one() / a;
            self.bmat[[j, j + 1]] = F::one() / a;
            self.bmat[[j, npt + j]] = -half * a * a;
        }
        // Two-coordinate points fix one off-diagonal curvature each.
        let recip = F::one() / (rhobeg * rhobeg);
        for k in 2 * n + 1..npt {
            let (p, q) = pair_coordinates(n, k);
            let zcol = k - n - 1;
            self.zmat[[0, zcol]] = recip;
            self.zmat[[k, zcol]] = recip;
            self.zmat[[p + 1, zcol]] = -recip;
            self.zmat[[q + 1, zcol]] = -recip;
        }
    }

    /// Replaces the model by the minimum-Frobenius-norm interpolant of the current values.
    ///
    /// Also used right after initialization, where it coincides with the classical
    /// difference-formula model of the structured initial set.
    pub(crate) fn build_least_norm_quadratic(&mut self) {
        let npt = self.npt;
        let n = self.n;
        let fopt = self.fval[self.kopt];
        let w: Array1<F> = Array1::from_iter(self.fval.iter().map(|&f| f - fopt));

        self.hq.fill(F::zero());
        self.pq = self.omega_mul(&w);

        let xopt = self.xopt();
        for i in 0..n {
            let mut g = F::zero();
            for k in 0..npt {
                g = g + self.bmat[[i, k]] * w[k];
            }
            self.gopt[i] = g;
        }
        for k in 0..npt {
            let t = self.pq[k] * self.xpt.column(k).dot(&xopt);
            for i in 0..n {
                self.gopt[i] = self.gopt[i] + t * self.xpt[[i, k]];
            }
        }
    }

    /// Applies the sign-weighted factor product `ZMAT D ZMAT^T` to `w`.
    fn omega_mul(&self, w: &Array1<F>) -> Array1<F> {
        let npt = self.npt;
        let nz = self.zmat.ncols();
        let mut out = Array1::<F>::zeros(npt);
        for col in 0..nz {
            let mut s = F::zero();
            for k in 0..npt {
                s = s + self.zmat[[k, col]] * w[k];
            }
            if col < self.idz {
                s = -s;
            }
            for k in 0..npt {
                out[k] = out[k] + s * self.zmat[[k, col]];
            }
        }
        out
    }

    /// Change of the model along `d`, measured from the best point:
    /// `Q(xopt + d) - Q(xopt) = gopt'd + d'Hd/2`.
    pub(crate) fn eval_quad(&self, d: &Array1<F>) -> F {
        let half = float!(0.5);
        let mut val = self.gopt.dot(d);
        for i in 0..self.n {
            let mut s = F::zero();
            for j in 0..self.n {
                s = s + self.hq[[i, j]] * d[j];
            }
            val = val + half * d[i] * s;
        }
        for k in 0..self.npt {
            let t = self.xpt.column(k).dot(d);
            val = val + half * self.pq[k] * t * t;
        }
        val
    }

    /// Product of the model Hessian with `d`.
    pub(crate) fn hess_vec(&self, d: &Array1<F>) -> Array1<F> {
        let mut out = Array1::<F>::zeros(self.n);
        for i in 0..self.n {
            let mut s = F::zero();
            for j in 0..self.n {
                s = s + self.hq[[i, j]] * d[j];
            }
            out[i] = s;
        }
        for k in 0..self.npt {
            let t = self.pq[k] * self.xpt.column(k).dot(d);
            for i in 0..self.n {
                out[i] = out[i] + t * self.xpt[[i, k]];
            }
        }
        out
    }

    /// Implicit-Hessian coefficients of the `knew`-th Lagrange function.
    pub(crate) fn lagrange_coeff(&self, knew: usize) -> Result<Array1<F>, Error> {
        let npt = self.npt;
        let nz = self.zmat.ncols();
        let mut out = Array1::<F>::zeros(npt);
        for col in 0..nz {
            let mut s = self.zmat[[knew, col]];
            if col < self.idz {
                s = -s;
            }
            for k in 0..npt {
                out[k] = out[k] + s * self.zmat[[k, col]];
            }
        }
        if !linalg::all_finite(out.iter()) {
            return Err(solver_error!(
                ModelCorrupt,
                "Lagrange coefficients are not finite"
            ));
        }
        Ok(out)
    }

    /// Gradient of the `knew`-th Lagrange function at the best point.
    pub(crate) fn lagrange_gradient(&self, knew: usize) -> Result<Array1<F>, Error> {
        let coeff = self.lagrange_coeff(knew)?;
        let xopt = self.xopt();
        let mut g = Array1::<F>::zeros(self.n);
        for i in 0..self.n {
            g[i] = self.bmat[[i, knew]];
        }
        for k in 0..self.npt {
            let t = coeff[k] * self.xpt.column(k).dot(&xopt);
            for i in 0..self.n {
                g[i] = g[i] + t * self.xpt[[i, k]];
            }
        }
        Ok(g)
    }

    /// Lagrange function values at `xopt + step` together with the `beta` quantity of the
    /// rank-two updating formula.
    ///
    /// The returned vector has `npt + n` entries; the trailing `n` drive the update of `bmat`.
    pub(crate) fn vlag_beta(&self, step: &Array1<F>) -> (Array1<F>, F) {
        let n = self.n;
        let npt = self.npt;
        let nz = self.zmat.ncols();
        let half = float!(0.5);
        let xopt = self.xopt();

        let mut vlag = Array1::<F>::zeros(npt + n);
        let mut wcheck = Array1::<F>::zeros(npt);
        for k in 0..npt {
            let suma = self.xpt.column(k).dot(step);
            let sumb = self.xpt.column(k).dot(&xopt);
            wcheck[k] = suma * (half * suma + sumb);
            let mut s = F::zero();
            for j in 0..n {
                s = s + self.bmat[[j, k]] * step[j];
            }
            vlag[k] = s;
        }

        let mut beta = F::zero();
        for col in 0..nz {
            let mut s = F::zero();
            for k in 0..npt {
                s = s + self.zmat[[k, col]] * wcheck[k];
            }
            if col < self.idz {
                beta = beta + s * s;
                s = -s;
            } else {
                beta = beta - s * s;
            }
            for k in 0..npt {
                vlag[k] = vlag[k] + s * self.zmat[[k, col]];
            }
        }

        let mut bsum = F::zero();
        let mut dx = F::zero();
        for j in 0..n {
            let mut s = F::zero();
            for k in 0..npt {
                s = s + wcheck[k] * self.bmat[[j, k]];
            }
            bsum = bsum + s * step[j];
            let jp = npt + j;
            for k in 0..n {
                s = s + self.bmat[[k, jp]] * step[k];
            }
            vlag[jp] = s;
            bsum = bsum + s * step[j];
            dx = dx + step[j] * xopt[j];
        }
        let dsq = step.dot(step);
        let xoptsq = xopt.dot(&xopt);
        beta = dx * dx + dsq * (xoptsq + dx + dx + half * dsq) + beta - bsum;
        vlag[self.kopt] = vlag[self.kopt] + F::one();

        (vlag, beta)
    }

    /// Chooses the sample to be replaced after a trust-region step.
    ///
    /// The score of sample `k` is `|sigma_k * tau_k|` with `tau_k` the Lagrange value from
    /// `vlag` and `sigma_k` the denominator the rank-two update would have; ties are broken by
    /// the larger distance from the best point. The best point itself is never replaced.
    pub(crate) fn select_knew(&self, vlag: &Array1<F>, beta: F) -> Option<usize> {
        let xopt = self.xopt();
        let mut best: Option<(usize, F, F)> = None;
        for k in 0..self.npt {
            if k == self.kopt {
                continue;
            }
            let mut hdiag = F::zero();
            for col in 0..self.zmat.ncols() {
                let z = self.zmat[[k, col]];
                if col < self.idz {
                    hdiag = hdiag - z * z;
                } else {
                    hdiag = hdiag + z * z;
                }
            }
            let tau = vlag[k];
            let sigma = hdiag * beta + tau * tau;
            let score = (sigma * tau).abs();
            let mut dist = F::zero();
            for i in 0..self.n {
                let t = self.xpt[[i, k]] - xopt[i];
                dist = dist + t * t;
            }
            let take = match best {
                None => true,
                Some((_, bscore, bdist)) => score > bscore || (score == bscore && dist > bdist),
            };
            if take {
                best = Some((k, score, dist));
            }
        }
        match best {
            Some((k, score, _)) if score > F::zero() => Some(k),
            _ => None,
        }
    }

    /// Rank-two update of `{bmat, zmat, idz}` for the replacement of point `knew` by
    /// `xopt + step`, where `vlag` and `beta` come from [`vlag_beta`](Self::vlag_beta) for that
    /// step.
    ///
    /// The sign count `idz` is adjusted whenever the sign of the denominator requires moving one
    /// `zmat` column across the boundary of the negative block.
    pub(crate) fn update_factorization(
        &mut self,
        knew: usize,
        vlag: &Array1<F>,
        beta: F,
    ) -> Result<F, Error> {
        let n = self.n;
        let npt = self.npt;
        let nz = self.zmat.ncols();
        let mut vlag = vlag.clone();
        let mut w = Array1::<F>::zeros(npt + n);

        // Rotate the knew-th row of zmat so that at most one column per sign block keeps a
        // nonzero entry there.
        let mut jl = 0usize;
        for j in 1..nz {
            if self.idz > 0 && j == self.idz {
                jl = self.idz;
            } else if self.zmat[[knew, j]] != F::zero() {
                let temp = self.zmat[[knew, jl]].hypot(self.zmat[[knew, j]]);
                let ca = self.zmat[[knew, jl]] / temp;
                let sa = self.zmat[[knew, j]] / temp;
                for i in 0..npt {
                    let t = ca * self.zmat[[i, jl]] + sa * self.zmat[[i, j]];
                    self.zmat[[i, j]] = ca * self.zmat[[i, j]] - sa * self.zmat[[i, jl]];
                    self.zmat[[i, jl]] = t;
                }
            }
        }

        // First npt components of the knew-th column of the inverse, and the parameters of the
        // updating formula.
        let mut tempa = self.zmat[[knew, 0]];
        if self.idz >= 1 {
            tempa = -tempa;
        }
        let tempb = if jl > 0 { self.zmat[[knew, jl]] } else { F::zero() };
        for i in 0..npt {
            let mut s = tempa * self.zmat[[i, 0]];
            if jl > 0 {
                s = s + tempb * self.zmat[[i, jl]];
            }
            w[i] = s;
        }
        let alpha = w[knew];
        let tau = vlag[knew];
        let denom = alpha * beta + tau * tau;
        let scale = (alpha * beta).abs().max(tau * tau);
        if !denom.is_finite() || denom.abs() <= F::epsilon() * scale {
            return Err(solver_error!(
                DegenerateDenominator,
                "denominator of the rank-two update has collapsed"
            ));
        }
        vlag[knew] = vlag[knew] - F::one();

        // Complete the updating of zmat.
        let mut iflag = false;
        if jl == 0 {
            let temp = denom.abs().sqrt();
            let tempb = tempa / temp;
            let tempa = tau / temp;
            for i in 0..npt {
                self.zmat[[i, 0]] = tempa * self.zmat[[i, 0]] - tempb * vlag[i];
            }
            if self.idz == 0 && denom < F::zero() {
                self.idz = 1;
            } else if self.idz >= 1 && denom >= F::zero() {
                iflag = true;
            }
        } else {
            let (ja, jb) = if beta >= F::zero() { (jl, 0) } else { (0, jl) };
            let temp = self.zmat[[knew, jb]] / denom;
            let tempa2 = temp * beta;
            let tempb2 = temp * tau;
            let tempz = self.zmat[[knew, ja]];
            let scala = F::one() / (beta.abs() * tempz * tempz + tau * tau).sqrt();
            let scalb = scala * denom.abs().sqrt();
            for i in 0..npt {
                self.zmat[[i, ja]] = scala * (tau * self.zmat[[i, ja]] - tempz * vlag[i]);
                self.zmat[[i, jb]] =
                    scalb * (self.zmat[[i, jb]] - tempa2 * w[i] - tempb2 * vlag[i]);
            }
            if denom <= F::zero() {
                if beta < F::zero() {
                    self.idz += 1;
                } else {
                    iflag = true;
                }
            }
        }
        // One column moves out of the negative block; swap it into the vacated slot.
        if iflag {
            self.idz -= 1;
            for i in 0..npt {
                let t = self.zmat[[i, 0]];
                self.zmat[[i, 0]] = self.zmat[[i, self.idz]];
                self.zmat[[i, self.idz]] = t;
            }
        }

        // Finally, update bmat.
        for j in 0..n {
            let jp = npt + j;
            w[jp] = self.bmat[[j, knew]];
            let tempa3 = (alpha * vlag[jp] - tau * w[jp]) / denom;
            let tempb3 = (-beta * w[jp] - tau * vlag[jp]) / denom;
            for i in 0..=jp {
                self.bmat[[j, i]] = self.bmat[[j, i]] + tempa3 * vlag[i] + tempb3 * w[i];
                if i >= npt {
                    self.bmat[[i - npt, jp]] = self.bmat[[j, i]];
                }
            }
        }
        Ok(denom)
    }

    /// Symmetric Broyden update of the quadratic model for the replacement of point `knew` by
    /// `xnew` with objective value `f`; `diff` is the error of the old model at the new point.
    ///
    /// Must be called after [`update_factorization`](Self::update_factorization), so that the
    /// Lagrange coefficients belong to the new sample set.
    pub(crate) fn replace_point(
        &mut self,
        knew: usize,
        xnew: &Array1<F>,
        f: F,
        diff: F,
    ) -> Result<(), Error> {
        let pqw = self.lagrange_coeff(knew)?;

        // Absorb the implicit contribution of the departing point into the explicit Hessian.
        let old = self.pq[knew];
        if old != F::zero() {
            let xold = self.xpt.column(knew).to_owned();
            linalg::sym_rank1_update(&mut self.hq, old, xold.view());
        }
        self.pq[knew] = F::zero();

        for i in 0..self.n {
            self.xpt[[i, knew]] = xnew[i];
        }
        self.fval[knew] = f;

        for k in 0..self.npt {
            self.pq[k] = self.pq[k] + diff * pqw[k];
        }

        // The model change is diff times the new Lagrange function; its gradient at xopt has a
        // linear piece from bmat and an implicit piece through the sample points.
        let xopt = self.xopt();
        for i in 0..self.n {
            self.gopt[i] = self.gopt[i] + diff * self.bmat[[i, knew]];
        }
        for k in 0..self.npt {
            let t = diff * pqw[k] * self.xpt.column(k).dot(&xopt);
            for i in 0..self.n {
                self.gopt[i] = self.gopt[i] + t * self.xpt[[i, k]];
            }
        }
        Ok(())
    }

    /// Moves the best-point index to `knew`, relocating the stored gradient.
    pub(crate) fn move_best(&mut self, knew: usize) {
        let xold = self.xopt();
        let xnew = self.xpt.column(knew).to_owned();
        let step = &xnew - &xold;
        let hs = self.hess_vec(&step);
        for i in 0..self.n {
            self.gopt[i] = self.gopt[i] + hs[i];
        }
        self.kopt = knew;
    }

    /// Moves the base point to the current best point without changing the interpolant.
    ///
    /// Returns the shift in base-relative coordinates so that callers can adjust quantities
    /// expressed relative to the base (such as constraint right-hand sides).
    ///
    /// The leading block of the inverse is unchanged by a base shift; `bmat` absorbs the whole
    /// rewrite. With `v_k = x_k's - s's/2` and `gamma_k = v_k x_k + (s's/4 - v_k/2) s`, the
    /// block rows gain `Gamma Omega` and the trailing block gains
    /// `B Gamma' + Gamma B' + Gamma Omega Gamma'`.
    pub(crate) fn shift_origin(&mut self) -> Array1<F> {
        let n = self.n;
        let npt = self.npt;
        let nz = self.zmat.ncols();
        let half = float!(0.5);
        let s = self.xopt();
        let sq = s.dot(&s);
        if sq == F::zero() {
            return s;
        }
        let frac = float!(0.25) * sq;

        let mut gamma = Array2::<F>::zeros((n, npt));
        for k in 0..npt {
            let v = self.xpt.column(k).dot(&s) - half * sq;
            for i in 0..n {
                gamma[[i, k]] = v * self.xpt[[i, k]] + (frac - half * v) * s[i];
            }
        }

        // Part independent of zmat.
        for k in 0..npt {
            for i in 0..n {
                let bi = self.bmat[[i, k]];
                let gi = gamma[[i, k]];
                for j in 0..n {
                    self.bmat[[i, npt + j]] =
                        self.bmat[[i, npt + j]] + bi * gamma[[j, k]] + gi * self.bmat[[j, k]];
                }
            }
        }
        // Part depending on zmat.
        for col in 0..nz {
            let mut u = Array1::<F>::zeros(n);
            for k in 0..npt {
                let z = self.zmat[[k, col]];
                for i in 0..n {
                    u[i] = u[i] + z * gamma[[i, k]];
                }
            }
            let sgn = if col < self.idz { -F::one() } else { F::one() };
            for k in 0..npt {
                let t = sgn * self.zmat[[k, col]];
                for i in 0..n {
                    self.bmat[[i, k]] = self.bmat[[i, k]] + t * u[i];
                }
            }
            for i in 0..n {
                let t = sgn * u[i];
                for j in 0..n {
                    self.bmat[[i, npt + j]] = self.bmat[[i, npt + j]] + t * u[j];
                }
            }
        }

        // The implicit Hessian terms change with the points; compensate in hq.
        let sumpq = self.pq.sum();
        let mut wvec = Array1::<F>::zeros(n);
        for j in 0..n {
            let mut t = -half * sumpq * s[j];
            for k in 0..npt {
                t = t + self.pq[k] * self.xpt[[j, k]];
            }
            wvec[j] = t;
        }
        for i in 0..n {
            for j in 0..n {
                self.hq[[i, j]] = self.hq[[i, j]] + wvec[i] * s[j] + s[i] * wvec[j];
            }
        }

        for k in 0..npt {
            for i in 0..n {
                self.xpt[[i, k]] = self.xpt[[i, k]] - s[i];
            }
        }
        for i in 0..n {
            self.xbase[i] = self.xbase[i] + s[i];
        }
        s
    }

    /// Change predicted by the minimum-Frobenius-norm interpolant of the current values for a
    /// step from the best point.
    pub(crate) fn alt_model_change(&self, step: &Array1<F>) -> F {
        let half = float!(0.5);
        let fopt = self.fval[self.kopt];
        let w: Array1<F> = Array1::from_iter(self.fval.iter().map(|&f| f - fopt));
        let pqw = self.omega_mul(&w);
        let xopt = self.xopt();
        let mut val = F::zero();
        for k in 0..self.npt {
            let mut s = F::zero();
            for j in 0..self.n {
                s = s + self.bmat[[j, k]] * step[j];
            }
            val = val + w[k] * s;
            let sp = self.xpt.column(k).dot(step);
            let so = self.xpt.column(k).dot(&xopt);
            val = val + pqw[k] * sp * (half * sp + so);
        }
        val
    }

    /// Squared distance of sample `k` from the best point.
    pub(crate) fn distsq_from_opt(&self, k: usize) -> F {
        let mut d = F::zero();
        for i in 0..self.n {
            let t = self.xpt[[i, k]] - self.xpt[[i, self.kopt]];
            d = d + t * t;
        }
        d
    }

    /// Checks every stored quantity for non-finite entries.
    pub(crate) fn is_finite(&self) -> bool {
        linalg::all_finite(self.gopt.iter())
            && linalg::all_finite(self.hq.iter())
            && linalg::all_finite(self.pq.iter())
            && linalg::all_finite(self.bmat.iter())
            && linalg::all_finite(self.zmat.iter())
            && linalg::all_finite(self.xpt.iter())
            && linalg::all_finite(self.fval.iter())
            && linalg::all_finite(self.xbase.iter())
    }
}

/// Coordinates combined by the two-offset point in column `k` (`k >= 2n + 1`).
fn pair_coordinates(n: usize, k: usize) -> (usize, usize) {
    let m = k - 2 * n;
    let shift = (m - 1) / n + 1;
    let j1 = m - (shift - 1) * n;
    let mut j2 = j1 + shift;
    if j2 > n {
        j2 -= n;
    }
    (j1 - 1, j2 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use rand::distributions::{Distribution, Uniform};
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    /// A fixed quadratic used to feed the model with consistent values.
    fn quad(x: &Array1<f64>) -> f64 {
        let n = x.len();
        let mut f = 1.25;
        for i in 0..n {
            f += (i as f64 + 1.0) * x[i] * x[i] + 0.3 * x[i];
            if i + 1 < n {
                f -= 0.5 * x[i] * x[i + 1];
            }
        }
        f
    }

    fn fresh_model(n: usize, npt: usize, rho: f64) -> InterpolationModel<f64> {
        let mut model = InterpolationModel::<f64>::new(n, npt);
        let signs = vec![1.0; n];
        model.initialize_geometry(rho, &signs);
        for k in 0..npt {
            let x = model.xpt.column(k).to_owned();
            model.fval[k] = quad(&x);
        }
        let kopt = (0..npt)
            .min_by(|&a, &b| model.fval[a].partial_cmp(&model.fval[b]).unwrap())
            .unwrap();
        model.kopt = kopt;
        model.build_least_norm_quadratic();
        model
    }

    /// Difference of the `k`-th Lagrange function between sample `l` and the best sample,
    /// evaluated from the factorization. Must equal `delta_kl - delta_k,kopt`.
    fn lagrange_diff(model: &InterpolationModel<f64>, k: usize, l: usize) -> f64 {
        let coeff = model.lagrange_coeff(k).unwrap();
        let xl = model.xpt.column(l).to_owned();
        let xo = model.xpt.column(model.kopt).to_owned();
        let mut val = 0.0;
        for i in 0..model.n {
            val += model.bmat[[i, k]] * (xl[i] - xo[i]);
        }
        for j in 0..model.npt {
            let a = model.xpt.column(j).dot(&xl);
            let b = model.xpt.column(j).dot(&xo);
            val += 0.5 * coeff[j] * (a * a - b * b);
        }
        val
    }

    fn max_lagrange_error(model: &InterpolationModel<f64>) -> f64 {
        let mut err: f64 = 0.0;
        for k in 0..model.npt {
            for l in 0..model.npt {
                let expected = (k == l) as u8 as f64 - (k == model.kopt) as u8 as f64;
                err = err.max((lagrange_diff(model, k, l) - expected).abs());
            }
        }
        err
    }

    fn max_interpolation_error(model: &InterpolationModel<f64>) -> f64 {
        let xo = model.xopt();
        let fo = model.fopt();
        let mut err: f64 = 0.0;
        for k in 0..model.npt {
            let d = model.xpt.column(k).to_owned() - &xo;
            err = err.max((model.eval_quad(&d) + fo - model.fval[k]).abs());
        }
        err
    }

    #[test]
    fn test_initial_factorization_is_inverse() {
        for (n, npt) in [(2, 5), (3, 7), (4, 7), (3, 10), (4, 15)] {
            let model = fresh_model(n, npt, 0.8);
            assert!(
                max_lagrange_error(&model) < 1e-11,
                "n={} npt={}",
                n,
                npt
            );
        }
    }

    #[test]
    fn test_initial_factorization_with_flipped_signs() {
        let n = 3;
        let npt = 7;
        let mut model = InterpolationModel::<f64>::new(n, npt);
        let signs = vec![1.0, -1.0, -1.0];
        model.initialize_geometry(0.5, &signs);
        for k in 0..npt {
            let x = model.xpt.column(k).to_owned();
            model.fval[k] = quad(&x);
        }
        model.kopt = 0;
        model.build_least_norm_quadratic();
        assert!(max_lagrange_error(&model) < 1e-11);
    }

    #[test]
    fn test_initial_model_interpolates() {
        for (n, npt) in [(2, 5), (3, 7), (3, 10), (4, 15)] {
            let model = fresh_model(n, npt, 0.6);
            assert!(
                max_interpolation_error(&model) < 1e-10,
                "n={} npt={}",
                n,
                npt
            );
        }
    }

    #[test]
    fn test_model_reproduces_quadratic_changes_on_samples() {
        let model = fresh_model(3, 7, 0.5);
        // On the sample set the model must match the sampled quadratic exactly, so the
        // predicted change between samples equals the true change.
        let xo = model.xopt();
        for k in 0..model.npt {
            let d = model.xpt.column(k).to_owned() - &xo;
            let predicted = model.eval_quad(&d);
            let actual = model.fval[k] - model.fopt();
            assert!((predicted - actual).abs() < 1e-10);
        }
    }

    #[test]
    fn test_update_replaces_point_and_keeps_inverse() {
        let mut model = fresh_model(3, 7, 1.0);
        let step = Array1::from(vec![0.3, -0.2, 0.4]);
        let (vlag, beta) = model.vlag_beta(&step);
        let knew = model.select_knew(&vlag, beta).unwrap();
        assert_ne!(knew, model.kopt);

        let xnew = model.xopt() + &step;
        let f = quad(&xnew);
        let diff = f - model.fopt() - model.eval_quad(&step);
        model.update_factorization(knew, &vlag, beta).unwrap();
        model.replace_point(knew, &xnew, f, diff).unwrap();

        assert!(max_lagrange_error(&model) < 1e-9);
        assert!(max_interpolation_error(&model) < 1e-8);
    }

    #[test]
    fn test_factorization_survives_many_updates() {
        let mut model = fresh_model(3, 7, 1.0);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let unit = Uniform::new(-1.0f64, 1.0);
        let mut accepted = 0usize;
        let mut checked = false;
        for iter in 0..10_000 {
            let mut step = Array1::<f64>::zeros(3);
            for i in 0..3 {
                step[i] = 0.5 * unit.sample(&mut rng);
            }
            let (vlag, beta) = model.vlag_beta(&step);
            // Mostly replace the point the algorithm itself would pick; every few rounds force
            // an arbitrary one, which is what a geometry step does.
            let knew = if rng.gen_range(0..4) == 0 {
                let mut k = rng.gen_range(0..model.npt);
                if k == model.kopt {
                    k = (k + 1) % model.npt;
                }
                k
            } else {
                match model.select_knew(&vlag, beta) {
                    Some(k) => k,
                    None => continue,
                }
            };
            let xnew = model.xopt() + &step;
            let f = quad(&xnew);
            let diff = f - model.fopt() - model.eval_quad(&step);
            if model.update_factorization(knew, &vlag, beta).is_err() {
                continue;
            }
            model.replace_point(knew, &xnew, f, diff).unwrap();
            if f < model.fopt() {
                model.move_best(knew);
            }
            accepted += 1;
            if iter % 500 == 499 {
                checked = true;
                assert!(
                    max_lagrange_error(&model) < 1e-6,
                    "inverse drifted after {} updates",
                    accepted
                );
                assert!(max_interpolation_error(&model) < 1e-5);
            }
        }
        assert!(checked);
        assert!(accepted > 9_000);
    }

    #[test]
    fn test_shift_origin_preserves_model() {
        let mut model = fresh_model(3, 7, 0.4);
        // Walk the best point away from the base so the shift is non-trivial.
        let step = Array1::from(vec![0.25, 0.1, -0.15]);
        let (vlag, beta) = model.vlag_beta(&step);
        let knew = model.select_knew(&vlag, beta).unwrap();
        let xnew = model.xopt() + &step;
        let f = quad(&xnew);
        let diff = f - model.fopt() - model.eval_quad(&step);
        model.update_factorization(knew, &vlag, beta).unwrap();
        model.replace_point(knew, &xnew, f, diff).unwrap();
        if f < model.fopt() {
            model.move_best(knew);
        }

        let probe = Array1::from(vec![0.11, -0.07, 0.05]);
        let before = model.eval_quad(&probe);
        let xopt_abs = &model.xbase + &model.xopt();

        let shift = model.shift_origin();
        assert!(shift.iter().any(|&s| s != 0.0));

        // Same physical point, same model value, same factorization identity.
        let after = model.eval_quad(&probe);
        assert!((before - after).abs() < 1e-10);
        let xopt_abs_after = &model.xbase + &model.xopt();
        for i in 0..3 {
            assert!((xopt_abs[i] - xopt_abs_after[i]).abs() < 1e-12);
        }
        assert!(model.xopt().iter().all(|&x| x.abs() < 1e-12));
        assert!(max_lagrange_error(&model) < 1e-9);
        assert!(max_interpolation_error(&model) < 1e-8);
    }

    #[test]
    fn test_lagrange_coeff_rejects_non_finite() {
        let mut model = fresh_model(2, 5, 0.5);
        model.zmat[[0, 0]] = f64::NAN;
        assert!(model.lagrange_coeff(0).is_err());
    }

    #[test]
    fn test_pair_coordinates_enumeration() {
        let n = 3;
        // npt = 10 = (n+1)(n+2)/2 uses all three off-diagonal pairs.
        let mut seen = std::collections::HashSet::new();
        for k in 2 * n + 1..10 {
            let (p, q) = pair_coordinates(n, k);
            assert!(p < n && q < n && p != q);
            let key = (p.min(q), p.max(q));
            assert!(seen.insert(key));
        }
        assert_eq!(seen.len(), 3);
    }
}
