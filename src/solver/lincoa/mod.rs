// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # LINCOA
//!
//! Derivative-free minimization of a smooth objective subject to linear inequality constraints
//! `a_j'x <= b_j`, sampling function values only.
//!
//! See [`Lincoa`] for details.
//!
//! ## References:
//!
//! \[0\] M. J. D. Powell (2015). On fast trust region methods for quadratic models with linear
//! constraints. Mathematical Programming Computation, 7:237-267.

mod activeset;
mod geometry;
mod model;
mod trstep;

use crate::core::{
    CostFunction, Error, IterState, LincoaFloat, Problem, Solver, SolverError, State,
    TerminationReason, KV,
};
use crate::linalg;
use crate::solver::lincoa::activeset::ActiveSet;
use crate::solver::lincoa::geometry::geometry_step;
use crate::solver::lincoa::model::InterpolationModel;
use crate::solver::lincoa::trstep::constrained_trust_step;
use ndarray::{Array1, Array2};
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// # LINCOA
///
/// A trust-region method for derivative-free optimization with linear inequality constraints.
/// The objective is modeled by a quadratic interpolating `npt` sample points; each iteration
/// either minimizes the model inside the trust region intersected with the feasible polyhedron,
/// or replaces a sample to keep the interpolation set well poised. The trust-region radius is
/// driven down from `rho_beg` to `rho_end`, which controls the final accuracy.
///
/// The cost function is evaluated at most `max_fun_evals` times (default `500 * n`). A target
/// cost value can be set on the iteration state via
/// [`target_cost`](`crate::core::IterState::target_cost`); reaching it at a feasible point stops
/// the run.
///
/// Constraint gradients are normalized internally; the constraint violation reported in the
/// state is measured against the constraints as given.
///
/// # Example
///
/// ```
/// use lincoa::core::{CostFunction, Error, Executor, State};
/// use lincoa::solver::lincoa::Lincoa;
///
/// struct Paraboloid {}
///
/// impl CostFunction for Paraboloid {
///     type Param = Vec<f64>;
///     type Output = f64;
///
///     fn cost(&self, p: &Self::Param) -> Result<Self::Output, Error> {
///         Ok((p[0] - 1.0).powi(2) + (p[1] - 2.0).powi(2))
///     }
/// }
///
/// fn main() -> Result<(), Error> {
///     let solver = Lincoa::new().with_rho(1.0, 1e-6)?;
///     let res = Executor::new(Paraboloid {}, solver)
///         .configure(|state| state.param(vec![0.0, 0.0]))
///         .run()?;
///     let best = res.state().get_best_param().unwrap();
///     assert!((best[0] - 1.0).abs() < 1e-4);
///     assert!((best[1] - 2.0).abs() < 1e-4);
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct Lincoa<F> {
    /// Initial trust-region radius
    rho_beg: F,
    /// Final trust-region radius
    rho_end: F,
    /// Lower ratio threshold
    eta1: F,
    /// Upper ratio threshold
    eta2: F,
    /// Shrink factor for the trust-region radius
    gamma1: F,
    /// Growth factor for the trust-region radius
    gamma2: F,
    /// Number of interpolation points; `2n + 1` if not set
    npt: Option<usize>,
    /// Maximum number of cost function evaluations; `500 n` if not set
    max_fun_evals: Option<u64>,
    /// Constraint rows `(a_j, b_j)` of `a_j'x <= b_j`, as given by the caller
    constraints: Vec<(Vec<F>, F)>,
    /// Runtime state, built during `init`
    ws: Option<Workspace<F>>,
}

/// Everything the outer loop carries from one iteration to the next.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
struct Workspace<F> {
    model: InterpolationModel<F>,
    /// Normalized constraint gradients, one per column
    amat: Array2<F>,
    /// Normalized right-hand sides, relative to the base point
    bvec: Array1<F>,
    /// Constraint gradients in caller units
    a_orig: Array2<F>,
    /// Right-hand sides in caller units
    b_orig: Array1<F>,
    active: ActiveSet<F>,
    /// Sign-encoded constraint residuals at the best point
    rescon: Array1<F>,
    delta: F,
    rho: F,
    /// Consecutive under-length trust steps, coarse count
    nvala: u32,
    /// Consecutive under-length trust steps, fine count
    nvalb: u32,
    /// Alternative-model counter; 3 doubles as the "freshly rebuilt" sentinel
    itest: u32,
    /// Set when the previous trust step predicted no reduction
    imprv: bool,
    /// Pending geometry target
    knew: Option<usize>,
    /// Under-length trust step kept for one last evaluation at the final radius
    tiny_step: Option<Array1<F>>,
    /// Best point so far, absolute coordinates
    xsav: Array1<F>,
    /// Objective value at `xsav`
    fopt: F,
    /// Whether `xsav` is feasible
    best_feasible: bool,
    /// Constraint violation at `xsav`, caller units
    cstrv: F,
    nf: u64,
    maxfun: u64,
    feas_tol: F,
}

/// What kind of step the current cycle evaluates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepKind {
    Trust,
    Geometry(usize),
    /// The saved under-length step, evaluated once before returning
    TinyFinal,
}

/// The states of the outer loop.
#[derive(Clone, Copy)]
enum Stage {
    ChooseStep,
    TrustStep,
    GeomStep,
    Evaluate,
    Update,
    MaybeShrinkDelta,
    MaybeReduceRho,
    Terminate(TerminationReason),
}

/// Per-cycle scratch data.
struct Cycle<F> {
    kind: StepKind,
    step: Array1<F>,
    snorm: F,
    ngetact: usize,
    qred: F,
    delsav: F,
    fsave: F,
    f: F,
    xnew: Array1<F>,
    x_abs: Vec<F>,
    cstrv_new: F,
    ifeas: bool,
    ratio: F,
}

impl<F: LincoaFloat> Default for Lincoa<F> {
    fn default() -> Self {
        Lincoa::new()
    }
}

impl<F: LincoaFloat> Lincoa<F> {
    /// Constructs a new instance with default parameters and no constraints.
    ///
    /// # Example
    ///
    /// ```
    /// # use lincoa::solver::lincoa::Lincoa;
    /// let solver: Lincoa<f64> = Lincoa::new();
    /// ```
    pub fn new() -> Self {
        Lincoa {
            rho_beg: float!(1.0),
            rho_end: float!(1e-6),
            eta1: float!(0.1),
            eta2: float!(0.7),
            gamma1: float!(0.5),
            gamma2: float!(2.0),
            npt: None,
            max_fun_evals: None,
            constraints: Vec::new(),
            ws: None,
        }
    }

    /// Adds the linear inequality constraints `a_j'x <= b_j`, where `a[j]` is the gradient of
    /// the `j`-th constraint.
    ///
    /// The gradients are normalized to unit length internally. Zero gradients are rejected.
    pub fn with_constraints(mut self, a: Vec<Vec<F>>, b: Vec<F>) -> Result<Self, Error> {
        if a.len() != b.len() {
            return Err(solver_error!(
                InvalidParameter,
                "`Lincoa`: number of constraint gradients and right-hand sides differ."
            ));
        }
        for (row, rhs) in a.iter().zip(b.iter()) {
            if !row.iter().all(|v| v.is_finite()) || !rhs.is_finite() {
                return Err(solver_error!(
                    InvalidParameter,
                    "`Lincoa`: constraints must be finite."
                ));
            }
            let norm: F = row.iter().fold(F::zero(), |s, &v| s + v * v);
            if norm <= F::zero() {
                return Err(solver_error!(
                    InvalidParameter,
                    "`Lincoa`: constraint gradients must be nonzero."
                ));
            }
        }
        self.constraints = a.into_iter().zip(b.into_iter()).collect();
        Ok(self)
    }

    /// Sets the initial and final trust-region radii.
    ///
    /// Requires `rho_beg >= rho_end > 0`. The defaults are `1.0` and `1e-6`.
    pub fn with_rho(mut self, rho_beg: F, rho_end: F) -> Result<Self, Error> {
        if !(rho_end > F::zero() && rho_beg >= rho_end) {
            return Err(solver_error!(
                InvalidParameter,
                "`Lincoa`: rho_beg >= rho_end > 0 is required."
            ));
        }
        self.rho_beg = rho_beg;
        self.rho_end = rho_end;
        Ok(self)
    }

    /// Sets the ratio thresholds deciding whether the trust region shrinks or grows.
    ///
    /// Requires `0 <= eta1 <= eta2 < 1`. The defaults are `0.1` and `0.7`.
    pub fn with_eta(mut self, eta1: F, eta2: F) -> Result<Self, Error> {
        if !(eta1 >= F::zero() && eta2 >= eta1 && eta2 < F::one()) {
            return Err(solver_error!(
                InvalidParameter,
                "`Lincoa`: 0 <= eta1 <= eta2 < 1 is required."
            ));
        }
        self.eta1 = eta1;
        self.eta2 = eta2;
        Ok(self)
    }

    /// Sets the shrink and growth factors of the trust-region radius.
    ///
    /// Requires `0 < gamma1 < 1 < gamma2`. The defaults are `0.5` and `2`.
    pub fn with_gamma(mut self, gamma1: F, gamma2: F) -> Result<Self, Error> {
        if !(gamma1 > F::zero() && gamma1 < F::one() && gamma2 > F::one()) {
            return Err(solver_error!(
                InvalidParameter,
                "`Lincoa`: 0 < gamma1 < 1 < gamma2 is required."
            ));
        }
        self.gamma1 = gamma1;
        self.gamma2 = gamma2;
        Ok(self)
    }

    /// Sets the number of interpolation points.
    ///
    /// Must lie in `[n + 2, (n + 1)(n + 2) / 2]`, which is checked at initialization when the
    /// problem dimension is known. The default is `2n + 1`.
    #[must_use]
    pub fn with_npt(mut self, npt: usize) -> Self {
        self.npt = Some(npt);
        self
    }

    /// Sets the maximum number of cost function evaluations. The default is `500 n`.
    #[must_use]
    pub fn with_max_fun_evals(mut self, maxfun: u64) -> Self {
        self.max_fun_evals = Some(maxfun);
        self
    }
}

/// Largest violation of the normalized constraints at the base-relative point `x`.
fn violation<F: LincoaFloat>(amat: &Array2<F>, bvec: &Array1<F>, x: &Array1<F>) -> F {
    let mut v = F::zero();
    for j in 0..amat.ncols() {
        v = v.max(amat.column(j).dot(x) - bvec[j]);
    }
    v
}

/// Constraint violation in caller units at the absolute point `x`.
fn violation_original<F: LincoaFloat>(a: &Array2<F>, b: &Array1<F>, x: &Array1<F>) -> F {
    let mut v = F::zero();
    for j in 0..a.ncols() {
        v = v.max(a.column(j).dot(x) - b[j]);
    }
    v
}

impl<F: LincoaFloat> Workspace<F> {
    /// Re-encodes `rescon` after a change of the trust-region radius.
    fn refresh_rescon(&mut self) {
        let xopt = self.model.xopt();
        for j in 0..self.rescon.len() {
            let r = self.rescon[j];
            if r >= F::zero() {
                if r > self.delta {
                    self.rescon[j] = -r;
                }
            } else if -r < self.delta {
                let e = self.bvec[j] - self.amat.column(j).dot(&xopt);
                self.rescon[j] = if e <= self.delta { e.max(F::zero()) } else { -e };
            }
        }
    }

    /// Updates `rescon` after the best point moved by `snorm`. Entries which provably stay at
    /// least `delta` away keep their encoded lower bound; the rest are recomputed.
    fn refresh_rescon_after_move(&mut self, snorm: F) {
        let xopt = self.model.xopt();
        for j in 0..self.rescon.len() {
            let r = self.rescon[j];
            if r < F::zero() && -r - snorm >= self.delta {
                self.rescon[j] = r + snorm;
            } else {
                let e = self.bvec[j] - self.amat.column(j).dot(&xopt);
                self.rescon[j] = if e <= self.delta { e.max(F::zero()) } else { -e };
            }
        }
    }

    /// The sample farthest from the best point, if it is far enough to warrant a geometry step.
    fn select_far_sample(&self) -> Option<usize> {
        let four = float!(4.0);
        let distsq = (self.delta * self.delta).max(four * self.rho * self.rho);
        let mut best: Option<(usize, F)> = None;
        for k in 0..self.model.npt {
            let d = self.model.distsq_from_opt(k);
            match best {
                Some((_, bd)) if d <= bd => {}
                _ => best = Some((k, d)),
            }
        }
        match best {
            Some((k, d)) if d > distsq => Some(k),
            _ => None,
        }
    }

    /// Pushes the current best point into the iteration state.
    fn post(&self, state: IterState<Vec<F>, F>) -> IterState<Vec<F>, F> {
        let cost = if self.best_feasible {
            self.fopt
        } else {
            F::infinity()
        };
        state
            .param(self.xsav.to_vec())
            .cost(cost)
            .constraint_violation(self.cstrv)
    }
}

/// Maps an error raised by the interpolation machinery onto a termination reason.
fn model_failure(err: &Error) -> TerminationReason {
    match err.downcast_ref::<SolverError>() {
        Some(SolverError::DegenerateDenominator { .. }) => TerminationReason::DamagingRounding,
        _ => TerminationReason::NanModel,
    }
}

impl<O, F> Solver<O, IterState<Vec<F>, F>> for Lincoa<F>
where
    O: CostFunction<Param = Vec<F>, Output = F>,
    F: LincoaFloat,
{
    const NAME: &'static str = "LINCOA";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        mut state: IterState<Vec<F>, F>,
    ) -> Result<(IterState<Vec<F>, F>, Option<KV>), Error> {
        let x0: Vec<F> = state.take_param().ok_or_else(solver_error_closure!(
            NotInitialized,
            "`Lincoa` requires an initial parameter vector. Pass it via `configure`."
        ))?;
        let n = x0.len();
        if n == 0 {
            return Err(solver_error!(
                InvalidParameter,
                "`Lincoa`: the parameter vector must not be empty."
            ));
        }
        if !x0.iter().all(|v| v.is_finite()) {
            let state = state
                .param(x0)
                .terminate_with(TerminationReason::NanInput);
            return Ok((state, None));
        }

        let m = self.constraints.len();
        let mut a_orig = Array2::<F>::zeros((n, m));
        let mut b_orig = Array1::<F>::zeros(m);
        let mut amat = Array2::<F>::zeros((n, m));
        let mut bvec = Array1::<F>::zeros(m);
        let xbase = Array1::from(x0.clone());
        for (j, (row, rhs)) in self.constraints.iter().enumerate() {
            if row.len() != n {
                return Err(solver_error!(
                    InvalidParameter,
                    "`Lincoa`: constraint gradient length differs from the parameter length."
                ));
            }
            let mut norm = F::zero();
            for i in 0..n {
                a_orig[[i, j]] = row[i];
                norm = norm + row[i] * row[i];
            }
            norm = norm.sqrt();
            b_orig[j] = *rhs;
            for i in 0..n {
                amat[[i, j]] = row[i] / norm;
            }
            bvec[j] = *rhs / norm - amat.column(j).dot(&xbase);
        }

        let npt = self.npt.unwrap_or(2 * n + 1);
        if npt < n + 2 || npt > (n + 1) * (n + 2) / 2 {
            return Err(solver_error!(
                InvalidParameter,
                "`Lincoa`: npt must be in [n + 2, (n + 1)(n + 2) / 2]."
            ));
        }
        let maxfun = self.max_fun_evals.unwrap_or(500 * n as u64);

        let mut bmax = F::zero();
        for j in 0..m {
            bmax = bmax.max(bvec[j].abs());
        }
        let feas_tol = float!(0.01) * F::epsilon().sqrt() * (F::one() + bmax);

        // Offsets prefer the feasible side of each coordinate.
        let mut signs = vec![F::one(); n];
        for (j, sign) in signs.iter_mut().enumerate() {
            let mut vp = F::zero();
            let mut vm = F::zero();
            for i in 0..m {
                vp = vp.max(self.rho_beg * amat[[j, i]] - bvec[i]);
                vm = vm.max(-self.rho_beg * amat[[j, i]] - bvec[i]);
            }
            if vp > feas_tol && vm <= feas_tol {
                *sign = -F::one();
            }
        }

        let mut model = InterpolationModel::<F>::new(n, npt);
        model.initialize_geometry(self.rho_beg, &signs);
        model.xbase = xbase;

        // Evaluate the initial interpolation set.
        let target = state.get_target_cost();
        let mut nf = 0u64;
        let mut best_feas: Option<(usize, F)> = None;
        let mut best_any: Option<(usize, F)> = None;
        let mut early: Option<TerminationReason> = None;
        for k in 0..npt {
            if nf >= maxfun {
                early = Some(TerminationReason::MaxFuncEvalsReached);
                break;
            }
            let xrel = model.xpt.column(k).to_owned();
            let x_abs: Vec<F> = (0..n).map(|i| model.xbase[i] + xrel[i]).collect();
            let f = problem.cost(&x_abs)?;
            nf += 1;
            if !f.is_finite() {
                early = Some(TerminationReason::NanObjective);
                break;
            }
            model.fval[k] = f;
            let feasible = violation(&amat, &bvec, &xrel) <= feas_tol;
            if feasible && (best_feas.is_none() || f < best_feas.unwrap().1) {
                best_feas = Some((k, f));
            }
            if best_any.is_none() || f < best_any.unwrap().1 {
                best_any = Some((k, f));
            }
            if feasible && f <= target {
                best_feas = Some((k, f));
                early = Some(TerminationReason::TargetCostReached);
                break;
            }
        }

        let (kopt, best_feasible) = match (best_feas, best_any) {
            (Some((k, _)), _) => (k, true),
            (None, Some((k, _))) => (k, false),
            (None, None) => {
                let state = state
                    .param(x0)
                    .terminate_with(early.unwrap_or(TerminationReason::MaxFuncEvalsReached));
                return Ok((state, None));
            }
        };
        model.kopt = kopt;
        let xsav = &model.xbase + &model.xopt();
        let fopt = model.fval[kopt];
        let cstrv = violation_original(&a_orig, &b_orig, &xsav).max(F::zero());

        let mut ws = Workspace {
            model,
            amat,
            bvec,
            a_orig,
            b_orig,
            active: ActiveSet::new(n),
            rescon: Array1::zeros(m),
            delta: self.rho_beg,
            rho: self.rho_beg,
            nvala: 0,
            nvalb: 0,
            itest: 3,
            imprv: false,
            knew: None,
            tiny_step: None,
            xsav,
            fopt,
            best_feasible,
            cstrv,
            nf,
            maxfun,
            feas_tol,
        };

        if let Some(reason) = early {
            let state = ws.post(state).terminate_with(reason);
            self.ws = Some(ws);
            return Ok((state, None));
        }

        ws.model.build_least_norm_quadratic();
        {
            let xopt = ws.model.xopt();
            for j in 0..m {
                let e = ws.bvec[j] - ws.amat.column(j).dot(&xopt);
                ws.rescon[j] = if e <= ws.delta { e.max(F::zero()) } else { -e };
            }
        }

        let kv = kv!(
            "n" => n;
            "m" => m;
            "npt" => npt;
            "rho_beg" => self.rho_beg;
            "rho_end" => self.rho_end;
        );
        let state = ws.post(state);
        self.ws = Some(ws);
        Ok((state, Some(kv)))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        state: IterState<Vec<F>, F>,
    ) -> Result<(IterState<Vec<F>, F>, Option<KV>), Error> {
        let (eta1, eta2, gamma1, gamma2, rho_end) =
            (self.eta1, self.eta2, self.gamma1, self.gamma2, self.rho_end);
        let ws = self.ws.as_mut().ok_or_else(solver_error_closure!(
            NotInitialized,
            "`Lincoa`: `next_iter` called before `init`."
        ))?;
        let n = ws.model.n;
        let target = state.get_target_cost();
        let half = float!(0.5);
        let sqrt2 = float!(2.0).sqrt();

        let mut cyc = Cycle {
            kind: StepKind::Trust,
            step: Array1::zeros(n),
            snorm: F::zero(),
            ngetact: 0,
            qred: F::zero(),
            delsav: ws.delta,
            fsave: ws.fopt,
            f: F::zero(),
            xnew: Array1::zeros(n),
            x_abs: vec![F::zero(); n],
            cstrv_new: F::zero(),
            ifeas: true,
            ratio: F::zero(),
        };
        let mut kind_label = "trust";
        let mut stage = Stage::ChooseStep;

        loop {
            match stage {
                Stage::ChooseStep => {
                    ws.refresh_rescon();
                    let xopt = ws.model.xopt();
                    let xoptsq = xopt.dot(&xopt);
                    if xoptsq >= float!(1e4) * ws.delta * ws.delta {
                        let s = ws.model.shift_origin();
                        for j in 0..ws.bvec.len() {
                            ws.bvec[j] = ws.bvec[j] - ws.amat.column(j).dot(&s);
                        }
                    }
                    if !ws.model.is_finite() {
                        stage = Stage::Terminate(TerminationReason::NanModel);
                        continue;
                    }
                    cyc.delsav = ws.delta;
                    cyc.fsave = ws.fopt;
                    stage = match ws.knew.take() {
                        None => Stage::TrustStep,
                        Some(k) => {
                            cyc.kind = StepKind::Geometry(k);
                            Stage::GeomStep
                        }
                    };
                }

                Stage::TrustStep => {
                    let res = constrained_trust_step(
                        &ws.model,
                        &ws.amat,
                        &ws.rescon,
                        ws.delta,
                        &mut ws.active,
                    );
                    cyc.kind = StepKind::Trust;
                    kind_label = "trust";
                    cyc.step = res.step;
                    cyc.snorm = res.snorm;
                    cyc.ngetact = res.ngetact;
                    stage = Stage::MaybeShrinkDelta;
                }

                Stage::MaybeShrinkDelta => {
                    let thresh = if cyc.ngetact > 1 {
                        float!(0.1999) * ws.delta
                    } else {
                        half * ws.delta
                    };
                    if cyc.snorm <= thresh {
                        ws.delta = half * ws.delta;
                        if ws.delta <= float!(1.4) * ws.rho {
                            ws.delta = ws.rho;
                        }
                        ws.nvala += 1;
                        ws.nvalb += 1;
                        let mut temp = cyc.snorm / ws.rho;
                        if cyc.delsav > ws.rho {
                            temp = F::one();
                        }
                        if temp >= half {
                            ws.nvala = 0;
                        }
                        if temp >= float!(0.1) {
                            ws.nvalb = 0;
                        }
                        if cyc.delsav > ws.rho || (ws.nvala < 5 && ws.nvalb < 3) {
                            match ws.select_far_sample() {
                                Some(k) => {
                                    ws.knew = Some(k);
                                    stage = Stage::ChooseStep;
                                }
                                None => {
                                    if ws.fopt < cyc.fsave || cyc.delsav > ws.rho {
                                        stage = Stage::ChooseStep;
                                    } else {
                                        stage = Stage::MaybeReduceRho;
                                    }
                                }
                            }
                            continue;
                        }
                        if cyc.snorm > F::zero() {
                            ws.tiny_step = Some(cyc.step.clone());
                        }
                        stage = Stage::MaybeReduceRho;
                    } else {
                        ws.nvala = 0;
                        ws.nvalb = 0;
                        stage = Stage::Evaluate;
                    }
                }

                Stage::GeomStep => {
                    let k = match cyc.kind {
                        StepKind::Geometry(k) => k,
                        _ => unreachable!(),
                    };
                    kind_label = "geometry";
                    let del = (float!(0.1) * ws.delta).max(ws.rho);
                    match geometry_step(&ws.model, k, del, &ws.amat, &ws.rescon, ws.feas_tol) {
                        Ok(gs) => {
                            cyc.snorm = linalg::norm(gs.step.view());
                            cyc.step = gs.step;
                            cyc.ifeas = gs.ifeas;
                            stage = Stage::Evaluate;
                        }
                        Err(e) => {
                            stage = Stage::Terminate(model_failure(&e));
                        }
                    }
                }

                Stage::Evaluate => {
                    cyc.qred = -ws.model.eval_quad(&cyc.step);
                    if cyc.kind == StepKind::Trust && !(cyc.qred > F::zero()) {
                        // The model predicts no reduction for a full trust-region step. One
                        // attempt to restore the geometry is made; a second failure in a row
                        // sends the radius down instead of looping.
                        if ws.imprv {
                            stage = Stage::MaybeReduceRho;
                            continue;
                        }
                        ws.imprv = true;
                        match ws.select_far_sample() {
                            Some(k) => {
                                ws.knew = Some(k);
                                stage = Stage::ChooseStep;
                            }
                            None => {
                                if cyc.delsav > ws.rho {
                                    stage = Stage::ChooseStep;
                                } else {
                                    stage = Stage::MaybeReduceRho;
                                }
                            }
                        }
                        continue;
                    }
                    if cyc.kind == StepKind::Trust {
                        ws.imprv = false;
                    }

                    if ws.nf >= ws.maxfun {
                        stage = Stage::Terminate(TerminationReason::MaxFuncEvalsReached);
                        continue;
                    }

                    let xopt = ws.model.xopt();
                    cyc.xnew = &xopt + &cyc.step;
                    cyc.x_abs = (0..n).map(|i| ws.model.xbase[i] + cyc.xnew[i]).collect();

                    if cyc.kind != StepKind::TinyFinal {
                        // Sanity check of the displacement from the best point; a violation
                        // signals that rounding errors have taken over.
                        let mut xdiff = F::zero();
                        for i in 0..n {
                            let t = cyc.x_abs[i] - ws.xsav[i];
                            xdiff = xdiff + t * t;
                        }
                        let xdiff = xdiff.sqrt();
                        if !(xdiff > float!(0.1) * ws.rho && xdiff < ws.delta + ws.delta) {
                            stage = Stage::Terminate(TerminationReason::DamagingRounding);
                            continue;
                        }
                    }
                    if !cyc.x_abs.iter().all(|v| v.is_finite()) {
                        stage = Stage::Terminate(TerminationReason::NanInput);
                        continue;
                    }

                    let f = problem.cost(&cyc.x_abs)?;
                    ws.nf += 1;
                    if !f.is_finite() {
                        stage = Stage::Terminate(TerminationReason::NanObjective);
                        continue;
                    }
                    cyc.f = f;

                    // Geometry steps come with their own feasibility flag; trust-region and
                    // final steps are checked against the shifted constraints.
                    if !matches!(cyc.kind, StepKind::Geometry(_)) {
                        cyc.ifeas = violation(&ws.amat, &ws.bvec, &cyc.xnew) <= ws.feas_tol;
                    }
                    cyc.cstrv_new =
                        violation_original(&ws.a_orig, &ws.b_orig, &Array1::from(cyc.x_abs.clone()))
                            .max(F::zero());

                    if cyc.ifeas && f <= target {
                        if f < ws.fopt || !ws.best_feasible {
                            ws.fopt = f;
                            ws.xsav = Array1::from(cyc.x_abs.clone());
                            ws.cstrv = cyc.cstrv_new;
                            ws.best_feasible = true;
                        }
                        stage = Stage::Terminate(TerminationReason::TargetCostReached);
                        continue;
                    }

                    if cyc.kind == StepKind::TinyFinal {
                        if cyc.ifeas && (f < ws.fopt || !ws.best_feasible) {
                            ws.fopt = f;
                            ws.xsav = Array1::from(cyc.x_abs.clone());
                            ws.cstrv = cyc.cstrv_new;
                            ws.best_feasible = true;
                        }
                        stage = Stage::Terminate(TerminationReason::RhoEndReached);
                        continue;
                    }

                    stage = Stage::Update;
                }

                Stage::Update => {
                    let diff = cyc.f - ws.fopt + cyc.qred;

                    // Compare against the prediction of the minimum-Frobenius-norm interpolant.
                    let mut dffalt = diff;
                    let mut have_dffalt = false;
                    if cyc.ifeas && ws.itest < 3 {
                        dffalt = cyc.f - ws.fopt - ws.model.alt_model_change(&cyc.step);
                        have_dffalt = true;
                    }
                    if ws.itest == 3 {
                        dffalt = diff;
                        have_dffalt = cyc.ifeas;
                        ws.itest = 0;
                    }

                    if cyc.kind == StepKind::Trust {
                        cyc.ratio = (ws.fopt - cyc.f) / cyc.qred;
                        if cyc.ratio <= eta1 {
                            ws.delta = gamma1 * ws.delta;
                        } else if cyc.ratio <= eta2 {
                            ws.delta = (gamma1 * ws.delta).max(cyc.snorm);
                        } else {
                            ws.delta = (gamma1 * ws.delta)
                                .max(gamma2 * cyc.snorm)
                                .min(sqrt2 * cyc.delsav);
                        }
                        if ws.delta <= float!(1.4) * ws.rho {
                            ws.delta = ws.rho;
                        }
                    }

                    let (vlag, beta) = ws.model.vlag_beta(&cyc.step);
                    let knew_final = match cyc.kind {
                        StepKind::Geometry(k) => k,
                        _ => match ws.model.select_knew(&vlag, beta) {
                            Some(k) => k,
                            None => {
                                stage =
                                    Stage::Terminate(TerminationReason::DamagingRounding);
                                continue;
                            }
                        },
                    };
                    if let Err(e) = ws.model.update_factorization(knew_final, &vlag, beta) {
                        stage = Stage::Terminate(model_failure(&e));
                        continue;
                    }
                    if let Err(e) = ws.model.replace_point(knew_final, &cyc.xnew, cyc.f, diff) {
                        stage = Stage::Terminate(model_failure(&e));
                        continue;
                    }

                    if have_dffalt {
                        if dffalt.abs() >= float!(0.1) * diff.abs() {
                            ws.itest = 0;
                        } else {
                            ws.itest += 1;
                        }
                    }

                    if cyc.ifeas && (cyc.f < ws.fopt || !ws.best_feasible) {
                        ws.model.move_best(knew_final);
                        ws.fopt = cyc.f;
                        ws.xsav = Array1::from(cyc.x_abs.clone());
                        ws.cstrv = cyc.cstrv_new;
                        ws.best_feasible = true;
                        ws.refresh_rescon_after_move(cyc.snorm);
                    }

                    if ws.itest == 3 {
                        ws.model.build_least_norm_quadratic();
                    }

                    // Decide what the next cycle does.
                    if matches!(cyc.kind, StepKind::Geometry(_)) || cyc.ratio >= eta1 {
                        break;
                    }
                    match ws.select_far_sample() {
                        Some(k) => {
                            ws.knew = Some(k);
                            break;
                        }
                        None => {
                            if ws.fopt < cyc.fsave || cyc.delsav > ws.rho {
                                break;
                            }
                            stage = Stage::MaybeReduceRho;
                        }
                    }
                }

                Stage::MaybeReduceRho => {
                    if ws.rho > rho_end {
                        ws.delta = half * ws.rho;
                        let ratio_rho = ws.rho / rho_end;
                        ws.rho = if ratio_rho > float!(250.0) {
                            float!(0.1) * ws.rho
                        } else if ratio_rho <= float!(16.0) {
                            rho_end
                        } else {
                            (ws.rho * rho_end).sqrt()
                        };
                        ws.delta = ws.delta.max(ws.rho);
                        ws.knew = None;
                        ws.nvala = 0;
                        ws.nvalb = 0;
                        kind_label = "shrink";
                        break;
                    }
                    match ws.tiny_step.take() {
                        Some(step) => {
                            cyc.kind = StepKind::TinyFinal;
                            kind_label = "final";
                            cyc.snorm = linalg::norm(step.view());
                            cyc.step = step;
                            stage = Stage::Evaluate;
                        }
                        None => {
                            stage = Stage::Terminate(TerminationReason::RhoEndReached);
                        }
                    }
                }

                Stage::Terminate(reason) => {
                    let kv = kv!(
                        "kind" => kind_label;
                        "nf" => ws.nf;
                        "rho" => ws.rho;
                        "delta" => ws.delta;
                        "cstrv" => ws.cstrv;
                    );
                    let state = ws.post(state).terminate_with(reason);
                    return Ok((state, Some(kv)));
                }
            }
        }

        let kv = kv!(
            "kind" => kind_label;
            "nf" => ws.nf;
            "rho" => ws.rho;
            "delta" => ws.delta;
            "cstrv" => ws.cstrv;
        );
        let state = ws.post(state);
        Ok((state, Some(kv)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Executor, OptimizationResult};
    use crate::test_trait_impl;
    use approx::assert_relative_eq;
    use argmin_testfunctions::rosenbrock_2d;

    test_trait_impl!(lincoa, Lincoa<f64>);

    struct Fn2d<G: Fn(f64, f64) -> f64>(G);

    impl<G: Fn(f64, f64) -> f64> CostFunction for Fn2d<G> {
        type Param = Vec<f64>;
        type Output = f64;

        fn cost(&self, p: &Self::Param) -> Result<Self::Output, Error> {
            Ok((self.0)(p[0], p[1]))
        }
    }

    struct FnNd<G: Fn(&[f64]) -> f64>(G);

    impl<G: Fn(&[f64]) -> f64> CostFunction for FnNd<G> {
        type Param = Vec<f64>;
        type Output = f64;

        fn cost(&self, p: &Self::Param) -> Result<Self::Output, Error> {
            Ok((self.0)(p))
        }
    }

    fn run_solver<O: CostFunction<Param = Vec<f64>, Output = f64>>(
        problem: O,
        solver: Lincoa<f64>,
        x0: Vec<f64>,
    ) -> OptimizationResult<O, Lincoa<f64>, IterState<Vec<f64>, f64>> {
        Executor::new(problem, solver)
            .ctrlc(false)
            .timer(false)
            .configure(|state| state.param(x0))
            .run()
            .unwrap()
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let res = Lincoa::<f64>::new().with_rho(0.0, 0.0);
        assert_error!(
            res,
            SolverError,
            "Invalid parameter: \"`Lincoa`: rho_beg >= rho_end > 0 is required.\""
        );
        assert!(Lincoa::<f64>::new().with_rho(1e-7, 1e-6).is_err());
        assert!(Lincoa::<f64>::new().with_rho(1.0, 1e-6).is_ok());
        assert!(Lincoa::<f64>::new().with_eta(-0.1, 0.5).is_err());
        assert!(Lincoa::<f64>::new().with_eta(0.5, 0.2).is_err());
        assert!(Lincoa::<f64>::new().with_eta(0.1, 1.0).is_err());
        assert!(Lincoa::<f64>::new().with_gamma(0.0, 2.0).is_err());
        assert!(Lincoa::<f64>::new().with_gamma(0.5, 1.0).is_err());
        assert!(Lincoa::<f64>::new()
            .with_constraints(vec![vec![0.0, 0.0]], vec![1.0])
            .is_err());
        assert!(Lincoa::<f64>::new()
            .with_constraints(vec![vec![1.0, 0.0]], vec![1.0, 2.0])
            .is_err());
    }

    #[test]
    fn test_unconstrained_paraboloid() {
        let solver = Lincoa::new().with_rho(1.0, 1e-6).unwrap().with_npt(5);
        let res = run_solver(
            Fn2d(|x, y| (x - 1.0).powi(2) + (y - 2.0).powi(2)),
            solver,
            vec![0.0, 0.0],
        );
        let state = res.state();
        let best = state.get_best_param().unwrap();
        assert_relative_eq!(best[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(best[1], 2.0, epsilon = 1e-4);
        assert!(state.get_best_cost() < 1e-6);
        assert_eq!(
            state.get_termination_reason(),
            TerminationReason::RhoEndReached
        );
    }

    #[test]
    fn test_rosenbrock() {
        let solver = Lincoa::new()
            .with_rho(0.5, 1e-8)
            .unwrap()
            .with_npt(5)
            .with_max_fun_evals(2000);
        let res = run_solver(
            FnNd(|p: &[f64]| rosenbrock_2d(p, 1.0, 100.0)),
            solver,
            vec![-1.2, 1.0],
        );
        let state = res.state();
        let best = state.get_best_param().unwrap();
        assert_relative_eq!(best[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(best[1], 1.0, epsilon = 1e-3);
        assert!(state.get_best_cost() < 1e-8, "f = {}", state.get_best_cost());
    }

    #[test]
    fn test_linear_objective_on_polytope() {
        // min x + y s.t. x + y >= 1, x >= 0, y >= 0; the whole edge x + y = 1 is optimal.
        let solver = Lincoa::new()
            .with_rho(0.5, 1e-6)
            .unwrap()
            .with_constraints(
                vec![vec![-1.0, -1.0], vec![-1.0, 0.0], vec![0.0, -1.0]],
                vec![-1.0, 0.0, 0.0],
            )
            .unwrap();
        let res = run_solver(Fn2d(|x, y| x + y), solver, vec![1.0, 1.0]);
        let state = res.state();
        assert_relative_eq!(state.get_best_cost(), 1.0, epsilon = 1e-6);
        assert!(state.get_best_constraint_violation() < 1e-8);
        let best = state.get_best_param().unwrap();
        assert!(best[0] >= -1e-8 && best[1] >= -1e-8);
    }

    #[test]
    fn test_sphere_on_hyperplane() {
        // min |x|^2 s.t. x0 + x1 + x2 = 1, written as two opposing inequalities.
        let solver = Lincoa::new()
            .with_rho(0.5, 1e-7)
            .unwrap()
            .with_constraints(
                vec![vec![1.0, 1.0, 1.0], vec![-1.0, -1.0, -1.0]],
                vec![1.0, -1.0],
            )
            .unwrap();
        let res = run_solver(
            FnNd(|p: &[f64]| p.iter().map(|x| x * x).sum()),
            solver,
            vec![1.0, 0.0, 0.0],
        );
        let state = res.state();
        let best = state.get_best_param().unwrap();
        for i in 0..3 {
            assert_relative_eq!(best[i], 1.0 / 3.0, epsilon = 1e-4);
        }
        assert_relative_eq!(state.get_best_cost(), 1.0 / 3.0, epsilon = 1e-6);
        assert!(state.get_best_constraint_violation() < 1e-8);
    }

    #[test]
    fn test_bounded_arctan_terminates() {
        // Historically a stalling configuration: the starting point is the constrained
        // minimizer and every feasible step increases the objective.
        let solver = Lincoa::new()
            .with_rho(1.0, 1e-6)
            .unwrap()
            .with_constraints(vec![vec![-1.0]], vec![99.0])
            .unwrap()
            .with_max_fun_evals(500);
        let res = run_solver(
            FnNd(|p: &[f64]| (p[0] + 100.0).atan()),
            solver,
            vec![-99.0],
        );
        let state = res.state();
        assert!(state.get_termination_reason().terminated());
        assert_ne!(
            state.get_termination_reason(),
            TerminationReason::KeyboardInterrupt
        );
        let best = state.get_best_param().unwrap();
        assert_relative_eq!(best[0], -99.0, epsilon = 1e-4);
    }

    #[test]
    fn test_exhausted_budget_returns_best_sample() {
        // With maxfun = npt the run ends right after the initial sampling.
        let solver = Lincoa::new()
            .with_rho(1.0, 1e-6)
            .unwrap()
            .with_npt(5)
            .with_max_fun_evals(5);
        let res = run_solver(Fn2d(|x, y| x + y), solver, vec![0.0, 0.0]);
        let state = res.state();
        assert_eq!(
            state.get_termination_reason(),
            TerminationReason::MaxFuncEvalsReached
        );
        assert_eq!(*state.get_func_counts().get("cost").unwrap(), 5);
        // Best initial sample of x + y over {0, +-e0, +-e1} is -1.
        assert_relative_eq!(state.get_best_cost(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_restart_is_idempotent() {
        let make_solver = || {
            Lincoa::new()
                .with_rho(1.0, 1e-6)
                .unwrap()
                .with_npt(5)
        };
        let res = run_solver(
            Fn2d(|x, y| (x - 1.0).powi(2) + (y - 2.0).powi(2)),
            make_solver(),
            vec![0.0, 0.0],
        );
        let first = res.state().get_best_cost();
        let x1 = res.state().get_best_param().unwrap().clone();
        let res2 = run_solver(
            Fn2d(|x, y| (x - 1.0).powi(2) + (y - 2.0).powi(2)),
            make_solver(),
            x1,
        );
        let second = res2.state().get_best_cost();
        assert!((second - first).abs() <= 1e-6 * (1.0 + first.abs()));
        assert!(second <= first + 1e-12);
    }

    #[test]
    fn test_rho_is_monotone_and_exhausted() {
        let solver = Lincoa::new().with_rho(1.0, 1e-5).unwrap();
        let res = run_solver(
            Fn2d(|x, y| (x + 0.3).powi(2) + (y - 0.7).powi(2)),
            solver,
            vec![0.0, 0.0],
        );
        assert_eq!(
            res.state().get_termination_reason(),
            TerminationReason::RhoEndReached
        );
        let ws = res.solver().ws.as_ref().unwrap();
        assert_eq!(ws.rho.to_ne_bytes(), 1e-5f64.to_ne_bytes());
        assert!(ws.delta >= ws.rho);
    }

    #[test]
    fn test_rescon_sign_encoding_invariant() {
        let solver = Lincoa::new()
            .with_rho(0.5, 1e-5)
            .unwrap()
            .with_constraints(
                vec![vec![-1.0, -1.0], vec![-1.0, 0.0], vec![0.0, -1.0]],
                vec![-1.0, 0.0, 0.0],
            )
            .unwrap();
        let res = run_solver(Fn2d(|x, y| x + y), solver, vec![1.0, 1.0]);
        let ws = res.solver().ws.as_ref().unwrap();
        let xopt = ws.model.xopt();
        for j in 0..ws.rescon.len() {
            let exact = ws.bvec[j] - ws.amat.column(j).dot(&xopt);
            let r = ws.rescon[j];
            if r >= 0.0 {
                assert_relative_eq!(r, exact.max(0.0), epsilon = 1e-9);
            } else {
                assert!(-r >= ws.delta - 1e-12);
                assert!(-r <= exact + 1e-9);
            }
        }
    }

    #[test]
    fn test_best_sample_is_best_feasible() {
        let solver = Lincoa::new()
            .with_rho(0.5, 1e-5)
            .unwrap()
            .with_constraints(
                vec![vec![-1.0, -1.0], vec![-1.0, 0.0], vec![0.0, -1.0]],
                vec![-1.0, 0.0, 0.0],
            )
            .unwrap();
        let res = run_solver(Fn2d(|x, y| 2.0 * x + y), solver, vec![1.0, 1.0]);
        let ws = res.solver().ws.as_ref().unwrap();
        let fk = ws.model.fval[ws.model.kopt];
        for k in 0..ws.model.npt {
            let x = ws.model.xpt.column(k).to_owned();
            if violation(&ws.amat, &ws.bvec, &x) <= ws.feas_tol {
                assert!(fk <= ws.model.fval[k] + 1e-12);
            }
        }
    }

    #[test]
    fn test_nan_objective_is_reported() {
        let solver = Lincoa::new().with_rho(1.0, 1e-6).unwrap();
        let res = run_solver(
            Fn2d(|x, _| if x > 0.5 { f64::NAN } else { x }),
            solver,
            vec![0.0, 0.0],
        );
        assert_eq!(
            res.state().get_termination_reason(),
            TerminationReason::NanObjective
        );
    }

    #[test]
    fn test_nan_initial_point_is_reported() {
        let solver = Lincoa::new().with_rho(1.0, 1e-6).unwrap();
        let res = run_solver(Fn2d(|x, y| x + y), solver, vec![f64::NAN, 0.0]);
        assert_eq!(
            res.state().get_termination_reason(),
            TerminationReason::NanInput
        );
    }

    #[test]
    fn test_target_cost_stops_early() {
        let solver = Lincoa::new().with_rho(1.0, 1e-9).unwrap();
        let res = Executor::new(
            Fn2d(|x, y| (x - 1.0).powi(2) + (y - 2.0).powi(2)),
            solver,
        )
        .ctrlc(false)
        .timer(false)
        .configure(|state| state.param(vec![0.0, 0.0]).target_cost(1e-3))
        .run()
        .unwrap();
        let state = res.state();
        assert_eq!(
            state.get_termination_reason(),
            TerminationReason::TargetCostReached
        );
        assert!(state.get_best_cost() <= 1e-3);
    }
}
