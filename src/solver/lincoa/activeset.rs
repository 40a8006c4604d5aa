// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Orthogonal factorization of the active constraint gradients.
//!
//! Keeps `QFAC * RFAC[.., ..nact] = A[.., iact]` where `QFAC` is orthogonal and `RFAC` is upper
//! triangular. The trailing columns of `QFAC` span the null space of the active set. Constraints
//! enter and leave by Givens rotations, so the factorization is never rebuilt from scratch.

use crate::core::LincoaFloat;
use crate::linalg::givens;
use ndarray::{Array1, Array2, ArrayView1};
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub(crate) struct ActiveSet<F> {
    /// Orthogonal factor, `n x n`
    qfac: Array2<F>,
    /// Triangular factor; only the leading `nact` columns are meaningful
    rfac: Array2<F>,
    /// Indices of the active constraints, in factorization order
    iact: Vec<usize>,
}

impl<F: LincoaFloat> ActiveSet<F> {
    pub(crate) fn new(n: usize) -> Self {
        ActiveSet {
            qfac: Array2::eye(n),
            rfac: Array2::zeros((n, n)),
            iact: Vec::new(),
        }
    }

    pub(crate) fn nact(&self) -> usize {
        self.iact.len()
    }

    pub(crate) fn indices(&self) -> &[usize] {
        &self.iact
    }

    pub(crate) fn contains(&self, j: usize) -> bool {
        self.iact.contains(&j)
    }

    fn n(&self) -> usize {
        self.qfac.nrows()
    }

    /// Tries to append constraint `j` with gradient `grad` to the active set.
    ///
    /// Returns `false` when the gradient is numerically dependent on the current active
    /// gradients (or the active set is already full); the factorization is still valid in that
    /// case, only the column order of the null-space part may have changed.
    pub(crate) fn add(&mut self, j: usize, grad: ArrayView1<'_, F>) -> bool {
        let n = self.n();
        let nact = self.nact();
        if nact == n {
            return false;
        }
        // w = QFAC' * grad; rotate the null-space columns so that only entry nact remains.
        let mut w = Array1::<F>::zeros(n);
        for i in 0..n {
            w[i] = self.qfac.column(i).dot(&grad);
        }
        for i in (nact + 1..n).rev() {
            let (c, s, r) = givens(w[i - 1], w[i]);
            w[i - 1] = r;
            w[i] = F::zero();
            for row in 0..n {
                let q1 = self.qfac[[row, i - 1]];
                let q2 = self.qfac[[row, i]];
                self.qfac[[row, i - 1]] = c * q1 + s * q2;
                self.qfac[[row, i]] = -s * q1 + c * q2;
            }
        }
        // A unit-norm gradient dependent on the active set leaves nothing in the new pivot.
        let tol = F::epsilon().sqrt();
        if w[nact].abs() <= tol {
            return false;
        }
        for i in 0..=nact {
            self.rfac[[i, nact]] = w[i];
        }
        self.iact.push(j);
        true
    }

    /// Removes the active constraint at position `pos` in factorization order.
    pub(crate) fn remove(&mut self, pos: usize) {
        let n = self.n();
        let nact = self.nact();
        debug_assert!(pos < nact);
        // Shift the trailing columns of rfac left; this leaves subdiagonal entries which are
        // chased away by Givens rotations applied to rows of rfac and columns of qfac.
        for col in pos + 1..nact {
            for row in 0..=col {
                self.rfac[[row, col - 1]] = self.rfac[[row, col]];
            }
        }
        for row in 0..n {
            self.rfac[[row, nact - 1]] = F::zero();
        }
        for k in pos..nact - 1 {
            let (c, s, r) = givens(self.rfac[[k, k]], self.rfac[[k + 1, k]]);
            self.rfac[[k, k]] = r;
            self.rfac[[k + 1, k]] = F::zero();
            for col in k + 1..nact - 1 {
                let r1 = self.rfac[[k, col]];
                let r2 = self.rfac[[k + 1, col]];
                self.rfac[[k, col]] = c * r1 + s * r2;
                self.rfac[[k + 1, col]] = -s * r1 + c * r2;
            }
            for row in 0..n {
                let q1 = self.qfac[[row, k]];
                let q2 = self.qfac[[row, k + 1]];
                self.qfac[[row, k]] = c * q1 + s * q2;
                self.qfac[[row, k + 1]] = -s * q1 + c * q2;
            }
        }
        self.iact.remove(pos);
    }

    /// Projects `v` onto the null space of the active constraint gradients.
    pub(crate) fn project_null(&self, v: &Array1<F>) -> Array1<F> {
        let n = self.n();
        let nact = self.nact();
        let mut out = Array1::<F>::zeros(n);
        for i in nact..n {
            let q = self.qfac.column(i);
            let t = q.dot(v);
            for row in 0..n {
                out[row] = out[row] + t * q[row];
            }
        }
        out
    }

    /// Least-squares multipliers of `target` against the active gradients: solves
    /// `RFAC * lambda = QFAC[.., ..nact]' * target` by back substitution.
    pub(crate) fn multipliers(&self, target: &Array1<F>) -> Vec<F> {
        let nact = self.nact();
        let mut rhs = vec![F::zero(); nact];
        for (i, r) in rhs.iter_mut().enumerate() {
            *r = self.qfac.column(i).dot(target);
        }
        let mut lam = vec![F::zero(); nact];
        for i in (0..nact).rev() {
            let mut s = rhs[i];
            for k in i + 1..nact {
                s = s - self.rfac[[i, k]] * lam[k];
            }
            lam[i] = s / self.rfac[[i, i]];
        }
        lam
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn unit(v: Vec<f64>) -> Array1<f64> {
        let a = Array1::from(v);
        let n = a.dot(&a).sqrt();
        a / n
    }

    /// Checks `QFAC * RFAC[.., ..nact] == A[.., iact]` and orthogonality of `QFAC`.
    fn check_factorization(set: &ActiveSet<f64>, grads: &[Array1<f64>]) {
        let n = grads.first().map(|g| g.len()).unwrap_or(0);
        for (pos, &j) in set.indices().iter().enumerate() {
            for row in 0..n {
                let mut s = 0.0;
                for i in 0..n {
                    s += set.qfac[[row, i]] * set.rfac[[i, pos]];
                }
                assert_relative_eq!(s, grads[j][row], epsilon = 1e-12);
            }
        }
        for i in 0..n {
            for j in 0..n {
                let d = set.qfac.column(i).dot(&set.qfac.column(j));
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(d, expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_add_and_project() {
        let grads = vec![
            unit(vec![1.0, 0.0, 0.0]),
            unit(vec![1.0, 1.0, 0.0]),
            unit(vec![0.0, 0.0, 1.0]),
        ];
        let mut set = ActiveSet::<f64>::new(3);
        assert!(set.add(0, grads[0].view()));
        assert!(set.add(1, grads[1].view()));
        check_factorization(&set, &grads);

        // The projection must be orthogonal to both active gradients.
        let v = array![0.7, -0.3, 1.4];
        let p = set.project_null(&v);
        assert_relative_eq!(p.dot(&grads[0]), 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.dot(&grads[1]), 0.0, epsilon = 1e-12);
        // And projecting twice changes nothing.
        let pp = set.project_null(&p);
        for i in 0..3 {
            assert_relative_eq!(pp[i], p[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_add_rejects_dependent_gradient() {
        let a = unit(vec![1.0, 2.0, -1.0]);
        let b = unit(vec![-1.0, -2.0, 1.0]);
        let mut set = ActiveSet::<f64>::new(3);
        assert!(set.add(0, a.view()));
        assert!(!set.add(1, b.view()));
        assert_eq!(set.nact(), 1);
    }

    #[test]
    fn test_remove_keeps_factorization() {
        let grads = vec![
            unit(vec![1.0, 0.5, 0.0]),
            unit(vec![0.0, 1.0, 0.5]),
            unit(vec![0.5, 0.0, 1.0]),
        ];
        let mut set = ActiveSet::<f64>::new(3);
        for (j, g) in grads.iter().enumerate() {
            assert!(set.add(j, g.view()));
        }
        check_factorization(&set, &grads);
        set.remove(1);
        assert_eq!(set.indices(), &[0, 2]);
        check_factorization(&set, &grads);
        set.remove(0);
        assert_eq!(set.indices(), &[2]);
        check_factorization(&set, &grads);
    }

    #[test]
    fn test_multipliers() {
        let grads = vec![unit(vec![1.0, 0.0]), unit(vec![1.0, 1.0])];
        let mut set = ActiveSet::<f64>::new(2);
        assert!(set.add(0, grads[0].view()));
        assert!(set.add(1, grads[1].view()));
        // target = 2*g0 + 3*g1 must be reproduced exactly.
        let target = &grads[0] * 2.0 + &grads[1] * 3.0;
        let lam = set.multipliers(&target);
        assert_relative_eq!(lam[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(lam[1], 3.0, epsilon = 1e-12);
    }
}
