// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Dense linear algebra helpers
//!
//! Small building blocks shared by the solvers: Euclidean norms, symmetric rank-one updates,
//! Givens rotations and the Householder tridiagonalization of a symmetric matrix. Everything
//! operates on `ndarray` arrays and is generic over the float type.

use crate::core::LincoaFloat;
use ndarray::{Array1, Array2, ArrayView1};

/// Returns the Euclidean norm of `v`.
pub fn norm<F: LincoaFloat>(v: ArrayView1<'_, F>) -> F {
    v.dot(&v).sqrt()
}

/// Performs the symmetric rank-one update `a <- a + alpha * v * v^T` in place.
///
/// `a` must be square with dimension matching `v`.
pub fn sym_rank1_update<F: LincoaFloat>(a: &mut Array2<F>, alpha: F, v: ArrayView1<'_, F>) {
    let n = v.len();
    debug_assert_eq!(a.nrows(), n);
    debug_assert_eq!(a.ncols(), n);
    for i in 0..n {
        for j in 0..n {
            a[[i, j]] = a[[i, j]] + alpha * v[i] * v[j];
        }
    }
}

/// Checks whether `a` is symmetric up to an absolute tolerance `tol`.
pub fn is_symmetric<F: LincoaFloat>(a: &Array2<F>, tol: F) -> bool {
    if a.nrows() != a.ncols() {
        return false;
    }
    for i in 0..a.nrows() {
        for j in 0..i {
            if (a[[i, j]] - a[[j, i]]).abs() > tol {
                return false;
            }
        }
    }
    true
}

/// Returns `true` if all values are finite.
pub fn all_finite<'a, F: LincoaFloat>(values: impl IntoIterator<Item = &'a F>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}

/// Computes a Givens rotation `(c, s, r)` such that
///
/// ```text
///  c * a + s * b = r
/// -s * a + c * b = 0
/// ```
pub fn givens<F: LincoaFloat>(a: F, b: F) -> (F, F, F) {
    if b == F::zero() {
        (F::one(), F::zero(), a)
    } else {
        let r = a.hypot(b);
        (a / r, b / r, r)
    }
}

/// The result of a Householder tridiagonalization of a symmetric matrix.
///
/// Stores the diagonal and subdiagonal of the tridiagonal matrix `T = Q A Q^T` together with the
/// Householder reflectors making up `Q`. The reflectors are kept separate from the reduced
/// matrix; vectors can be pushed through `Q` and `Q^T` with [`transform`](Self::transform) and
/// [`back_transform`](Self::back_transform).
#[derive(Clone, Debug)]
pub struct HouseholderTridiag<F> {
    /// Diagonal of `T`
    pub diag: Array1<F>,
    /// Subdiagonal of `T` (length `n - 1`)
    pub offdiag: Array1<F>,
    /// Unit reflectors; entry `k` acts on the trailing `n - k - 1` coordinates
    reflectors: Vec<Array1<F>>,
}

impl<F: LincoaFloat> HouseholderTridiag<F> {
    /// Applies `Q` to `v`, mapping quantities into the coordinates of the tridiagonal matrix.
    pub fn transform(&self, v: &Array1<F>) -> Array1<F> {
        let mut out = v.clone();
        for (k, u) in self.reflectors.iter().enumerate() {
            reflect(&mut out, k + 1, u);
        }
        out
    }

    /// Applies `Q^T` to `v`, mapping a solution of the tridiagonal problem back.
    pub fn back_transform(&self, v: &Array1<F>) -> Array1<F> {
        let mut out = v.clone();
        for (k, u) in self.reflectors.iter().enumerate().rev() {
            reflect(&mut out, k + 1, u);
        }
        out
    }
}

/// Applies the reflector `I - 2 u u^T` to the trailing coordinates of `v` starting at `offset`.
fn reflect<F: LincoaFloat>(v: &mut Array1<F>, offset: usize, u: &Array1<F>) {
    if u.is_empty() {
        return;
    }
    let mut proj = F::zero();
    for (i, ui) in u.iter().enumerate() {
        proj = proj + *ui * v[offset + i];
    }
    let two = F::one() + F::one();
    for (i, ui) in u.iter().enumerate() {
        v[offset + i] = v[offset + i] - two * proj * *ui;
    }
}

/// Reduces the symmetric matrix `a` to tridiagonal form by Householder similarity
/// transformations.
///
/// Only the lower triangle of `a` is read. The strict upper triangle is assumed to mirror it.
pub fn tridiagonalize<F: LincoaFloat>(a: &Array2<F>) -> HouseholderTridiag<F> {
    let n = a.nrows();
    let mut w = Array2::<F>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            w[[i, j]] = a[[i, j]];
            w[[j, i]] = a[[i, j]];
        }
    }

    let mut reflectors: Vec<Array1<F>> = Vec::new();
    let mut offdiag = Array1::<F>::zeros(n.saturating_sub(1));

    for k in 0..n.saturating_sub(2) {
        let m = n - k - 1;
        let mut x = Array1::<F>::zeros(m);
        for i in 0..m {
            x[i] = w[[k + 1 + i, k]];
        }
        let xnorm = norm(x.view());
        if xnorm == F::zero() {
            reflectors.push(Array1::zeros(0));
            offdiag[k] = F::zero();
            continue;
        }
        let alpha = if x[0] >= F::zero() { -xnorm } else { xnorm };
        let mut u = x;
        u[0] = u[0] - alpha;
        let unorm = norm(u.view());
        if unorm == F::zero() {
            // Column is already in the required form.
            reflectors.push(Array1::zeros(0));
            offdiag[k] = alpha;
            continue;
        }
        u.mapv_inplace(|t| t / unorm);

        // Apply the similarity transformation to the trailing block:
        // B <- B - u wvec^T - wvec u^T with wvec = p - (u'p) u, p = 2 B u.
        let two = F::one() + F::one();
        let mut p = Array1::<F>::zeros(m);
        for i in 0..m {
            let mut s = F::zero();
            for j in 0..m {
                s = s + w[[k + 1 + i, k + 1 + j]] * u[j];
            }
            p[i] = two * s;
        }
        let up = u.dot(&p);
        let mut wvec = p;
        for i in 0..m {
            wvec[i] = wvec[i] - up * u[i];
        }
        for i in 0..m {
            for j in 0..m {
                w[[k + 1 + i, k + 1 + j]] =
                    w[[k + 1 + i, k + 1 + j]] - u[i] * wvec[j] - wvec[i] * u[j];
            }
        }

        for i in k + 1..n {
            w[[i, k]] = F::zero();
            w[[k, i]] = F::zero();
        }
        w[[k + 1, k]] = alpha;
        w[[k, k + 1]] = alpha;

        offdiag[k] = alpha;
        reflectors.push(u);
    }

    if n >= 2 {
        offdiag[n - 2] = w[[n - 1, n - 2]];
    }

    let mut diag = Array1::<F>::zeros(n);
    for i in 0..n {
        diag[i] = w[[i, i]];
    }

    HouseholderTridiag {
        diag,
        offdiag,
        reflectors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_norm() {
        let v = array![3.0f64, 4.0];
        assert_relative_eq!(norm(v.view()), 5.0, epsilon = 1e-14);
    }

    #[test]
    fn test_sym_rank1_update() {
        let mut a = Array2::<f64>::eye(2);
        let v = array![1.0, 2.0];
        sym_rank1_update(&mut a, 0.5, v.view());
        assert_relative_eq!(a[[0, 0]], 1.5, epsilon = 1e-14);
        assert_relative_eq!(a[[0, 1]], 1.0, epsilon = 1e-14);
        assert_relative_eq!(a[[1, 0]], 1.0, epsilon = 1e-14);
        assert_relative_eq!(a[[1, 1]], 3.0, epsilon = 1e-14);
        assert!(is_symmetric(&a, 1e-14));
    }

    #[test]
    fn test_givens() {
        let (c, s, r) = givens(3.0f64, 4.0);
        assert_relative_eq!(c * 3.0 + s * 4.0, r, epsilon = 1e-14);
        assert_relative_eq!(-s * 3.0 + c * 4.0, 0.0, epsilon = 1e-14);
        assert_relative_eq!(c * c + s * s, 1.0, epsilon = 1e-14);

        let (c, s, r) = givens(2.0f64, 0.0);
        assert_relative_eq!(c, 1.0, epsilon = 1e-14);
        assert_relative_eq!(s, 0.0, epsilon = 1e-14);
        assert_relative_eq!(r, 2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_all_finite() {
        let v = array![1.0f64, 2.0, 3.0];
        assert!(all_finite(v.iter()));
        let w = array![1.0f64, f64::NAN];
        assert!(!all_finite(w.iter()));
    }

    /// Reconstructs `Q^T T Q` from the factorization and compares against the input.
    fn reconstruction_error(a: &Array2<f64>) -> f64 {
        let n = a.nrows();
        let tri = tridiagonalize(a);
        let mut err: f64 = 0.0;
        for j in 0..n {
            // Column j of A equals Q^T T Q e_j.
            let mut e = Array1::<f64>::zeros(n);
            e[j] = 1.0;
            let qe = tri.transform(&e);
            let mut te = Array1::<f64>::zeros(n);
            for i in 0..n {
                let mut s = tri.diag[i] * qe[i];
                if i > 0 {
                    s += tri.offdiag[i - 1] * qe[i - 1];
                }
                if i + 1 < n {
                    s += tri.offdiag[i] * qe[i + 1];
                }
                te[i] = s;
            }
            let col = tri.back_transform(&te);
            for i in 0..n {
                err = err.max((col[i] - a[[i, j]]).abs());
            }
        }
        err
    }

    #[test]
    fn test_tridiagonalize_reconstructs() {
        let a = array![
            [4.0, 1.0, -2.0, 2.0],
            [1.0, 2.0, 0.0, 1.0],
            [-2.0, 0.0, 3.0, -2.0],
            [2.0, 1.0, -2.0, -1.0]
        ];
        assert!(reconstruction_error(&a) < 1e-12);
    }

    #[test]
    fn test_tridiagonalize_small_sizes() {
        let a = array![[2.0f64]];
        let tri = tridiagonalize(&a);
        assert_relative_eq!(tri.diag[0], 2.0, epsilon = 1e-14);
        assert_eq!(tri.offdiag.len(), 0);

        let a = array![[2.0f64, -1.0], [-1.0, 3.0]];
        let tri = tridiagonalize(&a);
        assert_relative_eq!(tri.diag[0], 2.0, epsilon = 1e-14);
        assert_relative_eq!(tri.diag[1], 3.0, epsilon = 1e-14);
        assert_relative_eq!(tri.offdiag[0], -1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_transform_roundtrip() {
        let a = array![
            [4.0, 1.0, -2.0],
            [1.0, 2.0, 0.5],
            [-2.0, 0.5, 3.0]
        ];
        let tri = tridiagonalize(&a);
        let v = array![0.3, -1.2, 2.5];
        let w = tri.back_transform(&tri.transform(&v));
        for i in 0..3 {
            assert_relative_eq!(w[i], v[i], epsilon = 1e-13);
        }
    }
}
