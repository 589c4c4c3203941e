//! Nodal finite elements on Gauss-Lobatto points
//!
//! Provides the 1-d ingredients the per-level discretizations are built
//! from: Gauss-Lobatto-Legendre nodes and quadrature weights on the
//! reference interval `[0, 1]`, barycentric Lagrange evaluation, and
//! the nodal differentiation matrix. Two-dimensional elements are
//! tensor products of these.

use crate::types::Scalar;
use ndarray::{Array1, Array2};

/// Description of a scalar- or vector-valued finite element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    /// Polynomial degree per coordinate direction
    pub degree: usize,
    /// Discontinuous (L2-conforming) or continuous element
    pub is_dg: bool,
    /// Number of vector components
    pub n_components: usize,
}

impl Element {
    /// Element factory.
    ///
    /// # Panics
    /// If `degree` is zero or `n_components` is zero.
    pub fn new(degree: usize, is_discontinuous: bool, n_components: usize) -> Self {
        assert!(degree >= 1, "polynomial degree must be at least 1");
        assert!(n_components >= 1, "element needs at least one component");
        Self {
            degree,
            is_dg: is_discontinuous,
            n_components,
        }
    }

    /// Number of nodes per coordinate direction
    pub fn n_dofs_1d(&self) -> usize {
        self.degree + 1
    }

    /// Scalar dofs per cell (one component)
    pub fn n_dofs_per_cell_scalar(&self) -> usize {
        self.n_dofs_1d() * self.n_dofs_1d()
    }

    /// Total dofs per cell including components
    pub fn n_dofs_per_cell(&self) -> usize {
        self.n_dofs_per_cell_scalar() * self.n_components
    }

    /// Same element with modified degree and continuity (used when
    /// instantiating coarser hierarchy levels)
    pub fn with(&self, degree: usize, is_discontinuous: bool) -> Self {
        Self::new(degree, is_discontinuous, self.n_components)
    }
}

/// Gauss-Lobatto-Legendre nodes and weights on `[0, 1]`.
///
/// Nodes are computed by Newton iteration on the Legendre recurrence
/// (the classic `lglnodes` algorithm); weights are the associated
/// quadrature weights, summing to one.
///
/// # Panics
/// If `n < 2` (degree-0 elements are not supported).
pub fn gauss_lobatto<T: Scalar>(n: usize) -> (Array1<T>, Array1<T>) {
    assert!(n >= 2, "Gauss-Lobatto rule needs at least two points");
    let nm1 = n - 1; // polynomial degree
    let pi: T = std::f64::consts::PI.into();
    let two: T = 2.0.into();

    // Chebyshev-Gauss-Lobatto initial guess
    let mut x: Array1<T> = Array1::from_shape_fn(n, |k| {
        let kf: T = (k as f64).into();
        let nm1f: T = (nm1 as f64).into();
        (pi * kf / nm1f).cos()
    });

    // Legendre Vandermonde, columns are degrees 0..=nm1
    let mut p = Array2::<T>::zeros((n, n));
    let eps: T = f64::EPSILON.into();
    loop {
        let x_old = x.clone();
        for i in 0..n {
            p[[i, 0]] = T::one();
            if n > 1 {
                p[[i, 1]] = x[i];
            }
            for k in 2..n {
                let kf: T = (k as f64).into();
                p[[i, k]] = ((two * kf - T::one()) * x[i] * p[[i, k - 1]]
                    - (kf - T::one()) * p[[i, k - 2]])
                    / kf;
            }
        }
        let nf: T = (n as f64).into();
        for i in 0..n {
            x[i] = x_old[i]
                - (x_old[i] * p[[i, nm1]] - p[[i, nm1 - 1]]) / (nf * p[[i, nm1]]);
        }
        let delta = x
            .iter()
            .zip(x_old.iter())
            .map(|(a, b)| (*a - *b).abs())
            .fold(T::zero(), T::max);
        if delta <= eps * 16.0.into() {
            break;
        }
    }

    // weights on [-1, 1]: 2 / (N (N+1) P_N(x)^2)
    let mut w = Array1::<T>::zeros(n);
    for i in 0..n {
        let nf: T = (nm1 as f64).into();
        w[i] = two / (nf * (nf + T::one()) * p[[i, nm1]] * p[[i, nm1]]);
    }

    // sort ascending and map to [0, 1]
    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap());
    let half: T = 0.5.into();
    let points = Array1::from_shape_fn(n, |i| (x[idx[i]] + T::one()) * half);
    let weights = Array1::from_shape_fn(n, |i| w[idx[i]] * half);
    (points, weights)
}

/// Barycentric weights of a nodal point set
pub fn barycentric_weights<T: Scalar>(points: &Array1<T>) -> Array1<T> {
    let n = points.len();
    Array1::from_shape_fn(n, |j| {
        let mut w = T::one();
        for k in 0..n {
            if k != j {
                w = w * (points[j] - points[k]);
            }
        }
        T::one() / w
    })
}

/// Values of all Lagrange basis polynomials of `points` at `x`
pub fn lagrange_eval<T: Scalar>(points: &Array1<T>, bary: &Array1<T>, x: T) -> Array1<T> {
    let n = points.len();
    // exact node hit
    for j in 0..n {
        if x == points[j] {
            let mut v = Array1::zeros(n);
            v[j] = T::one();
            return v;
        }
    }
    let mut terms = Array1::<T>::zeros(n);
    let mut denom = T::zero();
    for j in 0..n {
        terms[j] = bary[j] / (x - points[j]);
        denom += terms[j];
    }
    terms.mapv(|t| t / denom)
}

/// Interpolation matrix from the Lagrange basis on `from` to the point
/// set `to`: row `i` holds the basis values at `to[i]`
pub fn interpolation_matrix<T: Scalar>(from: &Array1<T>, to: &Array1<T>) -> Array2<T> {
    let bary = barycentric_weights(from);
    let mut m = Array2::zeros((to.len(), from.len()));
    for i in 0..to.len() {
        let row = lagrange_eval(from, &bary, to[i]);
        for j in 0..from.len() {
            m[[i, j]] = row[j];
        }
    }
    m
}

/// Nodal differentiation matrix: `d[[i, j]] = l_j'(x_i)`
pub fn diff_matrix<T: Scalar>(points: &Array1<T>) -> Array2<T> {
    let n = points.len();
    let bary = barycentric_weights(points);
    let mut d = Array2::<T>::zeros((n, n));
    for i in 0..n {
        let mut row_sum = T::zero();
        for j in 0..n {
            if i != j {
                d[[i, j]] = (bary[j] / bary[i]) / (points[i] - points[j]);
                row_sum += d[[i, j]];
            }
        }
        d[[i, i]] = -row_sum;
    }
    d
}

/// Kronecker product of two dense matrices
pub fn kron<T: Scalar>(a: &Array2<T>, b: &Array2<T>) -> Array2<T> {
    let (ar, ac) = a.dim();
    let (br, bc) = b.dim();
    let mut out = Array2::zeros((ar * br, ac * bc));
    for i in 0..ar {
        for j in 0..ac {
            for k in 0..br {
                for l in 0..bc {
                    out[[i * br + k, j * bc + l]] = a[[i, j]] * b[[k, l]];
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gll_linear() {
        let (x, w) = gauss_lobatto::<f64>(2);
        assert!((x[0] - 0.0).abs() < 1e-14);
        assert!((x[1] - 1.0).abs() < 1e-14);
        assert!((w[0] - 0.5).abs() < 1e-14);
        assert!((w[1] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn gll_weights_sum_to_one() {
        for n in 2..9 {
            let (x, w) = gauss_lobatto::<f64>(n);
            assert!((w.sum() - 1.0).abs() < 1e-12, "n = {}", n);
            assert!((x[0]).abs() < 1e-14);
            assert!((x[n - 1] - 1.0).abs() < 1e-14);
            // quadrature is exact for degree 2n-3: check x^2 for n >= 3
            if n >= 3 {
                let int: f64 = x.iter().zip(w.iter()).map(|(xi, wi)| xi * xi * wi).sum();
                assert!((int - 1.0 / 3.0).abs() < 1e-12, "n = {}", n);
            }
        }
    }

    #[test]
    fn lagrange_partition_of_unity() {
        let (x, _) = gauss_lobatto::<f64>(5);
        let bary = barycentric_weights(&x);
        for &xi in &[0.0, 0.123, 0.5, 0.77, 1.0] {
            let vals = lagrange_eval(&x, &bary, xi);
            assert!((vals.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn diff_matrix_differentiates_linears() {
        let (x, _) = gauss_lobatto::<f64>(4);
        let d = diff_matrix(&x);
        let lin = x.mapv(|v| 3.0 * v + 1.0);
        let deriv = d.dot(&lin);
        for v in deriv.iter() {
            assert!((v - 3.0).abs() < 1e-11);
        }
    }

    #[test]
    fn interpolation_reproduces_polynomials() {
        let (coarse, _) = gauss_lobatto::<f64>(3); // degree 2
        let (fine, _) = gauss_lobatto::<f64>(6);
        let m = interpolation_matrix(&coarse, &fine);
        let p = |x: f64| 2.0 * x * x - x + 0.5;
        let coarse_vals = coarse.mapv(p);
        let fine_vals = m.dot(&coarse_vals);
        for (i, v) in fine_vals.iter().enumerate() {
            assert!((v - p(fine[i])).abs() < 1e-12);
        }
    }

    #[test]
    fn kron_dimensions() {
        let a = Array2::<f64>::eye(2);
        let b = Array2::from_shape_fn((3, 3), |(i, j)| (i * 3 + j) as f64);
        let k = kron(&a, &b);
        assert_eq!(k.dim(), (6, 6));
        assert_eq!(k[[0, 0]], 0.0);
        assert_eq!(k[[3, 3]], 0.0);
        assert_eq!(k[[4, 5]], b[[1, 2]]);
        assert_eq!(k[[1, 4]], 0.0);
    }
}
