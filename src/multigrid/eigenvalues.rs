//! Eigenvalue estimation for the Chebyshev smoother
//!
//! Runs a fixed number of preconditioned conjugate-gradient iterations
//! with a random right-hand side and reads the extremal eigenvalues of
//! the preconditioned operator off the Lanczos tridiagonal matrix
//! assembled from the CG coefficients. The tridiagonal eigenvalues are
//! located by bisection on Sturm sequences.

use crate::operator::MultigridOperator;
use crate::solver::{KrylovPreconditioner, PreconditionerBase};
use crate::types::DofVector;
use log::debug;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Estimated extremal eigenvalues of the preconditioned operator
#[derive(Debug, Clone, Copy)]
pub struct EigenvalueEstimate {
    /// Smallest Lanczos eigenvalue
    pub min: f64,
    /// Largest Lanczos eigenvalue
    pub max: f64,
}

/// Estimate the extremal eigenvalues of `P^{-1} A`.
///
/// For singular operators (constant nullspace) the mean is removed
/// from the start vector so the iteration stays in the orthogonal
/// complement of the nullspace.
pub fn estimate_eigenvalues<O: MultigridOperator>(
    op: &O,
    precond: &KrylovPreconditioner,
    n_iterations: usize,
    operator_is_singular: bool,
) -> EigenvalueEstimate {
    let n = op.n_dofs();
    let mut rng = StdRng::seed_from_u64(17);
    let mut r = DofVector::random_using(n, Uniform::new(-1.0, 1.0), &mut rng);
    if operator_is_singular {
        subtract_mean(&mut r);
    }

    let mut z = DofVector::zeros(n);
    let mut q = DofVector::zeros(n);
    precond.apply(&mut z, &r);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    let mut alphas: Vec<f64> = Vec::with_capacity(n_iterations);
    let mut betas: Vec<f64> = Vec::with_capacity(n_iterations);

    for _ in 0..n_iterations.min(n) {
        op.vmult(&mut q, &p);
        if operator_is_singular {
            subtract_mean(&mut q);
        }
        let pq = p.dot(&q);
        if pq.abs() < f64::MIN_POSITIVE || rz.abs() < f64::MIN_POSITIVE {
            break;
        }
        let alpha = rz / pq;
        alphas.push(alpha);
        r.scaled_add(-alpha, &q);
        precond.apply(&mut z, &r);
        let rz_new = r.dot(&z);
        if rz_new.abs() < 1e-28 * rz.abs().max(1.0) {
            break;
        }
        betas.push(rz_new / rz);
        rz = rz_new;
        p.zip_mut_with(&z, |pi, zi| *pi = zi + betas.last().expect("nonempty") * *pi);
    }

    assert!(
        !alphas.is_empty(),
        "eigenvalue estimation performed no iterations"
    );
    // the last beta has no matching alpha pair
    betas.truncate(alphas.len().saturating_sub(1));

    let m = alphas.len();
    let mut diag = vec![0.0; m];
    let mut offdiag = vec![0.0; m.saturating_sub(1)];
    diag[0] = 1.0 / alphas[0];
    for i in 1..m {
        diag[i] = 1.0 / alphas[i] + betas[i - 1] / alphas[i - 1];
        offdiag[i - 1] = betas[i - 1].max(0.0).sqrt() / alphas[i - 1];
    }

    let (min, max) = tridiagonal_extremal_eigenvalues(&diag, &offdiag);
    debug!("eigenvalue estimate: [{:.6e}, {:.6e}]", min, max);
    EigenvalueEstimate { min, max }
}

fn subtract_mean(v: &mut DofVector) {
    let mean = v.sum() / v.len() as f64;
    v.mapv_inplace(|x| x - mean);
}

/// Number of eigenvalues of the symmetric tridiagonal matrix strictly
/// below `x`, via the Sturm sequence of leading principal minors
fn count_eigenvalues_below(diag: &[f64], offdiag: &[f64], x: f64) -> usize {
    let mut count = 0;
    let mut q = 1.0_f64;
    for i in 0..diag.len() {
        let e2 = if i == 0 { 0.0 } else { offdiag[i - 1] * offdiag[i - 1] };
        let q_safe = if q.abs() < 1e-300 {
            1e-300_f64.copysign(q)
        } else {
            q
        };
        q = diag[i] - x - e2 / q_safe;
        if q < 0.0 {
            count += 1;
        }
    }
    count
}

/// Smallest and largest eigenvalue of a symmetric tridiagonal matrix
/// by bisection within the Gershgorin bounds
fn tridiagonal_extremal_eigenvalues(diag: &[f64], offdiag: &[f64]) -> (f64, f64) {
    let m = diag.len();
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for i in 0..m {
        let radius = if i > 0 { offdiag[i - 1].abs() } else { 0.0 }
            + if i + 1 < m { offdiag[i].abs() } else { 0.0 };
        lo = lo.min(diag[i] - radius);
        hi = hi.max(diag[i] + radius);
    }
    if m == 1 {
        return (diag[0], diag[0]);
    }

    // k-th eigenvalue by counting sign changes
    let kth = |k: usize| {
        let (mut a, mut b) = (lo, hi);
        for _ in 0..100 {
            let mid = 0.5 * (a + b);
            if count_eigenvalues_below(diag, offdiag, mid) > k {
                b = mid;
            } else {
                a = mid;
            }
        }
        0.5 * (a + b)
    };
    (kth(0), kth(m - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{IdentityPreconditioner, JacobiPreconditioner};

    struct Diagonal {
        entries: DofVector,
    }

    impl MultigridOperator for Diagonal {
        fn n_dofs(&self) -> usize {
            self.entries.len()
        }
        fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
            dst.assign(src);
            *dst *= &self.entries;
        }
        fn calculate_inverse_diagonal(&self, diag: &mut DofVector) {
            diag.assign(&self.entries.mapv(|e| 1.0 / e));
        }
        fn update_shift(&mut self, _shift: f64) {}
    }

    #[test]
    fn sturm_bisection_recovers_known_spectrum() {
        // 1-d Laplacian stencil of size 4: eigenvalues 2 - 2 cos(k pi / 5)
        let diag = [2.0; 4];
        let offdiag = [-1.0; 3];
        let (min, max) = tridiagonal_extremal_eigenvalues(&diag, &offdiag);
        let exact_min = 2.0 - 2.0 * (std::f64::consts::PI / 5.0).cos();
        let exact_max = 2.0 - 2.0 * (4.0 * std::f64::consts::PI / 5.0).cos();
        assert!((min - exact_min).abs() < 1e-8);
        assert!((max - exact_max).abs() < 1e-8);
    }

    #[test]
    fn diagonal_operator_spectrum_is_found() {
        let entries = DofVector::from_iter((1..=40).map(|i| i as f64));
        let op = Diagonal { entries };
        let precond = KrylovPreconditioner::Identity(IdentityPreconditioner);
        let est = estimate_eigenvalues(&op, &precond, 40, false);
        assert!(est.min < 1.5);
        assert!(est.max > 35.0);
        assert!(est.max <= 40.0 + 1e-6);
    }

    #[test]
    fn jacobi_preconditioned_spectrum_collapses_to_one() {
        let entries = DofVector::from_iter((1..=20).map(|i| i as f64));
        let mut inv = DofVector::zeros(20);
        let op = Diagonal {
            entries: entries.clone(),
        };
        op.calculate_inverse_diagonal(&mut inv);
        let precond = KrylovPreconditioner::PointJacobi(JacobiPreconditioner::new(inv));
        let est = estimate_eigenvalues(&op, &precond, 20, false);
        assert!((est.min - 1.0).abs() < 1e-8);
        assert!((est.max - 1.0).abs() < 1e-8);
    }
}
