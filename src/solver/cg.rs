//! Preconditioned conjugate gradient method

use super::utils::l2_norm;
use super::{KrylovPreconditioner, PreconditionerBase, SolverData, SolverResult};
use crate::operator::MultigridOperator;
use crate::types::DofVector;

/// Solve `A x = b` with preconditioned CG, starting from the given `x`.
///
/// The operator must be symmetric positive (semi-)definite with
/// respect to the preconditioner.
pub fn solve_cg<O: MultigridOperator>(
    op: &O,
    precond: &KrylovPreconditioner,
    x: &mut DofVector,
    b: &DofVector,
    data: &SolverData,
) -> SolverResult {
    let n = op.n_dofs();
    let mut r = DofVector::zeros(n);
    let mut z = DofVector::zeros(n);
    let mut q = DofVector::zeros(n);

    op.vmult(&mut r, x);
    r.zip_mut_with(b, |ri, bi| *ri = bi - *ri);

    let norm_0 = l2_norm(&r);
    if norm_0 <= data.abs_tol {
        return SolverResult {
            iterations: 0,
            converged: true,
            residual: norm_0,
        };
    }

    precond.apply(&mut z, &r);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    let mut norm = norm_0;
    for iter in 1..=data.max_iter {
        op.vmult(&mut q, &p);
        let pq = p.dot(&q);
        if pq.abs() < f64::MIN_POSITIVE {
            return SolverResult {
                iterations: iter - 1,
                converged: false,
                residual: norm,
            };
        }
        let alpha = rz / pq;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &q);

        norm = l2_norm(&r);
        if norm <= data.abs_tol || norm <= data.rel_tol * norm_0 {
            return SolverResult {
                iterations: iter,
                converged: true,
                residual: norm,
            };
        }

        precond.apply(&mut z, &r);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        rz = rz_new;
        p.zip_mut_with(&z, |pi, zi| *pi = zi + beta * *pi);
    }

    SolverResult {
        iterations: data.max_iter,
        converged: false,
        residual: norm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{IdentityPreconditioner, JacobiPreconditioner};

    /// 1-d Dirichlet Laplacian stencil, symmetric positive definite
    struct Tridiag {
        n: usize,
    }

    impl MultigridOperator for Tridiag {
        fn n_dofs(&self) -> usize {
            self.n
        }
        fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
            for i in 0..self.n {
                let mut v = 2.0 * src[i];
                if i > 0 {
                    v -= src[i - 1];
                }
                if i + 1 < self.n {
                    v -= src[i + 1];
                }
                dst[i] = v;
            }
        }
        fn calculate_inverse_diagonal(&self, diag: &mut DofVector) {
            diag.fill(0.5);
        }
        fn update_shift(&mut self, _shift: f64) {}
    }

    #[test]
    fn cg_converges_on_spd_system() {
        let op = Tridiag { n: 20 };
        let b = DofVector::ones(20);
        let mut x = DofVector::zeros(20);
        let data = SolverData {
            max_iter: 100,
            abs_tol: 1e-12,
            rel_tol: 1e-12,
        };
        let precond = KrylovPreconditioner::Identity(IdentityPreconditioner);
        let res = solve_cg(&op, &precond, &mut x, &b, &data);
        assert!(res.converged);
        assert!(res.residual <= 1e-12);

        let mut ax = DofVector::zeros(20);
        op.vmult(&mut ax, &x);
        for i in 0..20 {
            assert!((ax[i] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn jacobi_preconditioning_does_not_break_convergence() {
        let op = Tridiag { n: 20 };
        let mut diag = DofVector::zeros(20);
        op.calculate_inverse_diagonal(&mut diag);
        let precond = KrylovPreconditioner::PointJacobi(JacobiPreconditioner::new(diag));
        let b = DofVector::ones(20);
        let mut x = DofVector::zeros(20);
        let res = solve_cg(
            &op,
            &precond,
            &mut x,
            &b,
            &SolverData {
                max_iter: 100,
                abs_tol: 1e-12,
                rel_tol: 1e-12,
            },
        );
        assert!(res.converged);
    }

    #[test]
    fn zero_rhs_returns_immediately() {
        let op = Tridiag { n: 10 };
        let b = DofVector::zeros(10);
        let mut x = DofVector::zeros(10);
        let precond = KrylovPreconditioner::Identity(IdentityPreconditioner);
        let res = solve_cg(&op, &precond, &mut x, &b, &SolverData::default());
        assert!(res.converged);
        assert_eq!(res.iterations, 0);
        assert!(x.iter().all(|v| *v == 0.0));
    }
}
