//! Restarted GMRES with left preconditioning

use super::{KrylovPreconditioner, PreconditionerBase, SolverData, SolverResult};
use crate::operator::MultigridOperator;
use crate::types::DofVector;
use ndarray::Array2;

const RESTART: usize = 30;

/// Solve `A x = b` with GMRES(30), starting from the given `x`.
///
/// Convergence is monitored in the preconditioned residual norm, so
/// the tolerances in `data` apply to `||P^{-1}(b - A x)||`.
pub fn solve_gmres<O: MultigridOperator>(
    op: &O,
    precond: &KrylovPreconditioner,
    x: &mut DofVector,
    b: &DofVector,
    data: &SolverData,
) -> SolverResult {
    let n = op.n_dofs();
    let m = RESTART.min(data.max_iter.max(1));

    let mut r = DofVector::zeros(n);
    let mut z = DofVector::zeros(n);
    let mut w = DofVector::zeros(n);

    let mut norm_0 = 0.0;
    let mut iterations = 0;

    loop {
        op.vmult(&mut r, x);
        r.zip_mut_with(b, |ri, bi| *ri = bi - *ri);
        precond.apply(&mut z, &r);
        let beta = z.dot(&z).sqrt();
        if iterations == 0 {
            norm_0 = beta;
        }
        if beta <= data.abs_tol || beta <= data.rel_tol * norm_0 {
            return SolverResult {
                iterations,
                converged: true,
                residual: beta,
            };
        }
        if iterations >= data.max_iter {
            return SolverResult {
                iterations,
                converged: false,
                residual: beta,
            };
        }

        // Arnoldi with modified Gram-Schmidt and Givens rotations
        let mut basis: Vec<DofVector> = Vec::with_capacity(m + 1);
        basis.push(&z / beta);
        let mut h = Array2::<f64>::zeros((m + 1, m));
        let mut cs = vec![0.0_f64; m];
        let mut sn = vec![0.0_f64; m];
        let mut g = vec![0.0_f64; m + 1];
        g[0] = beta;

        let mut k = 0;
        while k < m && iterations < data.max_iter {
            op.vmult(&mut w, &basis[k]);
            precond.apply(&mut z, &w);
            for i in 0..=k {
                h[[i, k]] = z.dot(&basis[i]);
                z.scaled_add(-h[[i, k]], &basis[i]);
            }
            h[[k + 1, k]] = z.dot(&z).sqrt();
            basis.push(&z / h[[k + 1, k]].max(f64::MIN_POSITIVE));

            for i in 0..k {
                let t = cs[i] * h[[i, k]] + sn[i] * h[[i + 1, k]];
                h[[i + 1, k]] = -sn[i] * h[[i, k]] + cs[i] * h[[i + 1, k]];
                h[[i, k]] = t;
            }
            let denom = (h[[k, k]].powi(2) + h[[k + 1, k]].powi(2)).sqrt();
            cs[k] = h[[k, k]] / denom;
            sn[k] = h[[k + 1, k]] / denom;
            h[[k, k]] = denom;
            h[[k + 1, k]] = 0.0;
            g[k + 1] = -sn[k] * g[k];
            g[k] *= cs[k];

            iterations += 1;
            k += 1;
            let resid = g[k].abs();
            if resid <= data.abs_tol || resid <= data.rel_tol * norm_0 {
                break;
            }
        }

        // back substitution and solution update
        let mut y = vec![0.0_f64; k];
        for i in (0..k).rev() {
            let mut s = g[i];
            for j in i + 1..k {
                s -= h[[i, j]] * y[j];
            }
            y[i] = s / h[[i, i]];
        }
        for (yi, v) in y.iter().zip(basis.iter()) {
            x.scaled_add(*yi, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::IdentityPreconditioner;

    /// Nonsymmetric but well-conditioned test operator
    struct Shifted {
        n: usize,
    }

    impl MultigridOperator for Shifted {
        fn n_dofs(&self) -> usize {
            self.n
        }
        fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
            for i in 0..self.n {
                let mut v = 3.0 * src[i];
                if i + 1 < self.n {
                    v -= src[i + 1];
                }
                if i > 0 {
                    v += 0.5 * src[i - 1];
                }
                dst[i] = v;
            }
        }
        fn calculate_inverse_diagonal(&self, diag: &mut DofVector) {
            diag.fill(1.0 / 3.0);
        }
        fn update_shift(&mut self, _shift: f64) {}
    }

    #[test]
    fn gmres_converges_on_nonsymmetric_system() {
        let op = Shifted { n: 25 };
        let b = DofVector::ones(25);
        let mut x = DofVector::zeros(25);
        let data = SolverData {
            max_iter: 200,
            abs_tol: 1e-12,
            rel_tol: 1e-12,
        };
        let precond = KrylovPreconditioner::Identity(IdentityPreconditioner);
        let res = solve_gmres(&op, &precond, &mut x, &b, &data);
        assert!(res.converged);

        let mut ax = DofVector::zeros(25);
        op.vmult(&mut ax, &x);
        for i in 0..25 {
            assert!((ax[i] - 1.0).abs() < 1e-8);
        }
    }

    #[test]
    fn restart_does_not_stall() {
        // more iterations than the restart length
        let op = Shifted { n: 60 };
        let b = DofVector::from_iter((0..60).map(|i| (i % 5) as f64));
        let mut x = DofVector::zeros(60);
        let data = SolverData {
            max_iter: 500,
            abs_tol: 1e-10,
            rel_tol: 1e-10,
        };
        let precond = KrylovPreconditioner::Identity(IdentityPreconditioner);
        let res = solve_gmres(&op, &precond, &mut x, &b, &data);
        assert!(res.converged);

        let mut ax = DofVector::zeros(60);
        op.vmult(&mut ax, &x);
        for i in 0..60 {
            assert!((ax[i] - b[i]).abs() < 1e-7);
        }
    }
}
