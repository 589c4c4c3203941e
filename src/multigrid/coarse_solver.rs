//! Coarse-grid solvers
//!
//! The coarsest level is solved either approximately by a
//! high-degree Chebyshev iteration whose degree is chosen from the
//! estimated condition number and the requested tolerance, by a
//! preconditioned Krylov solver, or by an algebraic-multigrid
//! hierarchy assembled from the coarse operator.

use super::data::{CoarseGridData, CoarseGridPreconditioner, CoarseGridSolverType};
use super::eigenvalues::estimate_eigenvalues;
use super::smoother::{ChebyshevSmoother, SmootherBase};
use crate::operator::MultigridOperator;
use crate::solver::{
    solve_cg, solve_gmres, AmgPreconditioner, BlockJacobiPreconditioner, IdentityPreconditioner,
    JacobiPreconditioner, KrylovPreconditioner, SolverData,
};
use crate::types::DofVector;
use log::debug;

/// Chebyshev degree needed to reduce the residual by `eps` on the
/// eigenvalue interval `[lambda_min, lambda_max]`.
///
/// The interval is widened by a safety factor of 1.1 before the
/// convergence factor `sigma` of the Chebyshev iteration is evaluated.
pub fn chebyshev_coarse_degree(lambda_min: f64, lambda_max: f64, eps: f64) -> usize {
    let smoothing_range = lambda_max / lambda_min * 1.1;
    let sqrt_inv_range = (1.0 / smoothing_range).sqrt();
    let sigma = (1.0 - sqrt_inv_range) / (1.0 + sqrt_inv_range);
    let numerator = (1.0 / eps + (1.0 / (eps * eps) - 1.0).sqrt()).ln();
    (numerator / (1.0 / sigma).ln()) as usize
}

/// Chebyshev iteration degreed for a fixed residual reduction
#[derive(Debug, Clone)]
pub struct ChebyshevCoarseSolver {
    smoother: ChebyshevSmoother,
    eps: f64,
    operator_is_singular: bool,
}

impl ChebyshevCoarseSolver {
    fn new<O: MultigridOperator>(op: &O, data: &CoarseGridData, operator_is_singular: bool) -> Self {
        assert!(
            data.preconditioner == CoarseGridPreconditioner::PointJacobi,
            "the Chebyshev coarse-grid solver requires the point Jacobi preconditioner"
        );
        let mut solver = Self {
            smoother: ChebyshevSmoother::with_interval(
                KrylovPreconditioner::Identity(IdentityPreconditioner),
                1,
                1.0,
                1.0,
            ),
            eps: data.solver_data.rel_tol,
            operator_is_singular,
        };
        solver.update(op);
        solver
    }

    fn update<O: MultigridOperator>(&mut self, op: &O) {
        let mut diag = op.initialize_dof_vector();
        op.calculate_inverse_diagonal(&mut diag);
        let precond = KrylovPreconditioner::PointJacobi(JacobiPreconditioner::new(diag));

        let est = estimate_eigenvalues(op, &precond, 30, self.operator_is_singular);
        let degree = chebyshev_coarse_degree(est.min, est.max, self.eps);
        debug!(
            "chebyshev coarse solver: eigenvalues [{:.3e}, {:.3e}], degree {}",
            est.min, est.max, degree
        );
        self.smoother =
            ChebyshevSmoother::with_interval(precond, degree.max(1), est.min, 1.1 * est.max);
    }
}

/// Preconditioned CG or GMRES on the coarsest level
#[derive(Debug, Clone)]
pub struct KrylovCoarseSolver {
    solver: CoarseGridSolverType,
    precond_kind: CoarseGridPreconditioner,
    precond: KrylovPreconditioner,
    data: CoarseGridData,
    block_size: usize,
    operator_is_singular: bool,
}

impl KrylovCoarseSolver {
    fn new<O: MultigridOperator>(
        op: &O,
        data: &CoarseGridData,
        block_size: usize,
        operator_is_singular: bool,
    ) -> Self {
        let mut solver = Self {
            solver: data.solver,
            precond_kind: data.preconditioner,
            precond: KrylovPreconditioner::Identity(IdentityPreconditioner),
            data: *data,
            block_size,
            operator_is_singular,
        };
        solver.update(op);
        solver
    }

    fn update<O: MultigridOperator>(&mut self, op: &O) {
        self.precond = match self.precond_kind {
            CoarseGridPreconditioner::None => {
                KrylovPreconditioner::Identity(IdentityPreconditioner)
            }
            CoarseGridPreconditioner::PointJacobi => {
                let mut diag = op.initialize_dof_vector();
                op.calculate_inverse_diagonal(&mut diag);
                KrylovPreconditioner::PointJacobi(JacobiPreconditioner::new(diag))
            }
            CoarseGridPreconditioner::BlockJacobi => {
                let matrix = op.assemble_sparse_matrix().unwrap_or_else(|| {
                    panic!("block Jacobi requires an assembled sparse matrix")
                });
                KrylovPreconditioner::BlockJacobi(BlockJacobiPreconditioner::new(
                    &matrix,
                    self.block_size,
                ))
            }
            CoarseGridPreconditioner::Amg => {
                let matrix = op.assemble_sparse_matrix().unwrap_or_else(|| {
                    panic!("the AMG preconditioner requires an assembled sparse matrix")
                });
                KrylovPreconditioner::Amg(AmgPreconditioner::new(matrix, &self.data.amg_data))
            }
        };
    }

    fn solve<O: MultigridOperator>(&self, op: &O, dst: &mut DofVector, src: &DofVector) {
        let mut rhs = src.clone();
        if self.operator_is_singular {
            subtract_mean(&mut rhs);
        }
        dst.fill(0.0);
        let result = match self.solver {
            CoarseGridSolverType::Cg => {
                solve_cg(op, &self.precond, dst, &rhs, &self.data.solver_data)
            }
            CoarseGridSolverType::Gmres => {
                solve_gmres(op, &self.precond, dst, &rhs, &self.data.solver_data)
            }
            _ => unreachable!("constructed for Krylov variants only"),
        };
        debug!(
            "coarse Krylov solve: {} iterations, residual {:.3e}",
            result.iterations, result.residual
        );
    }
}

/// Full algebraic-multigrid solve of the coarse problem
#[derive(Debug, Clone)]
pub struct AmgCoarseSolver {
    amg: AmgPreconditioner,
    solver_data: SolverData,
}

impl AmgCoarseSolver {
    fn new<O: MultigridOperator>(op: &O, data: &CoarseGridData) -> Self {
        let matrix = op
            .assemble_sparse_matrix()
            .unwrap_or_else(|| panic!("the AMG coarse solver requires an assembled sparse matrix"));
        Self {
            amg: AmgPreconditioner::new(matrix, &data.amg_data),
            solver_data: data.solver_data,
        }
    }
}

/// The coarse-grid solver variants
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone)]
pub enum CoarseGridSolver {
    /// Chebyshev iteration with computed degree
    Chebyshev(ChebyshevCoarseSolver),
    /// Preconditioned CG or GMRES
    Krylov(KrylovCoarseSolver),
    /// Algebraic multigrid
    Amg(AmgCoarseSolver),
}

impl CoarseGridSolver {
    /// Build the coarse solver for the coarsest-level operator.
    ///
    /// # Panics
    /// If the configuration combines the Chebyshev solver with a
    /// preconditioner other than point Jacobi, or if an AMG variant is
    /// requested for an operator without sparse-matrix assembly.
    pub fn new<O: MultigridOperator>(
        op: &O,
        data: &CoarseGridData,
        block_size: usize,
        operator_is_singular: bool,
    ) -> Self {
        match data.solver {
            CoarseGridSolverType::Chebyshev => {
                Self::Chebyshev(ChebyshevCoarseSolver::new(op, data, operator_is_singular))
            }
            CoarseGridSolverType::Cg | CoarseGridSolverType::Gmres => Self::Krylov(
                KrylovCoarseSolver::new(op, data, block_size, operator_is_singular),
            ),
            CoarseGridSolverType::Amg => Self::Amg(AmgCoarseSolver::new(op, data)),
        }
    }

    /// Solve the coarse problem, overwriting `dst`
    pub fn solve<O: MultigridOperator>(&self, op: &O, dst: &mut DofVector, src: &DofVector) {
        match self {
            Self::Chebyshev(ref s) => s.smoother.vmult(op, dst, src),
            Self::Krylov(ref s) => s.solve(op, dst, src),
            Self::Amg(ref s) => {
                dst.fill(0.0);
                let precond = KrylovPreconditioner::Amg(s.amg.clone());
                solve_cg(op, &precond, dst, src, &s.solver_data);
            }
        }
    }

    /// Refresh cached data after the coarse operator changed
    pub fn update<O: MultigridOperator>(&mut self, op: &O, data: &CoarseGridData) {
        match self {
            Self::Chebyshev(ref mut s) => s.update(op),
            Self::Krylov(ref mut s) => s.update(op),
            Self::Amg(ref mut s) => *s = AmgCoarseSolver::new(op, data),
        }
    }
}

fn subtract_mean(v: &mut DofVector) {
    let mean = v.sum() / v.len() as f64;
    v.mapv_inplace(|x| x - mean);
}
