//! Level smoothers
//!
//! Each level except the coarsest carries one smoother. All smoothers
//! implement [`SmootherBase`]: `vmult` applies the smoother to a
//! defect with zero initial guess, `step` improves an existing
//! iterate, and `update` refreshes cached data (inverse diagonals,
//! eigenvalue estimates) after the operator changed.

use super::data::{SmootherData, SmootherPreconditioner, SmootherType};
use super::eigenvalues::estimate_eigenvalues;
use crate::operator::MultigridOperator;
use crate::solver::{
    solve_cg, solve_gmres, BlockJacobiPreconditioner, IdentityPreconditioner,
    JacobiPreconditioner, KrylovPreconditioner, PreconditionerBase, SolverData,
};
use crate::types::DofVector;
use enum_dispatch::enum_dispatch;

/// Interface of a level smoother
#[enum_dispatch]
pub trait SmootherBase<O: MultigridOperator> {
    /// Apply the smoother to `src` with zero initial guess
    fn vmult(&self, op: &O, dst: &mut DofVector, src: &DofVector);

    /// Perform smoothing steps on an existing iterate `x`
    fn step(&self, op: &O, x: &mut DofVector, rhs: &DofVector);

    /// Refresh cached data after the operator changed
    fn update(&mut self, op: &O);
}

/// Build the preconditioner wrapped by a smoother.
///
/// # Panics
/// If block Jacobi is requested but the operator cannot assemble a
/// sparse matrix.
pub(crate) fn build_smoother_preconditioner<O: MultigridOperator>(
    op: &O,
    kind: SmootherPreconditioner,
    block_size: usize,
) -> KrylovPreconditioner {
    match kind {
        SmootherPreconditioner::None => {
            KrylovPreconditioner::Identity(IdentityPreconditioner)
        }
        SmootherPreconditioner::PointJacobi => {
            let mut diag = op.initialize_dof_vector();
            op.calculate_inverse_diagonal(&mut diag);
            KrylovPreconditioner::PointJacobi(JacobiPreconditioner::new(diag))
        }
        SmootherPreconditioner::BlockJacobi => {
            let matrix = op
                .assemble_sparse_matrix()
                .unwrap_or_else(|| panic!("block Jacobi requires an assembled sparse matrix"));
            KrylovPreconditioner::BlockJacobi(BlockJacobiPreconditioner::new(
                &matrix, block_size,
            ))
        }
    }
}

/// Chebyshev polynomial smoother on the preconditioned operator
#[derive(Debug, Clone)]
pub struct ChebyshevSmoother {
    precond: KrylovPreconditioner,
    precond_kind: SmootherPreconditioner,
    block_size: usize,
    degree: usize,
    smoothing_range: f64,
    eig_iterations: usize,
    operator_is_singular: bool,
    theta: f64,
    delta: f64,
}

impl ChebyshevSmoother {
    fn new(data: &SmootherData, block_size: usize, operator_is_singular: bool) -> Self {
        Self {
            precond: KrylovPreconditioner::Identity(IdentityPreconditioner),
            precond_kind: data.preconditioner,
            block_size,
            degree: data.iterations,
            smoothing_range: data.smoothing_range,
            eig_iterations: data.iterations_eigenvalue_estimation,
            operator_is_singular,
            theta: 1.0,
            delta: 1.0,
        }
    }

    /// Chebyshev iteration with an externally determined degree and
    /// eigenvalue interval, used by the Chebyshev coarse-grid solver
    pub(crate) fn with_interval(
        precond: KrylovPreconditioner,
        degree: usize,
        lambda_min: f64,
        lambda_max: f64,
    ) -> Self {
        Self {
            precond,
            precond_kind: SmootherPreconditioner::PointJacobi,
            block_size: 1,
            degree,
            smoothing_range: lambda_max / lambda_min,
            eig_iterations: 0,
            operator_is_singular: false,
            theta: 0.5 * (lambda_max + lambda_min),
            delta: 0.5 * (lambda_max - lambda_min),
        }
    }

    /// Chebyshev iteration on the interval `[theta - delta, theta + delta]`
    fn run<O: MultigridOperator>(
        &self,
        op: &O,
        x: &mut DofVector,
        rhs: &DofVector,
        zero_initial_guess: bool,
    ) {
        let n = x.len();
        let mut r = DofVector::zeros(n);
        if zero_initial_guess {
            r.assign(rhs);
        } else {
            op.vmult(&mut r, x);
            r.zip_mut_with(rhs, |ri, bi| *ri = bi - *ri);
        }

        let mut z = DofVector::zeros(n);
        let mut t = DofVector::zeros(n);
        let sigma1 = self.theta / self.delta;
        let mut rho = 1.0 / sigma1;

        self.precond.apply(&mut z, &r);
        let mut d = z.mapv(|v| v / self.theta);
        *x += &d;

        for _ in 1..self.degree {
            op.vmult(&mut t, &d);
            r -= &t;
            self.precond.apply(&mut z, &r);
            let rho_new = 1.0 / (2.0 * sigma1 - rho);
            d.zip_mut_with(&z, |di, zi| {
                *di = rho_new * rho * *di + 2.0 * rho_new / self.delta * zi
            });
            *x += &d;
            rho = rho_new;
        }
    }
}

impl<O: MultigridOperator> SmootherBase<O> for ChebyshevSmoother {
    fn vmult(&self, op: &O, dst: &mut DofVector, src: &DofVector) {
        dst.fill(0.0);
        self.run(op, dst, src, true);
    }

    fn step(&self, op: &O, x: &mut DofVector, rhs: &DofVector) {
        self.run(op, x, rhs, false);
    }

    fn update(&mut self, op: &O) {
        self.precond = build_smoother_preconditioner(op, self.precond_kind, self.block_size);
        let est = estimate_eigenvalues(
            op,
            &self.precond,
            self.eig_iterations,
            self.operator_is_singular,
        );
        // enlarge the interval slightly to be robust against an
        // underestimated largest eigenvalue
        let lambda_max = 1.1 * est.max;
        let lambda_min = lambda_max / self.smoothing_range;
        self.theta = 0.5 * (lambda_max + lambda_min);
        self.delta = 0.5 * (lambda_max - lambda_min);
    }
}

/// Damped Jacobi smoother
#[derive(Debug, Clone)]
pub struct JacobiSmoother {
    inv_diag: DofVector,
    relaxation: f64,
    n_iterations: usize,
}

impl JacobiSmoother {
    fn new(data: &SmootherData) -> Self {
        Self {
            inv_diag: DofVector::zeros(0),
            relaxation: data.relaxation_factor,
            n_iterations: data.iterations,
        }
    }
}

impl<O: MultigridOperator> SmootherBase<O> for JacobiSmoother {
    fn vmult(&self, op: &O, dst: &mut DofVector, src: &DofVector) {
        dst.fill(0.0);
        self.step(op, dst, src);
    }

    fn step(&self, op: &O, x: &mut DofVector, rhs: &DofVector) {
        let mut ax = DofVector::zeros(x.len());
        for _ in 0..self.n_iterations {
            op.vmult(&mut ax, x);
            for i in 0..x.len() {
                x[i] += self.relaxation * self.inv_diag[i] * (rhs[i] - ax[i]);
            }
        }
    }

    fn update(&mut self, op: &O) {
        self.inv_diag = op.initialize_dof_vector();
        op.calculate_inverse_diagonal(&mut self.inv_diag);
    }
}

/// A fixed number of preconditioned CG iterations used as smoother
#[derive(Debug, Clone)]
pub struct CgSmoother {
    precond: KrylovPreconditioner,
    precond_kind: SmootherPreconditioner,
    block_size: usize,
    n_iterations: usize,
}

impl CgSmoother {
    fn new(data: &SmootherData, block_size: usize) -> Self {
        Self {
            precond: KrylovPreconditioner::Identity(IdentityPreconditioner),
            precond_kind: data.preconditioner,
            block_size,
            n_iterations: data.iterations,
        }
    }

    fn solver_data(&self) -> SolverData {
        // fixed iteration count, tolerances are never the stopping
        // criterion
        SolverData {
            max_iter: self.n_iterations,
            abs_tol: 1e-30,
            rel_tol: 1e-30,
        }
    }
}

impl<O: MultigridOperator> SmootherBase<O> for CgSmoother {
    fn vmult(&self, op: &O, dst: &mut DofVector, src: &DofVector) {
        dst.fill(0.0);
        solve_cg(op, &self.precond, dst, src, &self.solver_data());
    }

    fn step(&self, op: &O, x: &mut DofVector, rhs: &DofVector) {
        solve_cg(op, &self.precond, x, rhs, &self.solver_data());
    }

    fn update(&mut self, op: &O) {
        self.precond = build_smoother_preconditioner(op, self.precond_kind, self.block_size);
    }
}

/// A fixed number of GMRES iterations used as smoother
#[derive(Debug, Clone)]
pub struct GmresSmoother {
    precond: KrylovPreconditioner,
    precond_kind: SmootherPreconditioner,
    block_size: usize,
    n_iterations: usize,
}

impl GmresSmoother {
    fn new(data: &SmootherData, block_size: usize) -> Self {
        Self {
            precond: KrylovPreconditioner::Identity(IdentityPreconditioner),
            precond_kind: data.preconditioner,
            block_size,
            n_iterations: data.iterations,
        }
    }

    fn solver_data(&self) -> SolverData {
        SolverData {
            max_iter: self.n_iterations,
            abs_tol: 1e-30,
            rel_tol: 1e-30,
        }
    }
}

impl<O: MultigridOperator> SmootherBase<O> for GmresSmoother {
    fn vmult(&self, op: &O, dst: &mut DofVector, src: &DofVector) {
        dst.fill(0.0);
        solve_gmres(op, &self.precond, dst, src, &self.solver_data());
    }

    fn step(&self, op: &O, x: &mut DofVector, rhs: &DofVector) {
        solve_gmres(op, &self.precond, x, rhs, &self.solver_data());
    }

    fn update(&mut self, op: &O) {
        self.precond = build_smoother_preconditioner(op, self.precond_kind, self.block_size);
    }
}

/// The smoother variants of the level hierarchy
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone)]
pub enum Smoother {
    /// Chebyshev polynomial smoother
    Chebyshev(ChebyshevSmoother),
    /// Damped Jacobi
    Jacobi(JacobiSmoother),
    /// CG iterations
    Cg(CgSmoother),
    /// GMRES iterations
    Gmres(GmresSmoother),
}

impl<O: MultigridOperator> SmootherBase<O> for Smoother {
    fn vmult(&self, op: &O, dst: &mut DofVector, src: &DofVector) {
        match self {
            Self::Chebyshev(ref s) => s.vmult(op, dst, src),
            Self::Jacobi(ref s) => s.vmult(op, dst, src),
            Self::Cg(ref s) => s.vmult(op, dst, src),
            Self::Gmres(ref s) => s.vmult(op, dst, src),
        }
    }

    fn step(&self, op: &O, x: &mut DofVector, rhs: &DofVector) {
        match self {
            Self::Chebyshev(ref s) => s.step(op, x, rhs),
            Self::Jacobi(ref s) => s.step(op, x, rhs),
            Self::Cg(ref s) => s.step(op, x, rhs),
            Self::Gmres(ref s) => s.step(op, x, rhs),
        }
    }

    fn update(&mut self, op: &O) {
        match self {
            Self::Chebyshev(ref mut s) => s.update(op),
            Self::Jacobi(ref mut s) => s.update(op),
            Self::Cg(ref mut s) => s.update(op),
            Self::Gmres(ref mut s) => s.update(op),
        }
    }
}

/// Build and initialize the smoother of one level.
///
/// `block_size` is the number of dofs per cell, used by the block
/// Jacobi preconditioner.
///
/// # Panics
/// If called for the coarsest level; level zero is handled by the
/// coarse-grid solver.
pub fn create_smoother<O: MultigridOperator>(
    op: &O,
    data: &SmootherData,
    block_size: usize,
    level: usize,
    operator_is_singular: bool,
) -> Smoother {
    assert!(
        level > 0,
        "level 0 has no smoother, it is handled by the coarse-grid solver"
    );
    let mut smoother = match data.smoother {
        SmootherType::Chebyshev => {
            Smoother::Chebyshev(ChebyshevSmoother::new(data, block_size, operator_is_singular))
        }
        SmootherType::Jacobi => Smoother::Jacobi(JacobiSmoother::new(data)),
        SmootherType::Cg => Smoother::Cg(CgSmoother::new(data, block_size)),
        SmootherType::Gmres => Smoother::Gmres(GmresSmoother::new(data, block_size)),
    };
    smoother.update(op);
    smoother
}
