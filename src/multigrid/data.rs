//! Runtime parameters of the multigrid preconditioner

use crate::solver::{AmgData, SolverData};

/// Order in which mesh size (h), polynomial degree (p) and continuity
/// (c) are coarsened, read left to right starting from the finest
/// level.
///
/// `ChMG` for example first drops to the continuous space on the fine
/// mesh, then coarsens the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MultigridType {
    HMG,
    ChMG,
    HcMG,
    PMG,
    CpMG,
    PcMG,
    HpMG,
    ChpMG,
    CphMG,
    HcpMG,
    HpcMG,
    PhMG,
    PchMG,
    PhcMG,
}

impl MultigridType {
    /// Whether the level sequence contains mesh coarsening
    pub fn involves_h_transfer(self) -> bool {
        !matches!(self, Self::PMG | Self::CpMG | Self::PcMG)
    }

    /// Whether the level sequence contains a continuous/discontinuous
    /// transition
    pub fn involves_c_transfer(self) -> bool {
        matches!(
            self,
            Self::ChMG
                | Self::HcMG
                | Self::CpMG
                | Self::PcMG
                | Self::ChpMG
                | Self::CphMG
                | Self::HcpMG
                | Self::HpcMG
                | Self::PchMG
                | Self::PhcMG
        )
    }

    /// Whether the level sequence contains degree coarsening
    pub fn involves_p_transfer(self) -> bool {
        !matches!(self, Self::HMG | Self::ChMG | Self::HcMG)
    }
}

impl Default for MultigridType {
    fn default() -> Self {
        Self::HMG
    }
}

/// Rule for walking the polynomial degree down towards one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PSequenceType {
    /// Jump straight to degree one
    GoToOne,
    /// Decrease the degree by one per level
    DecreaseByOne,
    /// Halve the degree per level
    Bisect,
    /// Hand-tuned sequence used in production runs
    Manual,
}

impl Default for PSequenceType {
    fn default() -> Self {
        Self::Bisect
    }
}

/// Smoother applied on every level except the coarsest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootherType {
    /// Polynomial Chebyshev smoother
    Chebyshev,
    /// Damped Jacobi iteration
    Jacobi,
    /// A few iterations of conjugate gradients
    Cg,
    /// A few iterations of GMRES
    Gmres,
}

impl Default for SmootherType {
    fn default() -> Self {
        Self::Chebyshev
    }
}

/// Preconditioner wrapped by the level smoothers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootherPreconditioner {
    /// No preconditioning
    None,
    /// Inverse operator diagonal
    PointJacobi,
    /// Cellwise block inverses
    BlockJacobi,
}

impl Default for SmootherPreconditioner {
    fn default() -> Self {
        Self::PointJacobi
    }
}

/// Level smoother configuration
#[derive(Debug, Clone, Copy)]
pub struct SmootherData {
    /// Which smoother to run
    pub smoother: SmootherType,
    /// Preconditioner inside the smoother
    pub preconditioner: SmootherPreconditioner,
    /// Smoothing iterations per pre- and post-smoothing step (the
    /// Chebyshev polynomial degree)
    pub iterations: usize,
    /// Damping factor of the Jacobi smoother
    pub relaxation_factor: f64,
    /// Eigenvalue range `lambda_max / smoothing_range` targeted by the
    /// Chebyshev smoother
    pub smoothing_range: f64,
    /// Lanczos iterations spent estimating the largest eigenvalue
    pub iterations_eigenvalue_estimation: usize,
}

impl Default for SmootherData {
    fn default() -> Self {
        Self {
            smoother: SmootherType::Chebyshev,
            preconditioner: SmootherPreconditioner::PointJacobi,
            iterations: 5,
            relaxation_factor: 0.8,
            smoothing_range: 20.0,
            iterations_eigenvalue_estimation: 20,
        }
    }
}

/// Solver applied on the coarsest level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarseGridSolverType {
    /// Chebyshev iteration degreed to reduce the residual by a fixed
    /// factor
    Chebyshev,
    /// Conjugate gradients
    Cg,
    /// GMRES
    Gmres,
    /// A full algebraic-multigrid solve
    Amg,
}

impl Default for CoarseGridSolverType {
    fn default() -> Self {
        Self::Chebyshev
    }
}

/// Preconditioner of the coarse-level Krylov solver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarseGridPreconditioner {
    /// No preconditioning
    None,
    /// Inverse operator diagonal
    PointJacobi,
    /// Cellwise block inverses
    BlockJacobi,
    /// Algebraic-multigrid V-cycle
    Amg,
}

impl Default for CoarseGridPreconditioner {
    fn default() -> Self {
        Self::PointJacobi
    }
}

/// Coarse-level problem configuration
#[derive(Debug, Clone, Copy)]
pub struct CoarseGridData {
    /// Coarse solver variant
    pub solver: CoarseGridSolverType,
    /// Preconditioner of the Krylov variants
    pub preconditioner: CoarseGridPreconditioner,
    /// Tolerances of the Krylov variants, also the accuracy `eps`
    /// targeted when degreeing the Chebyshev variant
    pub solver_data: SolverData,
    /// Parameters of the algebraic-multigrid hierarchy, used by both
    /// the AMG solver and the AMG preconditioner
    pub amg_data: AmgData,
}

impl Default for CoarseGridData {
    fn default() -> Self {
        Self {
            solver: CoarseGridSolverType::Chebyshev,
            preconditioner: CoarseGridPreconditioner::PointJacobi,
            solver_data: SolverData {
                max_iter: 10_000,
                abs_tol: 1e-20,
                rel_tol: 1e-3,
            },
            amg_data: AmgData::default(),
        }
    }
}

/// Complete multigrid configuration
#[derive(Debug, Clone, Copy)]
pub struct MultigridData {
    /// Coarsening order over h, p and c
    pub mg_type: MultigridType,
    /// Degree sequence of the p-levels
    pub p_sequence: PSequenceType,
    /// Level smoother
    pub smoother_data: SmootherData,
    /// Coarsest-level problem
    pub coarse_problem: CoarseGridData,
    /// Build transfers for arbitrarily coarsened level meshes instead
    /// of requiring a uniformly refined hierarchy
    pub use_global_coarsening: bool,
    /// Target number of coarse cells per process when shrinking the
    /// communicator on coarse levels
    pub n_cells_per_process: usize,
    /// Largest factor by which the process count may shrink from one
    /// level to the next
    pub max_process_shrink: usize,
    /// Whether the fine-level operator has a nontrivial nullspace
    /// (e.g. pure Neumann problems)
    pub operator_is_singular: bool,
}

impl Default for MultigridData {
    fn default() -> Self {
        Self {
            mg_type: MultigridType::default(),
            p_sequence: PSequenceType::default(),
            smoother_data: SmootherData::default(),
            coarse_problem: CoarseGridData::default(),
            use_global_coarsening: false,
            n_cells_per_process: 400,
            max_process_shrink: 8,
            operator_is_singular: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_kinds_per_type() {
        assert!(MultigridType::HMG.involves_h_transfer());
        assert!(!MultigridType::HMG.involves_p_transfer());
        assert!(!MultigridType::HMG.involves_c_transfer());

        assert!(!MultigridType::PMG.involves_h_transfer());
        assert!(MultigridType::PMG.involves_p_transfer());

        assert!(MultigridType::CphMG.involves_h_transfer());
        assert!(MultigridType::CphMG.involves_p_transfer());
        assert!(MultigridType::CphMG.involves_c_transfer());

        assert!(MultigridType::ChMG.involves_c_transfer());
        assert!(!MultigridType::ChMG.involves_p_transfer());
    }
}
