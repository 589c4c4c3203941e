//! # Collection of iterative linear solvers and preconditioners
//!
//! Conjugate gradients and GMRES for symmetric and nonsymmetric level
//! problems, plus the preconditioners the Krylov loops can be wrapped
//! around: identity, point Jacobi, cellwise block Jacobi and an
//! algebraic-multigrid hierarchy built from an assembled sparse
//! matrix.
#![allow(clippy::module_name_repetitions)]
pub mod amg;
pub mod cg;
pub mod gmres;
pub mod utils;
pub use amg::{AmgData, AmgPreconditioner};
pub use cg::solve_cg;
pub use gmres::solve_gmres;

use crate::types::DofVector;
use enum_dispatch::enum_dispatch;
use ndarray::Array2;
use sprs::CsMat;
use utils::gauss_jordan_inverse;

/// Tolerances and iteration limits of a Krylov solve
#[derive(Debug, Clone, Copy)]
pub struct SolverData {
    /// Maximum number of iterations before the solve gives up
    pub max_iter: usize,
    /// Absolute residual tolerance
    pub abs_tol: f64,
    /// Residual reduction tolerance, relative to the initial residual
    pub rel_tol: f64,
}

impl Default for SolverData {
    fn default() -> Self {
        Self {
            max_iter: 10_000,
            abs_tol: 1e-20,
            rel_tol: 1e-3,
        }
    }
}

/// Outcome of a Krylov solve
#[derive(Debug, Clone, Copy)]
pub struct SolverResult {
    /// Iterations performed
    pub iterations: usize,
    /// Whether a tolerance was reached within the iteration limit
    pub converged: bool,
    /// Final residual norm
    pub residual: f64,
}

/// Application of a preconditioner, `dst = P^{-1} src`
#[enum_dispatch]
pub trait PreconditionerBase {
    /// Apply the inverse action on `src`
    fn apply(&self, dst: &mut DofVector, src: &DofVector);
}

/// No-op preconditioner
#[derive(Debug, Clone, Default)]
pub struct IdentityPreconditioner;

impl PreconditionerBase for IdentityPreconditioner {
    fn apply(&self, dst: &mut DofVector, src: &DofVector) {
        dst.assign(src);
    }
}

/// Scaling by the inverse operator diagonal
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inv_diag: DofVector,
}

impl JacobiPreconditioner {
    /// Wrap a precomputed inverse diagonal
    pub fn new(inv_diag: DofVector) -> Self {
        Self { inv_diag }
    }
}

impl PreconditionerBase for JacobiPreconditioner {
    fn apply(&self, dst: &mut DofVector, src: &DofVector) {
        dst.assign(src);
        *dst *= &self.inv_diag;
    }
}

/// Inversion of the block diagonal over contiguous dof blocks.
///
/// With a cellwise dof numbering (discontinuous spaces) the blocks are
/// exactly the cell matrices.
#[derive(Debug, Clone)]
pub struct BlockJacobiPreconditioner {
    blocks: Vec<Array2<f64>>,
    block_size: usize,
}

impl BlockJacobiPreconditioner {
    /// Extract and invert the dense diagonal blocks of `matrix`.
    ///
    /// # Panics
    /// If the matrix size is not a multiple of `block_size` or a block
    /// is singular.
    pub fn new(matrix: &CsMat<f64>, block_size: usize) -> Self {
        let n = matrix.rows();
        assert!(
            block_size > 0 && n % block_size == 0,
            "matrix of size {} cannot be split into blocks of {}",
            n,
            block_size
        );
        let mut blocks = Vec::with_capacity(n / block_size);
        for b in 0..n / block_size {
            let lo = b * block_size;
            let mut block = Array2::<f64>::zeros((block_size, block_size));
            for i in 0..block_size {
                if let Some(row) = matrix.outer_view(lo + i) {
                    for (col, &val) in row.iter() {
                        if col >= lo && col < lo + block_size {
                            block[[i, col - lo]] = val;
                        }
                    }
                }
            }
            blocks.push(gauss_jordan_inverse(&block));
        }
        Self { blocks, block_size }
    }
}

impl PreconditionerBase for BlockJacobiPreconditioner {
    fn apply(&self, dst: &mut DofVector, src: &DofVector) {
        let bs = self.block_size;
        for (b, inv) in self.blocks.iter().enumerate() {
            let lo = b * bs;
            for i in 0..bs {
                let mut s = 0.0;
                for j in 0..bs {
                    s += inv[[i, j]] * src[lo + j];
                }
                dst[lo + i] = s;
            }
        }
    }
}

/// Preconditioner variants usable inside the Krylov loops
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone)]
#[enum_dispatch(PreconditionerBase)]
pub enum KrylovPreconditioner {
    /// No preconditioning
    Identity(IdentityPreconditioner),
    /// Inverse diagonal scaling
    PointJacobi(JacobiPreconditioner),
    /// Cellwise block inverses
    BlockJacobi(BlockJacobiPreconditioner),
    /// Algebraic-multigrid V-cycle
    Amg(AmgPreconditioner),
}
