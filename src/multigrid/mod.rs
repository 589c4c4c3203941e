//! # Geometric and polynomial multigrid
//!
//! Everything that turns a hierarchy of meshes and elements into a
//! working preconditioner: level sequencing over mesh size, polynomial
//! degree and continuity, coarse-grid construction with process-count
//! shrinking, intergrid transfer operators, smoothers, coarse-grid
//! solvers and the V-cycle itself.
#![allow(clippy::module_name_repetitions)]
pub mod algorithm;
pub mod coarse_grid;
pub mod coarse_solver;
pub mod data;
pub mod eigenvalues;
pub mod levels;
pub mod preconditioner;
pub mod smoother;
pub mod transfer;

pub use algorithm::MultigridAlgorithm;
pub use data::{
    CoarseGridData, CoarseGridPreconditioner, CoarseGridSolverType, MultigridData, MultigridType,
    PSequenceType, SmootherData, SmootherPreconditioner, SmootherType,
};
pub use levels::{DofHandlerId, LevelInfo};
pub use preconditioner::MultigridPreconditioner;
