//! Matrix-free evaluation context
//!
//! Bundles everything a discrete operator needs to run its cell loops
//! on one multigrid level: the mesh, the dof layout, the constraint
//! set and the quadrature resolution. Mesh and discretization objects
//! are shared (reference-counted) between sibling levels, see the
//! per-level setup in [`crate::multigrid::preconditioner`].

use crate::constraints::Constraints;
use crate::dof::DofHandler;
use crate::grid::DistributedMesh;
use std::rc::Rc;

/// Per-level bundle consumed by operator construction
#[derive(Debug, Clone)]
pub struct MatrixFreeContext {
    /// Mesh this level is discretized on
    pub mesh: Rc<DistributedMesh>,
    /// Dof layout of this level
    pub dof_handler: Rc<DofHandler>,
    /// Constraints of this level
    pub constraints: Rc<Constraints>,
    /// Quadrature points per direction used by the cell loops
    pub n_q_points_1d: usize,
}

impl MatrixFreeContext {
    /// Assemble the context from its ingredients.
    ///
    /// # Panics
    /// If the constraint set does not match the dof layout.
    pub fn reinit(
        mesh: Rc<DistributedMesh>,
        dof_handler: Rc<DofHandler>,
        constraints: Rc<Constraints>,
        n_q_points_1d: usize,
    ) -> Self {
        assert_eq!(
            constraints.n_dofs(),
            dof_handler.n_dofs(),
            "constraint set does not match dof layout"
        );
        Self {
            mesh,
            dof_handler,
            constraints,
            n_q_points_1d,
        }
    }

    /// Number of dofs on this level
    pub fn n_dofs(&self) -> usize {
        self.dof_handler.n_dofs()
    }
}
