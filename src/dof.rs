//! Degree-of-freedom layouts on uniform level meshes
//!
//! Continuous (`Q_k`) elements are numbered lexicographically over the
//! global tensor grid of nodes; discontinuous (`DGQ_k`) elements are
//! numbered cell-major with lexicographic node ordering inside each
//! cell. Vector components are blocked: component `c` occupies the
//! index range `c * n_scalar_dofs .. (c+1) * n_scalar_dofs`.

use crate::element::Element;
use crate::grid::DistributedMesh;
use std::rc::Rc;

/// Identifier of a piece of the domain boundary
pub type BoundaryId = u32;

/// Left boundary of the unit square (x = 0)
pub const BOUNDARY_LEFT: BoundaryId = 0;
/// Right boundary of the unit square (x = 1)
pub const BOUNDARY_RIGHT: BoundaryId = 1;
/// Bottom boundary of the unit square (y = 0)
pub const BOUNDARY_BOTTOM: BoundaryId = 2;
/// Top boundary of the unit square (y = 1)
pub const BOUNDARY_TOP: BoundaryId = 3;

/// Degrees of freedom of one element space on one mesh level
#[derive(Debug, Clone)]
pub struct DofHandler {
    mesh: Rc<DistributedMesh>,
    element: Element,
    h_level: usize,
    n_cells_1d: usize,
    n_scalar_dofs: usize,
}

impl DofHandler {
    /// Distribute dofs for `element` on refinement level `h_level` of
    /// the mesh.
    ///
    /// # Panics
    /// If the mesh has more than one coarse cell, if `h_level` exceeds
    /// the mesh depth, or if the mesh is not uniformly refined down to
    /// `h_level` (hanging nodes are handled by the production kernels,
    /// not by this layout).
    pub fn new(mesh: Rc<DistributedMesh>, element: Element, h_level: usize) -> Self {
        assert_eq!(
            mesh.serial().n_coarse_cells(),
            1,
            "structured dof layout requires a single coarse cell"
        );
        assert!(
            h_level < mesh.n_global_levels(),
            "requested dofs on level {} of a mesh with {} levels",
            h_level,
            mesh.n_global_levels()
        );
        for l in 0..h_level {
            let expected = 4usize.pow(l as u32);
            assert_eq!(
                mesh.serial().refined_on_level(l).len(),
                expected,
                "mesh is not uniformly refined on level {}",
                l
            );
        }
        let n_cells_1d = 1usize << h_level;
        let p = element.degree;
        let n_scalar_dofs = if element.is_dg {
            n_cells_1d * n_cells_1d * element.n_dofs_per_cell_scalar()
        } else {
            let n1d = n_cells_1d * p + 1;
            n1d * n1d
        };
        Self {
            mesh,
            element,
            h_level,
            n_cells_1d,
            n_scalar_dofs,
        }
    }

    /// The finite element this handler distributes
    pub fn element(&self) -> &Element {
        &self.element
    }

    /// The mesh this handler lives on
    pub fn mesh(&self) -> &Rc<DistributedMesh> {
        &self.mesh
    }

    /// Mesh refinement level of this discretization
    pub fn h_level(&self) -> usize {
        self.h_level
    }

    /// Cells per coordinate direction on this level
    pub fn n_cells_1d(&self) -> usize {
        self.n_cells_1d
    }

    /// Number of scalar dofs (one component)
    pub fn n_scalar_dofs(&self) -> usize {
        self.n_scalar_dofs
    }

    /// Total number of dofs including vector components
    pub fn n_dofs(&self) -> usize {
        self.n_scalar_dofs * self.element.n_components
    }

    /// Global nodes per direction (continuous layout only)
    pub fn n_nodes_1d(&self) -> usize {
        debug_assert!(!self.element.is_dg);
        self.n_cells_1d * self.element.degree + 1
    }

    /// Scalar dof indices of cell `(cx, cy)` in lexicographic node
    /// order (`jy` outer, `jx` inner)
    pub fn cell_dofs_scalar(&self, cx: usize, cy: usize) -> Vec<usize> {
        let p = self.element.degree;
        let nd = p + 1;
        let mut dofs = Vec::with_capacity(nd * nd);
        if self.element.is_dg {
            let base = (cy * self.n_cells_1d + cx) * nd * nd;
            for j in 0..nd * nd {
                dofs.push(base + j);
            }
        } else {
            let n1d = self.n_nodes_1d();
            for jy in 0..nd {
                for jx in 0..nd {
                    dofs.push((cy * p + jy) * n1d + cx * p + jx);
                }
            }
        }
        dofs
    }

    /// Global dof indices of cell `(cx, cy)`, all components
    pub fn cell_dofs(&self, cx: usize, cy: usize) -> Vec<usize> {
        let scalar = self.cell_dofs_scalar(cx, cy);
        let mut dofs = Vec::with_capacity(scalar.len() * self.element.n_components);
        for comp in 0..self.element.n_components {
            let offset = comp * self.n_scalar_dofs;
            dofs.extend(scalar.iter().map(|&d| d + offset));
        }
        dofs
    }

    /// Scalar dofs located on the given boundary (continuous layout;
    /// discontinuous spaces carry their boundary data weakly and
    /// return an empty set)
    pub fn boundary_dofs_scalar(&self, boundary: BoundaryId) -> Vec<usize> {
        if self.element.is_dg {
            return Vec::new();
        }
        let n1d = self.n_nodes_1d();
        let mut dofs = Vec::with_capacity(n1d);
        for i in 0..n1d {
            let (ix, iy) = match boundary {
                BOUNDARY_LEFT => (0, i),
                BOUNDARY_RIGHT => (n1d - 1, i),
                BOUNDARY_BOTTOM => (i, 0),
                BOUNDARY_TOP => (i, n1d - 1),
                _ => panic!("unknown boundary id {}", boundary),
            };
            dofs.push(iy * n1d + ix);
        }
        dofs
    }
}
