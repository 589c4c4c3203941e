//! Constraint sets for the per-level discretizations
//!
//! The multigrid preconditioner only ever sees the homogeneous
//! operator, so user-supplied Dirichlet data is homogenized to zero
//! constraints on the affected boundary dofs. Periodic face pairs are
//! expressed as identity constraints tying the dofs of one face to the
//! matching dofs of the opposite face. Discontinuous spaces carry
//! their boundary conditions weakly and produce empty constraint sets.

use crate::dof::{BoundaryId, DofHandler, BOUNDARY_BOTTOM, BOUNDARY_LEFT, BOUNDARY_RIGHT, BOUNDARY_TOP};
use crate::types::DofVector;
use std::collections::BTreeSet;

/// A pair of boundaries identified periodically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicFacePair {
    /// Master face; its dofs stay unconstrained
    pub master: BoundaryId,
    /// Slave face; its dofs are tied to the master face
    pub slave: BoundaryId,
}

/// Homogeneous Dirichlet boundary ids, as supplied by the application
/// layer (the attached boundary values are irrelevant here since the
/// preconditioner approximates the homogeneous operator)
pub type DirichletBc = BTreeSet<BoundaryId>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum DofConstraint {
    Free,
    Zero,
    IdentityTo(usize),
}

/// Constraints on a single level's dof layout
#[derive(Debug, Clone)]
pub struct Constraints {
    kinds: Vec<DofConstraint>,
    n_constraints: usize,
}

impl Constraints {
    /// Empty constraint set on `n_dofs` dofs
    pub fn empty(n_dofs: usize) -> Self {
        Self {
            kinds: vec![DofConstraint::Free; n_dofs],
            n_constraints: 0,
        }
    }

    /// Build the level constraint set: zero constraints on all
    /// Dirichlet boundaries plus identity constraints for periodic
    /// face pairs.
    ///
    /// # Panics
    /// If a periodic pair is not an opposite-face pair of the unit
    /// square.
    pub fn new(
        dof_handler: &DofHandler,
        dirichlet_bc: &DirichletBc,
        periodic_face_pairs: &[PeriodicFacePair],
    ) -> Self {
        let n_scalar = dof_handler.n_scalar_dofs();
        let n_components = dof_handler.element().n_components;
        let mut kinds = vec![DofConstraint::Free; n_scalar * n_components];

        for pair in periodic_face_pairs {
            let valid = (pair.master == BOUNDARY_LEFT && pair.slave == BOUNDARY_RIGHT)
                || (pair.master == BOUNDARY_BOTTOM && pair.slave == BOUNDARY_TOP);
            assert!(
                valid,
                "periodic pair ({}, {}) is not an opposite-face pair",
                pair.master, pair.slave
            );
            let masters = dof_handler.boundary_dofs_scalar(pair.master);
            let slaves = dof_handler.boundary_dofs_scalar(pair.slave);
            for comp in 0..n_components {
                let offset = comp * n_scalar;
                for (&m, &s) in masters.iter().zip(slaves.iter()) {
                    kinds[s + offset] = DofConstraint::IdentityTo(m + offset);
                }
            }
        }

        for &boundary in dirichlet_bc {
            for dof in dof_handler.boundary_dofs_scalar(boundary) {
                for comp in 0..n_components {
                    kinds[dof + comp * n_scalar] = DofConstraint::Zero;
                }
            }
        }

        // resolve identity chains, at most length two for
        // opposite-face pairs (corner of a doubly periodic mesh)
        let resolved: Vec<DofConstraint> = kinds
            .iter()
            .map(|&k| match k {
                DofConstraint::IdentityTo(m) => match kinds[m] {
                    DofConstraint::Free => k,
                    DofConstraint::Zero => DofConstraint::Zero,
                    DofConstraint::IdentityTo(m2) => match kinds[m2] {
                        DofConstraint::Zero => DofConstraint::Zero,
                        _ => DofConstraint::IdentityTo(m2),
                    },
                },
                other => other,
            })
            .collect();

        let n_constraints = resolved
            .iter()
            .filter(|k| !matches!(k, DofConstraint::Free))
            .count();
        Self {
            kinds: resolved,
            n_constraints,
        }
    }

    /// Number of dofs this constraint set covers
    pub fn n_dofs(&self) -> usize {
        self.kinds.len()
    }

    /// Number of constrained dofs
    pub fn n_constraints(&self) -> usize {
        self.n_constraints
    }

    /// Whether dof `i` is constrained
    pub fn is_constrained(&self, i: usize) -> bool {
        !matches!(self.kinds[i], DofConstraint::Free)
    }

    /// Resolve dof `i` for assembly: the master dof that carries its
    /// value, or `None` if the dof is constrained to zero
    pub fn resolve(&self, i: usize) -> Option<usize> {
        match self.kinds[i] {
            DofConstraint::Free => Some(i),
            DofConstraint::Zero => None,
            DofConstraint::IdentityTo(m) => Some(m),
        }
    }

    /// Zero out all constrained entries
    pub fn set_zero(&self, v: &mut DofVector) {
        for (i, k) in self.kinds.iter().enumerate() {
            if !matches!(k, DofConstraint::Free) {
                v[i] = 0.0;
            }
        }
    }

    /// Copy master values into slave entries and zero Dirichlet
    /// entries, producing a vector consistent with the constraints
    pub fn distribute(&self, v: &mut DofVector) {
        for (i, k) in self.kinds.iter().enumerate() {
            match *k {
                DofConstraint::Free => {}
                DofConstraint::Zero => v[i] = 0.0,
                DofConstraint::IdentityTo(m) => v[i] = v[m],
            }
        }
    }

    /// Fold slave contributions back into their masters and install
    /// identity rows on constrained entries (`dst[i] = src[i]`), the
    /// standard treatment after a matrix-free cell loop
    pub fn condense_result(&self, dst: &mut DofVector, src: &DofVector) {
        for (i, k) in self.kinds.iter().enumerate() {
            if let DofConstraint::IdentityTo(m) = *k {
                let contrib = dst[i];
                dst[m] += contrib;
            }
        }
        for (i, k) in self.kinds.iter().enumerate() {
            if !matches!(k, DofConstraint::Free) {
                dst[i] = src[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::grid::{DistributedMesh, SerialMesh};
    use std::rc::Rc;

    fn handler(degree: usize, is_dg: bool) -> DofHandler {
        let mut m = SerialMesh::unit_square();
        m.refine_global(1);
        let mesh = Rc::new(DistributedMesh::from_serial(m, 1));
        DofHandler::new(mesh, Element::new(degree, is_dg, 1), 1)
    }

    #[test]
    fn dirichlet_on_all_boundaries() {
        let dh = handler(1, false);
        let bc: DirichletBc = [0, 1, 2, 3].iter().copied().collect();
        let c = Constraints::new(&dh, &bc, &[]);
        // 3x3 grid, only the center node is free
        assert_eq!(c.n_constraints(), 8);
        assert!(!c.is_constrained(4));
        let mut v = DofVector::ones(9);
        c.set_zero(&mut v);
        assert_eq!(v.sum(), 1.0);
    }

    #[test]
    fn dg_space_has_no_constraints() {
        let dh = handler(2, true);
        let bc: DirichletBc = [0, 1, 2, 3].iter().copied().collect();
        let c = Constraints::new(&dh, &bc, &[]);
        assert_eq!(c.n_constraints(), 0);
    }

    #[test]
    fn periodic_identifies_opposite_faces() {
        let dh = handler(1, false);
        let pairs = [PeriodicFacePair {
            master: BOUNDARY_LEFT,
            slave: BOUNDARY_RIGHT,
        }];
        let c = Constraints::new(&dh, &BTreeSet::new(), &pairs);
        assert_eq!(c.n_constraints(), 3);
        let mut v = DofVector::from_iter((0..9).map(|i| i as f64));
        c.distribute(&mut v);
        // right edge nodes 2, 5, 8 take values of left edge 0, 3, 6
        assert_eq!(v[2], 0.0);
        assert_eq!(v[5], 3.0);
        assert_eq!(v[8], 6.0);
    }

    #[test]
    fn condense_installs_identity_rows() {
        let dh = handler(1, false);
        let bc: DirichletBc = [BOUNDARY_LEFT].iter().copied().collect();
        let c = Constraints::new(&dh, &bc, &[]);
        let src = DofVector::from_elem(9, 2.0);
        let mut dst = DofVector::ones(9);
        c.condense_result(&mut dst, &src);
        assert_eq!(dst[0], 2.0);
        assert_eq!(dst[3], 2.0);
        assert_eq!(dst[1], 1.0);
    }
}
