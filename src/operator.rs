//! Discrete per-level operators
//!
//! The multigrid infrastructure is generic over [`MultigridOperator`],
//! the small interface the production operator kernels expose: apply,
//! inverse diagonal, vector creation, and an update hook for
//! time-dependent coefficients. [`HelmholtzOperator`] is the concrete
//! operator used for the implicit-diffusion and pressure subproblems:
//! `shift * mass + laplacian`, applied matrix-free through tensorized
//! 1-d reference-cell matrices on Gauss-Lobatto collocation points.

use crate::element::{diff_matrix, gauss_lobatto};
use crate::matrix_free::MatrixFreeContext;
use crate::types::DofVector;
use ndarray::{Array1, Array2};
use sprs::{CsMat, TriMat};
use std::rc::Rc;

/// Interface of a discrete operator on one multigrid level
pub trait MultigridOperator {
    /// Number of dofs of this operator's vector space
    fn n_dofs(&self) -> usize;

    /// Create a zeroed vector of the right size
    fn initialize_dof_vector(&self) -> DofVector {
        DofVector::zeros(self.n_dofs())
    }

    /// Matrix-vector application `dst = A src`
    fn vmult(&self, dst: &mut DofVector, src: &DofVector);

    /// Fill `diag` with the inverse of the operator diagonal
    fn calculate_inverse_diagonal(&self, diag: &mut DofVector);

    /// Refresh the zeroth-order coefficient (e.g. after a time-step
    /// size or linearization change)
    fn update_shift(&mut self, shift: f64);

    /// Assemble the operator as a sparse matrix, if supported.
    ///
    /// Only required when an algebraic-multigrid coarse solver or
    /// preconditioner is configured.
    fn assemble_sparse_matrix(&self) -> Option<CsMat<f64>> {
        None
    }
}

/// `shift * mass + laplacian` on one level, matrix-free
#[derive(Debug, Clone)]
pub struct HelmholtzOperator {
    ctx: Rc<MatrixFreeContext>,
    shift: f64,
    /// Reference quadrature weights (nodal, collocated)
    weights: Array1<f64>,
    /// Reference 1-d stiffness matrix, `k[[i,j]] = sum_q w_q l_i' l_j'`
    stiff_ref: Array2<f64>,
    /// Cell width of this level
    h: f64,
}

impl HelmholtzOperator {
    /// Build the operator on a level context.
    ///
    /// # Panics
    /// If the context requests a quadrature different from the nodal
    /// collocation rule (the only rule the tensorized kernels support).
    pub fn new(ctx: Rc<MatrixFreeContext>, shift: f64) -> Self {
        let p = ctx.dof_handler.element().degree;
        assert_eq!(
            ctx.n_q_points_1d,
            p + 1,
            "tensorized kernels use nodal collocation quadrature"
        );
        let (points, weights) = gauss_lobatto::<f64>(p + 1);
        let d = diff_matrix(&points);
        let n = p + 1;
        let mut stiff_ref = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                let mut s = 0.0;
                for q in 0..n {
                    s += weights[q] * d[[q, i]] * d[[q, j]];
                }
                stiff_ref[[i, j]] = s;
            }
        }
        let h = 1.0 / ctx.dof_handler.n_cells_1d() as f64;
        Self {
            ctx,
            shift,
            weights,
            stiff_ref,
            h,
        }
    }

    /// The level context this operator was built on
    pub fn context(&self) -> &Rc<MatrixFreeContext> {
        &self.ctx
    }

    /// Current zeroth-order coefficient
    pub fn shift(&self) -> f64 {
        self.shift
    }

    /// Local cell matrix entry for local nodes `(jy, jx)` and `(ky, kx)`
    fn local_entry(&self, jy: usize, jx: usize, ky: usize, kx: usize) -> f64 {
        let w = &self.weights;
        let mut v = 0.0;
        if jy == ky && jx == kx {
            v += self.shift * self.h * self.h * w[jy] * w[jx];
        }
        if jy == ky {
            v += w[jy] * self.stiff_ref[[jx, kx]];
        }
        if jx == kx {
            v += w[jx] * self.stiff_ref[[jy, ky]];
        }
        v
    }
}

impl MultigridOperator for HelmholtzOperator {
    fn n_dofs(&self) -> usize {
        self.ctx.n_dofs()
    }

    fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
        let dh = &self.ctx.dof_handler;
        let element = dh.element();
        let nd = element.n_dofs_1d();
        let n_cells = dh.n_cells_1d();
        let w = &self.weights;
        let mass_2d = self.shift * self.h * self.h;

        let mut src_eff = src.clone();
        self.ctx.constraints.distribute(&mut src_eff);

        dst.fill(0.0);
        let mut u = Array2::<f64>::zeros((nd, nd));
        for cy in 0..n_cells {
            for cx in 0..n_cells {
                let dofs = dh.cell_dofs(cx, cy);
                for comp in 0..element.n_components {
                    let off = comp * nd * nd;
                    for jy in 0..nd {
                        for jx in 0..nd {
                            u[[jy, jx]] = src_eff[dofs[off + jy * nd + jx]];
                        }
                    }
                    // stiffness along x and y; stiff_ref is symmetric
                    let tx = u.dot(&self.stiff_ref);
                    let ty = self.stiff_ref.dot(&u);
                    for jy in 0..nd {
                        for jx in 0..nd {
                            let v = mass_2d * w[jy] * w[jx] * u[[jy, jx]]
                                + w[jy] * tx[[jy, jx]]
                                + w[jx] * ty[[jy, jx]];
                            dst[dofs[off + jy * nd + jx]] += v;
                        }
                    }
                }
            }
        }
        self.ctx.constraints.condense_result(dst, src);
    }

    fn calculate_inverse_diagonal(&self, diag: &mut DofVector) {
        let dh = &self.ctx.dof_handler;
        let element = dh.element();
        let nd = element.n_dofs_1d();
        let n_cells = dh.n_cells_1d();

        diag.fill(0.0);
        for cy in 0..n_cells {
            for cx in 0..n_cells {
                let dofs = dh.cell_dofs(cx, cy);
                for comp in 0..element.n_components {
                    let off = comp * nd * nd;
                    for jy in 0..nd {
                        for jx in 0..nd {
                            diag[dofs[off + jy * nd + jx]] +=
                                self.local_entry(jy, jx, jy, jx);
                        }
                    }
                }
            }
        }
        for i in 0..diag.len() {
            if self.ctx.constraints.is_constrained(i) {
                diag[i] = 1.0;
            }
            diag[i] = 1.0 / diag[i];
        }
    }

    fn update_shift(&mut self, shift: f64) {
        self.shift = shift;
    }

    fn assemble_sparse_matrix(&self) -> Option<CsMat<f64>> {
        let dh = &self.ctx.dof_handler;
        let constraints = &self.ctx.constraints;
        let element = dh.element();
        let nd = element.n_dofs_1d();
        let n_cells = dh.n_cells_1d();
        let n = self.n_dofs();

        let mut tri = TriMat::new((n, n));
        for cy in 0..n_cells {
            for cx in 0..n_cells {
                let dofs = dh.cell_dofs(cx, cy);
                for comp in 0..element.n_components {
                    let off = comp * nd * nd;
                    for jy in 0..nd {
                        for jx in 0..nd {
                            let row = match constraints.resolve(dofs[off + jy * nd + jx]) {
                                Some(r) => r,
                                None => continue,
                            };
                            for ky in 0..nd {
                                for kx in 0..nd {
                                    let col =
                                        match constraints.resolve(dofs[off + ky * nd + kx]) {
                                            Some(c) => c,
                                            None => continue,
                                        };
                                    let v = self.local_entry(jy, jx, ky, kx);
                                    if v != 0.0 {
                                        tri.add_triplet(row, col, v);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        for i in 0..n {
            if constraints.is_constrained(i) {
                tri.add_triplet(i, i, 1.0);
            }
        }
        Some(tri.to_csr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{Constraints, DirichletBc};
    use crate::dof::DofHandler;
    use crate::element::Element;
    use crate::grid::{DistributedMesh, SerialMesh};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn context(degree: usize, is_dg: bool, levels: usize, dirichlet: bool) -> Rc<MatrixFreeContext> {
        let mut m = SerialMesh::unit_square();
        m.refine_global(levels);
        let mesh = Rc::new(DistributedMesh::from_serial(m, 1));
        let dh = Rc::new(DofHandler::new(
            mesh.clone(),
            Element::new(degree, is_dg, 1),
            levels,
        ));
        let bc: DirichletBc = if dirichlet {
            [0, 1, 2, 3].iter().copied().collect()
        } else {
            DirichletBc::new()
        };
        let constraints = Rc::new(Constraints::new(&dh, &bc, &[]));
        Rc::new(MatrixFreeContext::reinit(
            mesh,
            dh,
            constraints,
            degree + 1,
        ))
    }

    #[test]
    fn laplacian_annihilates_constants() {
        let op = HelmholtzOperator::new(context(3, false, 2, false), 0.0);
        let src = DofVector::ones(op.n_dofs());
        let mut dst = op.initialize_dof_vector();
        op.vmult(&mut dst, &src);
        for v in dst.iter() {
            assert!(v.abs() < 1e-11);
        }
    }

    #[test]
    fn diagonal_is_positive() {
        let op = HelmholtzOperator::new(context(2, true, 1, false), 1.0);
        let mut diag = op.initialize_dof_vector();
        op.calculate_inverse_diagonal(&mut diag);
        for v in diag.iter() {
            assert!(*v > 0.0);
        }
    }

    #[test]
    fn assembled_matrix_matches_matrix_free_apply() {
        let op = HelmholtzOperator::new(context(2, false, 1, true), 0.7);
        let n = op.n_dofs();
        let src = DofVector::random(n, Uniform::new(-1.0, 1.0));
        let mut dst = op.initialize_dof_vector();
        op.vmult(&mut dst, &src);

        let mat = op.assemble_sparse_matrix().unwrap();
        let mut dst_mat = DofVector::zeros(n);
        for (row, vec) in mat.outer_iterator().enumerate() {
            for (col, &val) in vec.iter() {
                dst_mat[row] += val * src[col];
            }
        }
        for i in 0..n {
            assert!((dst[i] - dst_mat[i]).abs() < 1e-10, "row {}", i);
        }
    }

    #[test]
    fn update_shift_changes_the_operator() {
        let mut op = HelmholtzOperator::new(context(1, true, 1, false), 0.0);
        let src = DofVector::ones(op.n_dofs());
        let mut before = op.initialize_dof_vector();
        op.vmult(&mut before, &src);
        op.update_shift(5.0);
        let mut after = op.initialize_dof_vector();
        op.vmult(&mut after, &src);
        assert!((&after - &before).iter().any(|v| v.abs() > 1e-12));
    }
}
