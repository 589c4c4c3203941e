//! Intergrid transfer operators
//!
//! A [`LevelTransfer`] connects two consecutive levels that differ in
//! exactly one attribute: mesh level (h-transfer), polynomial degree
//! (p-transfer) or continuity (c-transfer). Prolongation embeds the
//! coarse space into the fine one by nodal interpolation; restriction
//! is the least-squares left inverse of the prolongation, so that
//! restricting a prolongated coarse vector reproduces it exactly.
//!
//! Values on continuous spaces are scattered and gathered cellwise and
//! averaged by the number of cells touching each dof.

use crate::element::{gauss_lobatto, interpolation_matrix, kron};
use crate::matrix_free::MatrixFreeContext;
use crate::solver::utils::gauss_jordan_inverse;
use crate::types::DofVector;
use ndarray::{s, Array1, Array2};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    H,
    P,
    C,
}

/// Cellwise prolongation/restriction pair
#[derive(Debug, Clone)]
struct TransferBlock {
    prolong: Array2<f64>,
    restrict: Array2<f64>,
}

/// Transfer between two consecutive multigrid levels
#[derive(Debug, Clone)]
pub struct LevelTransfer {
    coarse: Rc<MatrixFreeContext>,
    fine: Rc<MatrixFreeContext>,
    kind: TransferKind,
    blocks: Vec<TransferBlock>,
    /// (coarse cell, fine cell, block) triples, cells as (cx, cy)
    pairs: Vec<((usize, usize), (usize, usize), usize)>,
    /// Cells touching each fine scalar dof
    fine_touch: Array1<f64>,
    /// Cells touching each coarse scalar dof
    coarse_touch: Array1<f64>,
}

impl LevelTransfer {
    /// Build the transfer between a coarse and a fine level context.
    ///
    /// # Panics
    /// If the two levels differ in more or less than one attribute,
    /// or if an h-transfer does not connect a mesh to its uniform
    /// refinement.
    pub fn new(coarse: Rc<MatrixFreeContext>, fine: Rc<MatrixFreeContext>) -> Self {
        let ec = *coarse.dof_handler.element();
        let ef = *fine.dof_handler.element();
        assert_eq!(
            ec.n_components, ef.n_components,
            "transfer must preserve the number of components"
        );
        let h_change = coarse.dof_handler.h_level() != fine.dof_handler.h_level();
        let p_change = ec.degree != ef.degree;
        let c_change = ec.is_dg != ef.is_dg;
        let n_changes =
            usize::from(h_change) + usize::from(p_change) + usize::from(c_change);
        assert!(
            n_changes == 1,
            "a level transfer handles exactly one of h, p and c, found {} changes",
            n_changes
        );

        let (kind, blocks, pairs) = if h_change {
            Self::build_h(&coarse, &fine, ec.degree)
        } else if p_change {
            assert!(
                ef.degree > ec.degree,
                "p-transfer must go from low to high degree"
            );
            Self::build_p(&coarse, &fine)
        } else {
            assert!(
                ef.is_dg && !ec.is_dg,
                "c-transfer goes from a continuous to a discontinuous space"
            );
            Self::build_c(&coarse, &fine)
        };

        let fine_touch = touch_counts(&fine, &pairs, |(_, f, _)| *f);
        let coarse_touch = touch_counts(&coarse, &pairs, |(c, _, _)| *c);

        Self {
            coarse,
            fine,
            kind,
            blocks,
            pairs,
            fine_touch,
            coarse_touch,
        }
    }

    fn build_p(
        coarse: &MatrixFreeContext,
        fine: &MatrixFreeContext,
    ) -> (
        TransferKind,
        Vec<TransferBlock>,
        Vec<((usize, usize), (usize, usize), usize)>,
    ) {
        let (pts_c, _) = gauss_lobatto::<f64>(coarse.dof_handler.element().n_dofs_1d());
        let (pts_f, _) = gauss_lobatto::<f64>(fine.dof_handler.element().n_dofs_1d());
        let p1 = interpolation_matrix(&pts_c, &pts_f);
        let r1 = pseudo_inverse(&p1);
        let blocks = vec![TransferBlock {
            prolong: kron(&p1, &p1),
            restrict: kron(&r1, &r1),
        }];
        let n = coarse.dof_handler.n_cells_1d();
        let mut pairs = Vec::with_capacity(n * n);
        for cy in 0..n {
            for cx in 0..n {
                pairs.push(((cx, cy), (cx, cy), 0));
            }
        }
        (TransferKind::P, blocks, pairs)
    }

    fn build_h(
        coarse: &MatrixFreeContext,
        fine: &MatrixFreeContext,
        degree: usize,
    ) -> (
        TransferKind,
        Vec<TransferBlock>,
        Vec<((usize, usize), (usize, usize), usize)>,
    ) {
        let nc = coarse.dof_handler.n_cells_1d();
        let nf = fine.dof_handler.n_cells_1d();
        assert!(
            nf == 2 * nc,
            "h-transfer expects the uniform refinement of the coarse mesh"
        );

        let n = degree + 1;
        let (pts, _) = gauss_lobatto::<f64>(n);
        // two-child embedding: coarse basis evaluated on the left and
        // right half of the cell
        let child = |s: f64| {
            let to = pts.mapv(|x| (x + s) / 2.0);
            interpolation_matrix(&pts, &to)
        };
        let p1 = [child(0.0), child(1.0)];
        let mut stacked = Array2::<f64>::zeros((2 * n, n));
        stacked.slice_mut(s![0..n, ..]).assign(&p1[0]);
        stacked.slice_mut(s![n..2 * n, ..]).assign(&p1[1]);
        let r_full = pseudo_inverse(&stacked);
        let r1 = [
            r_full.slice(s![.., 0..n]).to_owned(),
            r_full.slice(s![.., n..2 * n]).to_owned(),
        ];

        let mut blocks = Vec::with_capacity(4);
        for sy in 0..2 {
            for sx in 0..2 {
                blocks.push(TransferBlock {
                    prolong: kron(&p1[sy], &p1[sx]),
                    restrict: kron(&r1[sy], &r1[sx]),
                });
            }
        }

        let mut pairs = Vec::with_capacity(4 * nc * nc);
        for cy in 0..nc {
            for cx in 0..nc {
                for sy in 0..2 {
                    for sx in 0..2 {
                        pairs.push(((cx, cy), (2 * cx + sx, 2 * cy + sy), sy * 2 + sx));
                    }
                }
            }
        }
        (TransferKind::H, blocks, pairs)
    }

    fn build_c(
        coarse: &MatrixFreeContext,
        _fine: &MatrixFreeContext,
    ) -> (
        TransferKind,
        Vec<TransferBlock>,
        Vec<((usize, usize), (usize, usize), usize)>,
    ) {
        // nodes coincide; duplication and averaging is handled by the
        // touch counts
        let n = coarse.dof_handler.element().n_dofs_per_cell_scalar();
        let blocks = vec![TransferBlock {
            prolong: Array2::eye(n),
            restrict: Array2::eye(n),
        }];
        let nc = coarse.dof_handler.n_cells_1d();
        let mut pairs = Vec::with_capacity(nc * nc);
        for cy in 0..nc {
            for cx in 0..nc {
                pairs.push(((cx, cy), (cx, cy), 0));
            }
        }
        (TransferKind::C, blocks, pairs)
    }

    /// Whether this transfer changes the mesh level
    pub fn is_h_transfer(&self) -> bool {
        self.kind == TransferKind::H
    }

    /// Coarse-side context
    pub fn coarse_context(&self) -> &Rc<MatrixFreeContext> {
        &self.coarse
    }

    /// Fine-side context
    pub fn fine_context(&self) -> &Rc<MatrixFreeContext> {
        &self.fine
    }

    /// Interpolate a coarse vector into the fine space, overwriting
    /// `dst`
    pub fn prolongate(&self, dst: &mut DofVector, src: &DofVector) {
        let mut src_eff = src.clone();
        self.coarse.constraints.distribute(&mut src_eff);

        let n_components = self.coarse.dof_handler.element().n_components;
        let n_scalar_f = self.fine.dof_handler.n_scalar_dofs();
        let n_scalar_c = self.coarse.dof_handler.n_scalar_dofs();

        dst.fill(0.0);
        for &((ccx, ccy), (fcx, fcy), b) in &self.pairs {
            let m = &self.blocks[b].prolong;
            let cdofs = self.coarse.dof_handler.cell_dofs_scalar(ccx, ccy);
            let fdofs = self.fine.dof_handler.cell_dofs_scalar(fcx, fcy);
            for comp in 0..n_components {
                let co = comp * n_scalar_c;
                let fo = comp * n_scalar_f;
                for (i, &fd) in fdofs.iter().enumerate() {
                    let mut v = 0.0;
                    for (j, &cd) in cdofs.iter().enumerate() {
                        v += m[[i, j]] * src_eff[cd + co];
                    }
                    dst[fd + fo] += v;
                }
            }
        }
        average(dst, &self.fine_touch, n_scalar_f, n_components);
        self.fine.constraints.set_zero(dst);
    }

    /// Prolongate and add the result onto `dst` (the correction update
    /// of the V-cycle)
    pub fn prolongate_and_add(&self, dst: &mut DofVector, src: &DofVector) {
        let mut tmp = DofVector::zeros(dst.len());
        self.prolongate(&mut tmp, src);
        *dst += &tmp;
    }

    /// Restrict a fine vector onto the coarse space, overwriting `dst`
    pub fn restrict(&self, dst: &mut DofVector, src: &DofVector) {
        let mut src_eff = src.clone();
        self.fine.constraints.set_zero(&mut src_eff);

        let n_components = self.coarse.dof_handler.element().n_components;
        let n_scalar_f = self.fine.dof_handler.n_scalar_dofs();
        let n_scalar_c = self.coarse.dof_handler.n_scalar_dofs();

        dst.fill(0.0);
        for &((ccx, ccy), (fcx, fcy), b) in &self.pairs {
            let m = &self.blocks[b].restrict;
            let cdofs = self.coarse.dof_handler.cell_dofs_scalar(ccx, ccy);
            let fdofs = self.fine.dof_handler.cell_dofs_scalar(fcx, fcy);
            for comp in 0..n_components {
                let co = comp * n_scalar_c;
                let fo = comp * n_scalar_f;
                for (i, &cd) in cdofs.iter().enumerate() {
                    let mut v = 0.0;
                    for (j, &fd) in fdofs.iter().enumerate() {
                        v += m[[i, j]] * src_eff[fd + fo];
                    }
                    dst[cd + co] += v;
                }
            }
        }
        average(dst, &self.coarse_touch, n_scalar_c, n_components);
        self.coarse.constraints.set_zero(dst);
    }
}

/// Divide each dof by the number of cells that wrote to it
fn average(v: &mut DofVector, touch: &Array1<f64>, n_scalar: usize, n_components: usize) {
    for comp in 0..n_components {
        let off = comp * n_scalar;
        for i in 0..n_scalar {
            v[off + i] /= touch[i];
        }
    }
}

fn touch_counts(
    ctx: &MatrixFreeContext,
    pairs: &[((usize, usize), (usize, usize), usize)],
    select: impl Fn(&((usize, usize), (usize, usize), usize)) -> (usize, usize),
) -> Array1<f64> {
    let mut touch = Array1::<f64>::zeros(ctx.dof_handler.n_scalar_dofs());
    let mut seen = std::collections::HashSet::new();
    for pair in pairs {
        let (cx, cy) = select(pair);
        if !seen.insert((cx, cy)) {
            continue;
        }
        for dof in ctx.dof_handler.cell_dofs_scalar(cx, cy) {
            touch[dof] += 1.0;
        }
    }
    touch
}

/// Least-squares left inverse `(P^T P)^{-1} P^T`
fn pseudo_inverse(p: &Array2<f64>) -> Array2<f64> {
    let pt = p.t().to_owned();
    let gram = pt.dot(p);
    gauss_jordan_inverse(&gram).dot(&pt)
}

/// Transfer across the whole hierarchy; `transfers[l]` connects level
/// `l` (coarse) to level `l + 1` (fine).
///
/// The two variants apply transfers identically; they differ in how
/// their level discretizations were constructed (independently
/// coarsened meshes versus the refinement levels of one mesh).
#[derive(Debug, Clone)]
pub enum TransferOperator {
    /// Levels built on independently partitioned coarse meshes
    GlobalCoarsening(Vec<LevelTransfer>),
    /// Levels built on the refinement hierarchy of the fine mesh
    GlobalRefinement(Vec<LevelTransfer>),
}

impl TransferOperator {
    fn transfers(&self) -> &[LevelTransfer] {
        match self {
            Self::GlobalCoarsening(t) | Self::GlobalRefinement(t) => t,
        }
    }

    /// Number of levels connected by this operator
    pub fn n_levels(&self) -> usize {
        self.transfers().len() + 1
    }

    /// Prolongate from level `fine_level - 1`, overwriting the fine
    /// vector
    pub fn prolongate(&self, fine_level: usize, dst: &mut DofVector, src: &DofVector) {
        self.transfers()[fine_level - 1].prolongate(dst, src);
    }

    /// Prolongate from level `fine_level - 1` and add onto the fine
    /// vector
    pub fn prolongate_and_add(&self, fine_level: usize, dst: &mut DofVector, src: &DofVector) {
        self.transfers()[fine_level - 1].prolongate_and_add(dst, src);
    }

    /// Restrict from level `fine_level` down to `fine_level - 1`
    pub fn restrict(&self, fine_level: usize, dst: &mut DofVector, src: &DofVector) {
        self.transfers()[fine_level - 1].restrict(dst, src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::Constraints;
    use crate::dof::DofHandler;
    use crate::element::Element;
    use crate::grid::{DistributedMesh, SerialMesh};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn context(degree: usize, is_dg: bool, levels: usize) -> Rc<MatrixFreeContext> {
        let mut m = SerialMesh::unit_square();
        m.refine_global(levels);
        let mesh = Rc::new(DistributedMesh::from_serial(m, 1));
        let dh = Rc::new(DofHandler::new(
            mesh.clone(),
            Element::new(degree, is_dg, 1),
            levels,
        ));
        let constraints = Rc::new(Constraints::empty(dh.n_dofs()));
        Rc::new(MatrixFreeContext::reinit(mesh, dh, constraints, degree + 1))
    }

    fn round_trip(transfer: &LevelTransfer) {
        let nc = transfer.coarse_context().n_dofs();
        let nf = transfer.fine_context().n_dofs();
        let v = DofVector::random(nc, Uniform::new(-1.0, 1.0));
        let mut fine = DofVector::zeros(nf);
        transfer.prolongate(&mut fine, &v);
        let mut back = DofVector::zeros(nc);
        transfer.restrict(&mut back, &fine);
        for i in 0..nc {
            assert!(
                (back[i] - v[i]).abs() < 1e-12,
                "dof {}: {} vs {}",
                i,
                back[i],
                v[i]
            );
        }
    }

    #[test]
    fn p_transfer_round_trip_dg() {
        let t = LevelTransfer::new(context(2, true, 1), context(5, true, 1));
        round_trip(&t);
    }

    #[test]
    fn p_transfer_round_trip_continuous() {
        let t = LevelTransfer::new(context(1, false, 2), context(3, false, 2));
        round_trip(&t);
    }

    #[test]
    fn h_transfer_round_trip_dg() {
        let t = LevelTransfer::new(context(2, true, 1), context(2, true, 2));
        assert!(t.is_h_transfer());
        round_trip(&t);
    }

    #[test]
    fn h_transfer_round_trip_continuous() {
        let t = LevelTransfer::new(context(3, false, 1), context(3, false, 2));
        round_trip(&t);
    }

    #[test]
    fn c_transfer_round_trip() {
        let t = LevelTransfer::new(context(2, false, 2), context(2, true, 2));
        round_trip(&t);
    }

    #[test]
    fn prolongation_preserves_polynomials() {
        // degree-2 coarse polynomials live exactly in the degree-4 space
        let coarse = context(2, true, 1);
        let fine = context(4, true, 1);
        let t = LevelTransfer::new(coarse.clone(), fine.clone());

        // nodal values of x^2 on the coarse level
        let (pts, _) = gauss_lobatto::<f64>(3);
        let dh = &coarse.dof_handler;
        let mut v = DofVector::zeros(coarse.n_dofs());
        for cy in 0..dh.n_cells_1d() {
            for cx in 0..dh.n_cells_1d() {
                let dofs = dh.cell_dofs_scalar(cx, cy);
                for jy in 0..3 {
                    for jx in 0..3 {
                        let x = (cx as f64 + pts[jx]) / dh.n_cells_1d() as f64;
                        v[dofs[jy * 3 + jx]] = x * x;
                    }
                }
            }
        }

        let mut fine_v = DofVector::zeros(fine.n_dofs());
        t.prolongate(&mut fine_v, &v);

        let (pts_f, _) = gauss_lobatto::<f64>(5);
        let dhf = &fine.dof_handler;
        for cy in 0..dhf.n_cells_1d() {
            for cx in 0..dhf.n_cells_1d() {
                let dofs = dhf.cell_dofs_scalar(cx, cy);
                for jy in 0..5 {
                    for jx in 0..5 {
                        let x = (cx as f64 + pts_f[jx]) / dhf.n_cells_1d() as f64;
                        assert!((fine_v[dofs[jy * 5 + jx]] - x * x).abs() < 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "exactly one")]
    fn rejects_combined_h_and_p_change() {
        LevelTransfer::new(context(2, true, 1), context(3, true, 2));
    }
}
