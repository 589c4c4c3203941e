//! Multigrid preconditioner setup and application
//!
//! Orchestrates the whole per-level construction: the coarse-mesh
//! sequence, the level sequencing over mesh size, degree and
//! continuity, a dof layout, constraint set and matrix-free context
//! per level, the discrete operators (supplied by a caller factory),
//! the smoothers and the coarse-grid solver, and the intergrid
//! transfer operators. The assembled [`MultigridAlgorithm`] is then
//! driven through [`MultigridPreconditioner::vmult`].

use super::algorithm::MultigridAlgorithm;
use super::coarse_grid::create_geometric_coarsening_sequence;
use super::coarse_solver::CoarseGridSolver;
use super::data::{CoarseGridPreconditioner, CoarseGridSolverType, MultigridData};
use super::levels::{check_levels, sequence_levels, LevelInfo};
use super::smoother::{create_smoother, Smoother};
use super::transfer::{LevelTransfer, TransferOperator};
use crate::communicator::Communicator;
use crate::constraints::{Constraints, DirichletBc, PeriodicFacePair};
use crate::dof::DofHandler;
use crate::element::Element;
use crate::grid::DistributedMesh;
use crate::matrix_free::MatrixFreeContext;
use crate::operator::MultigridOperator;
use crate::timer::TimerTree;
use crate::types::DofVector;
use log::debug;
use std::rc::Rc;

/// hp-multigrid preconditioner, generic over the level operator
pub struct MultigridPreconditioner<O: MultigridOperator> {
    data: MultigridData,
    levels: Vec<LevelInfo>,
    contexts: Vec<Rc<MatrixFreeContext>>,
    algorithm: MultigridAlgorithm<O>,
}

impl<O: MultigridOperator> MultigridPreconditioner<O> {
    /// Build the full hierarchy for the problem posed on `mesh` with
    /// the fine-level `element`.
    ///
    /// `build_operator` is called once per level, coarse to fine, with
    /// the level's matrix-free context and descriptor, and returns the
    /// discrete operator of that level.
    ///
    /// Dirichlet boundary ids and periodic face pairs may be omitted
    /// only when no level carries constraints, that is for a purely
    /// discontinuous hierarchy without an algebraic-multigrid coarse
    /// solve.
    ///
    /// # Panics
    /// On inconsistent configuration: constraint data missing while
    /// continuous levels, a continuity transfer or AMG are requested;
    /// periodic boundaries combined with global coarsening; a
    /// non-uniform mesh in global-refinement mode.
    pub fn new<C, F>(
        data: &MultigridData,
        mesh: &Rc<DistributedMesh>,
        element: &Element,
        dirichlet_bc: Option<&DirichletBc>,
        periodic_face_pairs: Option<&[PeriodicFacePair]>,
        comm: &C,
        mut build_operator: F,
    ) -> Self
    where
        C: Communicator,
        F: FnMut(&Rc<MatrixFreeContext>, &LevelInfo) -> O,
    {
        let mg_type = data.mg_type;
        let uses_amg = data.coarse_problem.solver == CoarseGridSolverType::Amg
            || data.coarse_problem.preconditioner == CoarseGridPreconditioner::Amg;
        let needs_constraint_data =
            !element.is_dg || mg_type.involves_c_transfer() || uses_amg;
        if needs_constraint_data {
            assert!(
                dirichlet_bc.is_some() && periodic_face_pairs.is_some(),
                "continuous levels, continuity coarsening and AMG need Dirichlet \
                 boundary ids and periodic face pairs"
            );
        }
        let periodic = periodic_face_pairs.unwrap_or(&[]);
        if data.use_global_coarsening {
            assert!(
                periodic.is_empty(),
                "periodic boundaries are not implemented for global coarsening"
            );
        } else if mg_type.involves_h_transfer() {
            assert!(
                mesh.is_uniform(),
                "global-refinement mode requires a uniformly refined mesh"
            );
        }

        // coarse level meshes (global-refinement mode reuses the fine
        // mesh and addresses its coarser levels directly)
        let coarse_meshes = if data.use_global_coarsening && mg_type.involves_h_transfer() {
            create_geometric_coarsening_sequence(
                mesh,
                comm,
                data.n_cells_per_process,
                data.max_process_shrink,
            )
        } else {
            Vec::new()
        };

        let n_h_levels = mesh.n_global_levels();
        let (levels, _dof_ids) = sequence_levels(n_h_levels, element.degree, element.is_dg, data);
        check_levels(&levels);
        debug!("multigrid hierarchy: {:?}", levels);

        // one dof layout, constraint set and matrix-free context per
        // level; meshes are shared between sibling levels
        let mut contexts: Vec<Rc<MatrixFreeContext>> = Vec::with_capacity(levels.len());
        for level in &levels {
            let h = level.h_level;
            let level_mesh = if coarse_meshes.is_empty() {
                Rc::clone(mesh)
            } else {
                Rc::clone(&coarse_meshes[h])
            };
            let level_element = element.with(level.degree(), level.is_dg());
            let dof_handler =
                Rc::new(DofHandler::new(Rc::clone(&level_mesh), level_element, h));
            let constraints = match dirichlet_bc {
                Some(bc) => Rc::new(Constraints::new(&dof_handler, bc, periodic)),
                None => Rc::new(Constraints::empty(dof_handler.n_dofs())),
            };
            let n_q_points_1d = level.degree() + 1;
            contexts.push(Rc::new(MatrixFreeContext::reinit(
                level_mesh,
                dof_handler,
                constraints,
                n_q_points_1d,
            )));
        }

        let operators: Vec<O> = contexts
            .iter()
            .zip(levels.iter())
            .map(|(ctx, level)| build_operator(ctx, level))
            .collect();

        let mut smoothers: Vec<Option<Smoother>> = vec![None];
        for (l, op) in operators.iter().enumerate().skip(1) {
            let block_size = contexts[l].dof_handler.element().n_dofs_per_cell();
            smoothers.push(Some(create_smoother(
                op,
                &data.smoother_data,
                block_size,
                l,
                data.operator_is_singular,
            )));
        }

        let coarse_block_size = contexts[0].dof_handler.element().n_dofs_per_cell();
        let coarse_solver = CoarseGridSolver::new(
            &operators[0],
            &data.coarse_problem,
            coarse_block_size,
            data.operator_is_singular,
        );

        let transfers: Vec<LevelTransfer> = (1..contexts.len())
            .map(|l| LevelTransfer::new(Rc::clone(&contexts[l - 1]), Rc::clone(&contexts[l])))
            .collect();
        let transfers = if data.use_global_coarsening {
            TransferOperator::GlobalCoarsening(transfers)
        } else {
            TransferOperator::GlobalRefinement(transfers)
        };

        let algorithm = MultigridAlgorithm::new(operators, smoothers, coarse_solver, transfers);

        Self {
            data: *data,
            levels,
            contexts,
            algorithm,
        }
    }

    /// Level descriptors, coarse to fine
    pub fn levels(&self) -> &[LevelInfo] {
        &self.levels
    }

    /// Number of levels in the hierarchy
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Matrix-free context of level `l`
    pub fn context(&self, l: usize) -> &Rc<MatrixFreeContext> {
        &self.contexts[l]
    }

    /// Number of dofs on the finest level
    pub fn n_dofs(&self) -> usize {
        self.contexts[self.contexts.len() - 1].n_dofs()
    }

    /// Apply one V-cycle to `src`
    pub fn vmult(&mut self, dst: &mut DofVector, src: &DofVector) {
        self.algorithm.vmult(dst, src);
    }

    /// Solve the fine-level problem by defect-correction iteration
    /// with one V-cycle per step, returning the number of cycles
    pub fn solve(&mut self, dst: &mut DofVector, src: &DofVector) -> usize {
        self.algorithm
            .solve(dst, src, &self.data.coarse_problem.solver_data)
    }

    /// Push a new shift parameter to every level operator and refresh
    /// the smoothers and the coarse solver, keeping the hierarchy
    pub fn update(&mut self, shift: f64) {
        for op in self.algorithm.operators_mut() {
            op.update_shift(shift);
        }
        self.algorithm.update(&self.data.coarse_problem);
    }

    /// Accumulated per-phase wall-clock timings
    pub fn get_timings(&self) -> &TimerTree {
        self.algorithm.timings()
    }

    /// Reset the accumulated timings
    pub fn clear_timings(&mut self) {
        self.algorithm.clear_timings();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communicator::SerialComm;
    use crate::dof::{BOUNDARY_BOTTOM, BOUNDARY_LEFT, BOUNDARY_RIGHT, BOUNDARY_TOP};
    use crate::grid::SerialMesh;
    use crate::multigrid::data::MultigridType;
    use crate::operator::HelmholtzOperator;

    fn mesh(levels: usize) -> Rc<DistributedMesh> {
        let mut m = SerialMesh::unit_square();
        m.refine_global(levels);
        Rc::new(DistributedMesh::from_serial(m, 1))
    }

    fn all_boundaries() -> DirichletBc {
        [BOUNDARY_LEFT, BOUNDARY_RIGHT, BOUNDARY_BOTTOM, BOUNDARY_TOP]
            .iter()
            .copied()
            .collect()
    }

    fn helmholtz(ctx: &Rc<MatrixFreeContext>, _level: &LevelInfo) -> HelmholtzOperator {
        HelmholtzOperator::new(Rc::clone(ctx), 1.0)
    }

    #[test]
    fn pure_h_hierarchy_on_twice_refined_square() {
        let data = MultigridData::default();
        let mut pre = MultigridPreconditioner::new(
            &data,
            &mesh(2),
            &Element::new(2, true, 1),
            None,
            None,
            &SerialComm,
            helmholtz,
        );
        assert_eq!(pre.n_levels(), 3);
        for (h, level) in pre.levels().iter().enumerate() {
            assert_eq!(level.h_level, h);
            assert_eq!(level.degree(), 2);
            assert!(level.is_dg());
        }

        let n = pre.n_dofs();
        let src = DofVector::zeros(n);
        let mut dst = DofVector::from_elem(n, 1.0);
        pre.vmult(&mut dst, &src);
        assert!(dst.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn continuous_hierarchy_carries_boundary_constraints() {
        let data = MultigridData::default();
        let bc = all_boundaries();
        let pre = MultigridPreconditioner::new(
            &data,
            &mesh(2),
            &Element::new(2, false, 1),
            Some(&bc),
            Some(&[]),
            &SerialComm,
            helmholtz,
        );
        for l in 0..pre.n_levels() {
            assert!(pre.context(l).constraints.n_constraints() > 0);
        }
    }

    #[test]
    fn vcycle_solve_converges_on_helmholtz() {
        let data = MultigridData::default();
        let bc = all_boundaries();
        let mut pre = MultigridPreconditioner::new(
            &data,
            &mesh(3),
            &Element::new(2, false, 1),
            Some(&bc),
            Some(&[]),
            &SerialComm,
            helmholtz,
        );

        let n = pre.n_dofs();
        let mut rhs = DofVector::from_iter((0..n).map(|i| ((i * 7) % 5) as f64 - 2.0));
        pre.context(pre.n_levels() - 1)
            .constraints
            .set_zero(&mut rhs);
        let mut x = DofVector::zeros(n);
        let n_cycles = pre.solve(&mut x, &rhs);
        assert!(n_cycles > 0);
        assert!(
            n_cycles < 30,
            "defect correction took {} cycles",
            n_cycles
        );

        // residual actually dropped by the requested factor
        let fine = pre.context(pre.n_levels() - 1);
        let op = HelmholtzOperator::new(Rc::clone(fine), 1.0);
        let mut ax = DofVector::zeros(n);
        op.vmult(&mut ax, &x);
        let res = (&rhs - &ax).mapv(f64::abs).sum();
        let rhs_sum = rhs.mapv(f64::abs).sum();
        assert!(res <= 1e-2 * rhs_sum);
    }

    #[test]
    fn update_refreshes_the_hierarchy() {
        let data = MultigridData::default();
        let mut pre = MultigridPreconditioner::new(
            &data,
            &mesh(2),
            &Element::new(2, true, 1),
            None,
            None,
            &SerialComm,
            helmholtz,
        );
        let n = pre.n_dofs();
        let src = DofVector::from_elem(n, 1.0);
        let mut before = DofVector::zeros(n);
        pre.vmult(&mut before, &src);

        pre.update(100.0);
        let mut after = DofVector::zeros(n);
        pre.vmult(&mut after, &src);

        let diff = (&before - &after).mapv(f64::abs).sum();
        assert!(diff > 1e-10, "stronger shift must change the correction");
    }

    #[test]
    #[should_panic(expected = "Dirichlet")]
    fn continuous_elements_require_constraint_data() {
        let data = MultigridData::default();
        let _ = MultigridPreconditioner::new(
            &data,
            &mesh(2),
            &Element::new(2, false, 1),
            None,
            None,
            &SerialComm,
            helmholtz,
        );
    }

    #[test]
    #[should_panic(expected = "periodic boundaries are not implemented")]
    fn periodic_pairs_are_rejected_with_global_coarsening() {
        let mut data = MultigridData::default();
        data.mg_type = MultigridType::HMG;
        data.use_global_coarsening = true;
        let bc = all_boundaries();
        let pairs = [PeriodicFacePair {
            master: BOUNDARY_LEFT,
            slave: BOUNDARY_RIGHT,
        }];
        let _ = MultigridPreconditioner::new(
            &data,
            &mesh(2),
            &Element::new(2, false, 1),
            Some(&bc),
            Some(&pairs),
            &SerialComm,
            helmholtz,
        );
    }

    #[test]
    fn global_coarsening_builds_its_own_level_meshes() {
        let mut data = MultigridData::default();
        data.use_global_coarsening = true;
        let mut pre = MultigridPreconditioner::new(
            &data,
            &mesh(2),
            &Element::new(1, true, 1),
            None,
            None,
            &SerialComm,
            helmholtz,
        );
        assert_eq!(pre.n_levels(), 3);
        for l in 0..pre.n_levels() {
            assert_eq!(pre.context(l).mesh.n_global_levels(), l + 1);
        }

        let n = pre.n_dofs();
        let src = DofVector::zeros(n);
        let mut dst = DofVector::from_elem(n, 3.0);
        pre.vmult(&mut dst, &src);
        assert!(dst.iter().all(|&x| x == 0.0));
    }
}
