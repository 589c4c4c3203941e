//! The multigrid V-cycle
//!
//! Owns the per-level operators, smoothers, transfer operator and the
//! coarse-grid solver, plus the level work vectors, and runs the
//! recursive V-cycle: pre-smooth, restrict the defect, recurse,
//! prolongate the correction, post-smooth. Wall-clock time of the
//! phases is collected in a [`TimerTree`].

use super::coarse_solver::CoarseGridSolver;
use super::data::CoarseGridData;
use super::smoother::{Smoother, SmootherBase};
use super::transfer::TransferOperator;
use crate::operator::MultigridOperator;
use crate::solver::utils::l2_norm;
use crate::solver::SolverData;
use crate::timer::TimerTree;
use crate::types::DofVector;
use std::time::Instant;

/// V-cycle over a hierarchy of level operators
pub struct MultigridAlgorithm<O: MultigridOperator> {
    operators: Vec<O>,
    /// `None` on level 0, which is handled by the coarse solver
    smoothers: Vec<Option<Smoother>>,
    coarse_solver: CoarseGridSolver,
    transfers: TransferOperator,
    solution: Vec<DofVector>,
    rhs: Vec<DofVector>,
    defect: Vec<DofVector>,
    timers: TimerTree,
}

impl<O: MultigridOperator> MultigridAlgorithm<O> {
    /// Assemble the cycle from its per-level pieces.
    ///
    /// # Panics
    /// If the numbers of operators, smoothers and transfers are
    /// inconsistent, or if a smoother is present on level 0 or missing
    /// on a finer level.
    pub fn new(
        operators: Vec<O>,
        smoothers: Vec<Option<Smoother>>,
        coarse_solver: CoarseGridSolver,
        transfers: TransferOperator,
    ) -> Self {
        let n_levels = operators.len();
        assert!(n_levels > 0, "multigrid needs at least one level");
        assert!(
            smoothers.len() == n_levels,
            "expected {} smoothers, got {}",
            n_levels,
            smoothers.len()
        );
        assert!(
            transfers.n_levels() == n_levels,
            "transfer operator connects {} levels, hierarchy has {}",
            transfers.n_levels(),
            n_levels
        );
        assert!(smoothers[0].is_none(), "level 0 must not carry a smoother");
        for (l, s) in smoothers.iter().enumerate().skip(1) {
            assert!(s.is_some(), "level {} is missing its smoother", l);
        }

        let solution: Vec<DofVector> =
            operators.iter().map(|op| op.initialize_dof_vector()).collect();
        let rhs = solution.clone();
        let defect = solution.clone();

        Self {
            operators,
            smoothers,
            coarse_solver,
            transfers,
            solution,
            rhs,
            defect,
            timers: TimerTree::new(),
        }
    }

    /// Number of levels in the hierarchy
    pub fn n_levels(&self) -> usize {
        self.operators.len()
    }

    /// Level operators, coarse to fine
    pub fn operators(&self) -> &[O] {
        &self.operators
    }

    /// Mutable access to the level operators (to push updated
    /// coefficients before calling [`Self::update`])
    pub fn operators_mut(&mut self) -> &mut [O] {
        &mut self.operators
    }

    /// Accumulated phase timings
    pub fn timings(&self) -> &TimerTree {
        &self.timers
    }

    /// Reset the accumulated timings
    pub fn clear_timings(&mut self) {
        self.timers.clear();
    }

    /// Refresh smoothers and the coarse solver after the operators
    /// changed
    pub fn update(&mut self, coarse_data: &CoarseGridData) {
        for (l, smoother) in self.smoothers.iter_mut().enumerate().skip(1) {
            smoother
                .as_mut()
                .expect("smoother present above level 0")
                .update(&self.operators[l]);
        }
        self.coarse_solver.update(&self.operators[0], coarse_data);
    }

    /// Apply one V-cycle to `src`
    pub fn vmult(&mut self, dst: &mut DofVector, src: &DofVector) {
        let fine = self.n_levels() - 1;
        assert!(
            src.len() == self.rhs[fine].len(),
            "expected a vector of length {}, got {}",
            self.rhs[fine].len(),
            src.len()
        );
        self.rhs[fine].assign(src);
        self.cycle(fine);
        dst.assign(&self.solution[fine]);
    }

    /// Run the cycle as a stand-alone defect-correction solver on the
    /// finest level, returning the number of cycles spent.
    ///
    /// Iterates `dst += B (src - A dst)` with one V-cycle per
    /// application of `B` until the residual satisfies `data`'s
    /// tolerances.
    pub fn solve(&mut self, dst: &mut DofVector, src: &DofVector, data: &SolverData) -> usize {
        let fine = self.n_levels() - 1;
        dst.fill(0.0);
        let mut residual = src.clone();
        let norm_0 = l2_norm(&residual);

        let mut n_cycles = 0;
        while n_cycles < data.max_iter {
            let norm = l2_norm(&residual);
            if norm <= data.abs_tol || norm <= data.rel_tol * norm_0 {
                break;
            }
            self.rhs[fine].assign(&residual);
            self.cycle(fine);
            dst.zip_mut_with(&self.solution[fine], |di, ci| *di += ci);
            n_cycles += 1;

            self.operators[fine].vmult(&mut self.defect[fine], dst);
            residual.assign(src);
            residual.zip_mut_with(&self.defect[fine], |ri, ai| *ri -= ai);
        }
        n_cycles
    }

    fn cycle(&mut self, level: usize) {
        if level == 0 {
            let start = Instant::now();
            self.coarse_solver
                .solve(&self.operators[0], &mut self.solution[0], &self.rhs[0]);
            self.timers.insert("vcycle/coarse solve", start.elapsed());
            return;
        }

        let smoother = self.smoothers[level].as_ref().expect("smoother present");
        let op = &self.operators[level];

        // pre-smoothing with zero initial guess
        let start = Instant::now();
        smoother.vmult(op, &mut self.solution[level], &self.rhs[level]);
        self.timers
            .insert(&format!("vcycle/level {}/smoother", level), start.elapsed());

        // defect and restriction
        let start = Instant::now();
        op.vmult(&mut self.defect[level], &self.solution[level]);
        self.defect[level]
            .zip_mut_with(&self.rhs[level], |di, bi| *di = bi - *di);
        let (coarse_rhs, _) = self.rhs.split_at_mut(level);
        self.transfers
            .restrict(level, &mut coarse_rhs[level - 1], &self.defect[level]);
        self.timers
            .insert(&format!("vcycle/level {}/restrict", level), start.elapsed());

        self.cycle(level - 1);

        // coarse-grid correction
        let start = Instant::now();
        let (coarse, fine) = self.solution.split_at_mut(level);
        self.transfers
            .prolongate_and_add(level, &mut fine[0], &coarse[level - 1]);
        self.timers.insert(
            &format!("vcycle/level {}/prolongate", level),
            start.elapsed(),
        );

        // post-smoothing
        let smoother = self.smoothers[level].as_ref().expect("smoother present");
        let start = Instant::now();
        smoother.step(
            &self.operators[level],
            &mut self.solution[level],
            &self.rhs[level],
        );
        self.timers
            .insert(&format!("vcycle/level {}/smoother", level), start.elapsed());
    }
}
