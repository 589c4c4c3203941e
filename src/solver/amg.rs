//! Algebraic multigrid by smoothed-free greedy aggregation
//!
//! Builds a hierarchy of Galerkin coarse operators `A_c = P^T A P`
//! from an assembled sparse matrix, with binary aggregation-based
//! prolongation, weighted-Jacobi smoothing on every level and a dense
//! direct solve on the coarsest one. A single V-cycle is applied per
//! preconditioner application.

use super::utils::{gauss_jordan_inverse, spmv};
use super::PreconditionerBase;
use crate::types::DofVector;
use log::debug;
use ndarray::Array2;
use sprs::{CsMat, TriMat};

/// Parameters of the aggregation hierarchy
#[derive(Debug, Clone, Copy)]
pub struct AmgData {
    /// Hard cap on the number of levels
    pub max_levels: usize,
    /// Stop coarsening once a level has at most this many unknowns
    pub coarse_size: usize,
    /// Pre- and post-smoothing sweeps per level
    pub n_smoothing_steps: usize,
    /// Damping factor of the Jacobi smoother
    pub jacobi_weight: f64,
    /// Relative threshold below which connections are dropped during
    /// aggregation
    pub strength_threshold: f64,
}

impl Default for AmgData {
    fn default() -> Self {
        Self {
            max_levels: 25,
            coarse_size: 32,
            n_smoothing_steps: 2,
            jacobi_weight: 0.67,
            strength_threshold: 0.25,
        }
    }
}

#[derive(Clone)]
struct AmgLevel {
    a: CsMat<f64>,
    /// Prolongation to this level from the next-coarser one; `None` on
    /// the coarsest level
    p: Option<CsMat<f64>>,
    inv_diag: DofVector,
}

/// Aggregation AMG hierarchy, applied as one V-cycle
#[derive(Clone)]
pub struct AmgPreconditioner {
    levels: Vec<AmgLevel>,
    coarse_inverse: Array2<f64>,
    data: AmgData,
}

impl std::fmt::Debug for AmgPreconditioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmgPreconditioner")
            .field("n_levels", &self.levels.len())
            .field("n_fine", &self.levels[0].a.rows())
            .finish()
    }
}

impl AmgPreconditioner {
    /// Build the hierarchy for the given fine-level matrix.
    ///
    /// # Panics
    /// If the matrix is not square or has a zero diagonal entry.
    pub fn new(a: CsMat<f64>, data: &AmgData) -> Self {
        assert_eq!(a.rows(), a.cols(), "AMG needs a square matrix");
        let mut levels = Vec::new();
        let mut current = a;

        while levels.len() + 1 < data.max_levels && current.rows() > data.coarse_size {
            let inv_diag = inverse_diagonal(&current);
            let aggregates = aggregate(&current, data.strength_threshold);
            let n_agg = aggregates.iter().copied().max().map_or(0, |m| m + 1);
            if n_agg >= current.rows() {
                break;
            }
            let p = aggregation_prolongation(&aggregates, n_agg);
            let ap = &current * &p;
            let pt = p.transpose_view().to_csr();
            let coarse = &pt * &ap;
            debug!(
                "amg level {}: {} -> {} unknowns",
                levels.len(),
                current.rows(),
                n_agg
            );
            levels.push(AmgLevel {
                a: current,
                p: Some(p),
                inv_diag,
            });
            current = coarse;
        }

        let coarse_inverse = gauss_jordan_inverse(&current.to_dense());
        let inv_diag = inverse_diagonal(&current);
        levels.push(AmgLevel {
            a: current,
            p: None,
            inv_diag,
        });
        Self {
            levels,
            coarse_inverse,
            data: *data,
        }
    }

    /// Number of levels in the hierarchy, coarsest included
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    fn smooth(&self, level: usize, x: &mut DofVector, rhs: &DofVector) {
        let lev = &self.levels[level];
        let mut ax = DofVector::zeros(x.len());
        for _ in 0..self.data.n_smoothing_steps {
            spmv(&lev.a, x, &mut ax);
            for i in 0..x.len() {
                x[i] += self.data.jacobi_weight * lev.inv_diag[i] * (rhs[i] - ax[i]);
            }
        }
    }

    fn cycle(&self, level: usize, rhs: &DofVector) -> DofVector {
        let lev = &self.levels[level];
        let n = lev.a.rows();

        if level + 1 == self.levels.len() {
            let mut x = DofVector::zeros(n);
            for i in 0..n {
                let mut s = 0.0;
                for j in 0..n {
                    s += self.coarse_inverse[[i, j]] * rhs[j];
                }
                x[i] = s;
            }
            return x;
        }

        let mut x = DofVector::zeros(n);
        self.smooth(level, &mut x, rhs);

        let p = lev.p.as_ref().unwrap();
        let mut ax = DofVector::zeros(n);
        spmv(&lev.a, &x, &mut ax);
        let residual = rhs - &ax;
        let mut coarse_rhs = DofVector::zeros(p.cols());
        // restriction is the transpose of the binary prolongation
        for (row, vec) in p.outer_iterator().enumerate() {
            for (col, &val) in vec.iter() {
                coarse_rhs[col] += val * residual[row];
            }
        }

        let coarse_x = self.cycle(level + 1, &coarse_rhs);
        for (row, vec) in p.outer_iterator().enumerate() {
            for (col, &val) in vec.iter() {
                x[row] += val * coarse_x[col];
            }
        }

        self.smooth(level, &mut x, rhs);
        x
    }
}

impl PreconditionerBase for AmgPreconditioner {
    fn apply(&self, dst: &mut DofVector, src: &DofVector) {
        dst.assign(&self.cycle(0, src));
    }
}

fn inverse_diagonal(a: &CsMat<f64>) -> DofVector {
    let mut diag = DofVector::zeros(a.rows());
    for (row, vec) in a.outer_iterator().enumerate() {
        for (col, &val) in vec.iter() {
            if col == row {
                diag[row] = val;
            }
        }
    }
    for (i, d) in diag.iter_mut().enumerate() {
        assert!(*d != 0.0, "zero diagonal entry in row {}", i);
        *d = 1.0 / *d;
    }
    diag
}

/// Greedy aggregation over the strong connectivity graph; returns the
/// aggregate index of every node
fn aggregate(a: &CsMat<f64>, threshold: f64) -> Vec<usize> {
    let n = a.rows();
    let diag: Vec<f64> = {
        let inv = inverse_diagonal(a);
        inv.iter().map(|d| 1.0 / d).collect()
    };
    let is_strong = |row: usize, col: usize, val: f64| {
        col != row && val.abs() > threshold * (diag[row].abs() * diag[col].abs()).sqrt()
    };

    const UNASSIGNED: usize = usize::MAX;
    let mut agg = vec![UNASSIGNED; n];
    let mut n_agg = 0;

    // root pass: seed an aggregate from every node whose strong
    // neighborhood is still untouched
    for i in 0..n {
        if agg[i] != UNASSIGNED {
            continue;
        }
        let row = a.outer_view(i).expect("row in bounds");
        let free = row
            .iter()
            .all(|(j, &v)| !is_strong(i, j, v) || agg[j] == UNASSIGNED);
        if !free {
            continue;
        }
        agg[i] = n_agg;
        for (j, &v) in row.iter() {
            if is_strong(i, j, v) {
                agg[j] = n_agg;
            }
        }
        n_agg += 1;
    }

    // sweep pass: attach leftovers to a strong neighbor, or make them
    // singletons
    for i in 0..n {
        if agg[i] != UNASSIGNED {
            continue;
        }
        let row = a.outer_view(i).expect("row in bounds");
        let neighbor = row
            .iter()
            .find(|(j, &v)| is_strong(i, *j, v) && agg[*j] != UNASSIGNED)
            .map(|(j, _)| agg[j]);
        agg[i] = match neighbor {
            Some(id) => id,
            None => {
                n_agg += 1;
                n_agg - 1
            }
        };
    }
    agg
}

fn aggregation_prolongation(aggregates: &[usize], n_agg: usize) -> CsMat<f64> {
    let mut tri = TriMat::new((aggregates.len(), n_agg));
    for (i, &a) in aggregates.iter().enumerate() {
        tri.add_triplet(i, a, 1.0);
    }
    tri.to_csr()
}
