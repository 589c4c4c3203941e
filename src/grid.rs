//! Quad-forest meshes with distributed partitioning
//!
//! A mesh is a forest of quadtrees over coarse cells: cell `(l, i)` has
//! the four children `(l+1, 4*i .. 4*i+4)`. Refinement is tracked as
//! per-level sets of refined cell indices, which makes copying, global
//! coarsening and refinement-flag replay cheap. Active cells are the
//! leaves, enumerated in depth-first (z-) order.
//!
//! [`DistributedMesh`] adds a partition of the active cells among a
//! number of processes; partitioning assigns contiguous chunks of the
//! z-order curve (the fallback partitioner of the production grid
//! stack when no graph partitioner is available).

use std::collections::{BTreeSet, HashMap};

/// Identifier of a cell in the quad-forest: refinement level and
/// z-order index within that level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId {
    /// Refinement depth, 0 for coarse cells
    pub level: u32,
    /// z-order index within the level
    pub index: u64,
}

impl CellId {
    /// First child of this cell on the next-finer level
    pub fn first_child(&self) -> CellId {
        CellId {
            level: self.level + 1,
            index: 4 * self.index,
        }
    }

    /// All four children of this cell
    pub fn children(&self) -> [CellId; 4] {
        let c = self.first_child();
        [
            c,
            CellId { index: c.index + 1, ..c },
            CellId { index: c.index + 2, ..c },
            CellId { index: c.index + 3, ..c },
        ]
    }
}

/// Serial (fully replicated) quad-forest mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialMesh {
    n_coarse: u64,
    /// `refined[l]` holds indices of level-`l` cells that have children
    refined: Vec<BTreeSet<u64>>,
    refine_flags: Vec<CellId>,
}

impl SerialMesh {
    /// Mesh with `n_coarse` unrefined coarse cells
    pub fn new(n_coarse: u64) -> Self {
        assert!(n_coarse > 0, "mesh needs at least one coarse cell");
        Self {
            n_coarse,
            refined: Vec::new(),
            refine_flags: Vec::new(),
        }
    }

    /// Unit square with a single coarse cell
    pub fn unit_square() -> Self {
        Self::new(1)
    }

    /// Number of refinement levels (1 for an unrefined mesh)
    pub fn n_levels(&self) -> usize {
        self.refined.len() + 1
    }

    /// Number of coarse (level-0) cells
    pub fn n_coarse_cells(&self) -> u64 {
        self.n_coarse
    }

    /// Number of active cells (leaves)
    pub fn n_active_cells(&self) -> u64 {
        // each refinement replaces one cell by four
        self.n_coarse
            + 3 * self
                .refined
                .iter()
                .map(|s| s.len() as u64)
                .sum::<u64>()
    }

    /// Whether the given cell has children
    pub fn has_children(&self, cell: CellId) -> bool {
        self.refined
            .get(cell.level as usize)
            .map_or(false, |s| s.contains(&cell.index))
    }

    /// All cells existing on `level`, active or refined
    pub fn cells_on_level(&self, level: usize) -> Vec<CellId> {
        if level == 0 {
            (0..self.n_coarse)
                .map(|index| CellId { level: 0, index })
                .collect()
        } else {
            match self.refined.get(level - 1) {
                Some(parents) => parents
                    .iter()
                    .flat_map(|&p| {
                        let c = CellId {
                            level: level as u32 - 1,
                            index: p,
                        };
                        c.children().to_vec()
                    })
                    .collect(),
                None => Vec::new(),
            }
        }
    }

    /// Refined cells on `level` (as raw indices)
    pub fn refined_on_level(&self, level: usize) -> Vec<u64> {
        self.refined
            .get(level)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Active cells in depth-first z-order
    pub fn active_cells(&self) -> Vec<CellId> {
        let mut out = Vec::with_capacity(self.n_active_cells() as usize);
        let mut stack: Vec<CellId> = (0..self.n_coarse)
            .rev()
            .map(|index| CellId { level: 0, index })
            .collect();
        while let Some(cell) = stack.pop() {
            if self.has_children(cell) {
                let children = cell.children();
                for &c in children.iter().rev() {
                    stack.push(c);
                }
            } else {
                out.push(cell);
            }
        }
        out
    }

    /// Whether every active cell sits on the finest level
    pub fn is_uniform(&self) -> bool {
        for (l, refined) in self.refined.iter().enumerate() {
            let n_on_level = if l == 0 {
                self.n_coarse
            } else {
                4 * self.refined[l - 1].len() as u64
            };
            if refined.len() as u64 != n_on_level {
                return false;
            }
        }
        true
    }

    fn mark_refined(&mut self, cell: CellId) {
        let l = cell.level as usize;
        if self.refined.len() <= l {
            self.refined.resize_with(l + 1, BTreeSet::new);
        }
        self.refined[l].insert(cell.index);
    }

    /// Refine every active cell once
    pub fn refine_global(&mut self, times: usize) {
        for _ in 0..times {
            for cell in self.active_cells() {
                self.mark_refined(cell);
            }
        }
    }

    /// Coarsen every active cell by one level.
    ///
    /// Cell families whose children are all leaves are merged; on a
    /// uniformly refined mesh this removes the finest level entirely.
    pub fn coarsen_global(&mut self) {
        let mut to_remove: Vec<CellId> = Vec::new();
        for (l, refined) in self.refined.iter().enumerate() {
            for &index in refined.iter() {
                let cell = CellId {
                    level: l as u32,
                    index,
                };
                if cell.children().iter().all(|c| !self.has_children(*c)) {
                    to_remove.push(cell);
                }
            }
        }
        for cell in to_remove {
            self.refined[cell.level as usize].remove(&cell.index);
        }
        while self.refined.last().map_or(false, |s| s.is_empty()) {
            self.refined.pop();
        }
    }

    /// Flag an active cell for refinement.
    ///
    /// # Panics
    /// If the cell is already refined.
    pub fn set_refine_flag(&mut self, cell: CellId) {
        assert!(
            !self.has_children(cell),
            "cannot flag refined cell {:?} for refinement",
            cell
        );
        self.refine_flags.push(cell);
    }

    /// Execute all pending refinement flags
    pub fn execute_coarsening_and_refinement(&mut self) {
        let flags = std::mem::take(&mut self.refine_flags);
        for cell in flags {
            self.mark_refined(cell);
        }
    }
}

/// Mesh description plus a partition of its active cells
#[derive(Debug, Clone)]
pub struct DistributedMesh {
    serial: SerialMesh,
    n_partitions: usize,
    active: Vec<CellId>,
    owners: Vec<usize>,
    index_of: HashMap<CellId, usize>,
}

impl DistributedMesh {
    /// Partition a serial description among `n_partitions` processes
    /// by contiguous chunks of the z-order curve.
    ///
    /// # Panics
    /// If `n_partitions` is zero.
    pub fn from_serial(serial: SerialMesh, n_partitions: usize) -> Self {
        assert!(n_partitions > 0, "mesh needs at least one partition");
        let active = serial.active_cells();
        let n = active.len();
        let chunk = (n + n_partitions - 1) / n_partitions.max(1);
        let owners: Vec<usize> = (0..n).map(|i| (i / chunk.max(1)).min(n_partitions - 1)).collect();
        let index_of = active
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i))
            .collect();
        Self {
            serial,
            n_partitions,
            active,
            owners,
            index_of,
        }
    }

    /// Underlying serial description
    pub fn serial(&self) -> &SerialMesh {
        &self.serial
    }

    /// Number of partitions this mesh is distributed over
    pub fn n_partitions(&self) -> usize {
        self.n_partitions
    }

    /// Number of global refinement levels
    pub fn n_global_levels(&self) -> usize {
        self.serial.n_levels()
    }

    /// Global number of active cells
    pub fn n_global_active_cells(&self) -> u64 {
        self.serial.n_active_cells()
    }

    /// Whether every active cell sits on the finest level
    pub fn is_uniform(&self) -> bool {
        self.serial.is_uniform()
    }

    /// Active cells in z-order
    pub fn active_cells(&self) -> &[CellId] {
        &self.active
    }

    /// Owning partition of an active cell
    ///
    /// # Panics
    /// If the cell is not an active cell of this mesh.
    pub fn owner(&self, cell: CellId) -> usize {
        let i = *self
            .index_of
            .get(&cell)
            .unwrap_or_else(|| panic!("cell {:?} is not an active cell", cell));
        self.owners[i]
    }

    /// Active cells owned by `rank`
    pub fn locally_owned_cells(&self, rank: usize) -> Vec<CellId> {
        self.active
            .iter()
            .zip(self.owners.iter())
            .filter(|(_, &o)| o == rank)
            .map(|(&c, _)| c)
            .collect()
    }

    /// Refined cells on `level` whose ownership falls to `rank`.
    ///
    /// A refined cell is attributed to the owner of its first active
    /// descendant, so every refined cell is reported by exactly one
    /// rank and a gather over all ranks reproduces the full set.
    pub fn local_refined_flags(&self, level: usize, rank: usize) -> Vec<u64> {
        self.serial
            .refined_on_level(level)
            .into_iter()
            .filter(|&index| {
                let mut cell = CellId {
                    level: level as u32,
                    index,
                };
                while !self.index_of.contains_key(&cell) {
                    cell = cell.first_child();
                }
                self.owner(cell) == rank
            })
            .collect()
    }

    /// Coarsen all active cells by one level and repartition
    pub fn coarsen_global(&mut self) {
        let mut serial = self.serial.clone();
        serial.coarsen_global();
        *self = Self::from_serial(serial, self.n_partitions);
    }
}
