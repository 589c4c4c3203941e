//! Construction of the geometric coarsening sequence
//!
//! Starting from the fine mesh, the sequence of coarser level meshes
//! is built by repeated global coarsening. As long as every process
//! keeps enough cells, coarsening happens in place on the distributed
//! mesh. Once levels become small, the mesh is gathered onto the first
//! rank of each compute node and repartitioned among a shrinking
//! number of processes, so that coarse levels are not spread thinner
//! than a configurable number of cells per process.

use crate::communicator::Communicator;
use crate::grid::{CellId, DistributedMesh, SerialMesh};
use log::debug;
use std::rc::Rc;

/// Replicate a distributed mesh into a serial description on the first
/// rank of each compute node.
///
/// The coarse level is copied directly; the refinement history is
/// collected on rank 0 level by level with a gather over all ranks and
/// then re-broadcast, and finally replayed as refinement flags on the
/// serial mesh. Ranks that are not first on their node receive only
/// the unrefined coarse mesh.
pub fn gather_distributed_mesh_by_node<C: Communicator>(
    distributed: &DistributedMesh,
    comm: &C,
) -> SerialMesh {
    let mut serial = SerialMesh::new(distributed.serial().n_coarse_cells());

    let n_levels = distributed.n_global_levels();
    for level in 0..n_levels.saturating_sub(1) {
        let local = distributed.local_refined_flags(level, comm.rank());
        let mut flags = comm.gather_u64(&local).unwrap_or_default();
        comm.broadcast_u64(&mut flags);

        if comm.is_first_on_node() {
            for &index in &flags {
                serial.set_refine_flag(CellId {
                    level: level as u32,
                    index,
                });
            }
            if !flags.is_empty() {
                serial.execute_coarsening_and_refinement();
            }
        }
    }
    serial
}

/// Build the coarse-to-fine sequence of level meshes by repeated
/// global coarsening of the fine mesh.
///
/// Entry `i` of the result carries `i + 1` refinement levels; the last
/// entry is the fine mesh itself. While a level still has more than
/// `n_cells_per_process` cells per process it is kept on the full
/// communicator; below that, levels are rebuilt from a node-local
/// serial copy, starting from one partition per compute node and
/// shrinking by at most a factor of `max_process_shrink` per level.
///
/// # Panics
/// If a produced level mesh does not have the expected number of
/// refinement levels.
pub fn create_geometric_coarsening_sequence<C: Communicator>(
    fine: &Rc<DistributedMesh>,
    comm: &C,
    n_cells_per_process: usize,
    max_process_shrink: usize,
) -> Vec<Rc<DistributedMesh>> {
    let n_levels = fine.n_global_levels();
    let mut sequence: Vec<Option<Rc<DistributedMesh>>> = vec![None; n_levels];
    sequence[n_levels - 1] = Some(Rc::clone(fine));

    if n_levels > 1 {
        let mut copy = (**fine).clone();
        copy.coarsen_global();

        // regular coarsening on the full communicator
        let mut level = n_levels as isize - 2;
        while level >= 0
            && copy.n_global_active_cells() / comm.size() as u64 > n_cells_per_process as u64
        {
            sequence[level as usize] = Some(Rc::new(DistributedMesh::from_serial(
                copy.serial().clone(),
                comm.size(),
            )));
            if level > 0 {
                copy.coarsen_global();
            }
            level -= 1;
        }

        // remaining levels: gather per node and repartition with a
        // shrinking process count, at most one partition per compute
        // node since only the first rank of each node holds the mesh
        let mut serial = gather_distributed_mesh_by_node(&copy, comm);
        let ppn = comm.n_processes_per_node().max(1);
        let mut n_partitions = (comm.size() + ppn - 1) / ppn;
        for level in (0..copy.n_global_levels()).rev() {
            n_partitions = n_partitions.min(
                (n_partitions / max_process_shrink)
                    .max((serial.n_active_cells() as usize / n_cells_per_process).max(1)),
            );
            debug!(
                "coarse level {}: {} cells on {} processes",
                level,
                serial.n_active_cells(),
                n_partitions
            );
            sequence[level] = Some(Rc::new(DistributedMesh::from_serial(
                serial.clone(),
                n_partitions,
            )));
            if level > 0 {
                serial.coarsen_global();
            }
        }
    }

    let sequence: Vec<Rc<DistributedMesh>> = sequence
        .into_iter()
        .map(|m| m.expect("every level must be filled"))
        .collect();
    for (i, mesh) in sequence.iter().enumerate() {
        assert!(
            mesh.n_global_levels() == i + 1,
            "expected a mesh with {} levels at entry {}, got {}",
            i + 1,
            i,
            mesh.n_global_levels()
        );
    }
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communicator::SerialComm;

    fn uniformly_refined(times: usize) -> Rc<DistributedMesh> {
        let mut m = SerialMesh::unit_square();
        m.refine_global(times);
        Rc::new(DistributedMesh::from_serial(m, 1))
    }

    #[test]
    fn sequence_entry_i_has_i_plus_one_levels() {
        let fine = uniformly_refined(3);
        let seq = create_geometric_coarsening_sequence(&fine, &SerialComm, 400, 8);
        assert_eq!(seq.len(), 4);
        for (i, mesh) in seq.iter().enumerate() {
            assert_eq!(mesh.n_global_levels(), i + 1);
        }
    }

    #[test]
    fn finest_entry_is_the_input_mesh() {
        let fine = uniformly_refined(2);
        let seq = create_geometric_coarsening_sequence(&fine, &SerialComm, 400, 8);
        assert!(Rc::ptr_eq(seq.last().expect("nonempty"), &fine));
    }

    #[test]
    fn single_level_mesh_yields_a_single_entry() {
        let fine = uniformly_refined(0);
        let seq = create_geometric_coarsening_sequence(&fine, &SerialComm, 400, 8);
        assert_eq!(seq.len(), 1);
        assert!(Rc::ptr_eq(&seq[0], &fine));
    }

    #[test]
    fn gather_reproduces_the_refinement_history() {
        let mut m = SerialMesh::unit_square();
        m.refine_global(2);
        // locally refine one more cell to make the history non-uniform
        m.set_refine_flag(CellId { level: 2, index: 0 });
        m.execute_coarsening_and_refinement();
        let distributed = DistributedMesh::from_serial(m.clone(), 1);

        let gathered = gather_distributed_mesh_by_node(&distributed, &SerialComm);
        assert_eq!(gathered.n_levels(), m.n_levels());
        assert_eq!(gathered.n_active_cells(), m.n_active_cells());
        for level in 0..m.n_levels() {
            assert_eq!(gathered.refined_on_level(level), m.refined_on_level(level));
        }
    }

    /// Single-rank stand-in for a multi-node communicator. The fine
    /// meshes in these tests carry one partition, so every refinement
    /// flag is local to rank 0 and the gather sees the full history.
    struct NodeLocalComm {
        size: usize,
        procs_per_node: usize,
    }

    impl Communicator for NodeLocalComm {
        fn rank(&self) -> usize {
            0
        }
        fn size(&self) -> usize {
            self.size
        }
        fn gather_u64(&self, local: &[u64]) -> Option<Vec<u64>> {
            Some(local.to_vec())
        }
        fn broadcast_u64(&self, _data: &mut Vec<u64>) {}
        fn is_first_on_node(&self) -> bool {
            true
        }
        fn n_processes_per_node(&self) -> usize {
            self.procs_per_node
        }
    }

    #[test]
    fn gathered_levels_use_one_partition_per_node() {
        let comm = NodeLocalComm {
            size: 4,
            procs_per_node: 2,
        };
        let fine = uniformly_refined(3);
        let seq = create_geometric_coarsening_sequence(&fine, &comm, 1, 8);
        let parts: Vec<usize> = seq.iter().map(|m| m.n_partitions()).collect();
        // the 16-cell level still fits the full communicator; the
        // gathered 4-cell level is capped at one partition per node,
        // the single-cell level at one process
        assert_eq!(parts, vec![1, 2, 4, 1]);
    }

    #[test]
    fn coarse_sequence_preserves_cell_counts() {
        let fine = uniformly_refined(3);
        let seq = create_geometric_coarsening_sequence(&fine, &SerialComm, 400, 8);
        let counts: Vec<u64> = seq.iter().map(|m| m.n_global_active_cells()).collect();
        assert_eq!(counts, vec![1, 4, 16, 64]);
    }
}
