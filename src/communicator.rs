//! Communicator abstraction for cross-process collectives
//!
//! The multigrid setup performs a small set of collective operations:
//! gathering refinement flags on a root rank and broadcasting them to
//! the first rank of each compute node. All of them are blocking and
//! must be called the same number of times in the same order on every
//! participating rank.
//!
//! [`SerialComm`] executes the identical call sequence on a single rank
//! and is always available; `MpiComm` (cargo feature `mpi`) maps the
//! calls onto MPI collectives.

/// Collective operations required by the multigrid setup.
///
/// Every method is a synchronization point. Implementations must keep
/// the call ordering identical across all ranks of the communicator.
pub trait Communicator {
    /// Rank of this process within the communicator
    fn rank(&self) -> usize;

    /// Number of processes in the communicator
    fn size(&self) -> usize;

    /// Gather variable-length chunks on the root rank.
    ///
    /// Returns the concatenation of all ranks' `local` slices (ordered
    /// by rank) on rank 0 and `None` elsewhere.
    fn gather_u64(&self, local: &[u64]) -> Option<Vec<u64>>;

    /// Broadcast a buffer from rank 0 to all ranks of the communicator
    fn broadcast_u64(&self, data: &mut Vec<u64>);

    /// Whether this process is the first rank on its compute node
    fn is_first_on_node(&self) -> bool;

    /// Number of processes hosted on this compute node
    fn n_processes_per_node(&self) -> usize;
}

/// Single-process communicator.
///
/// Used by default and in the test suite; every collective degenerates
/// to the identity while preserving the call sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn gather_u64(&self, local: &[u64]) -> Option<Vec<u64>> {
        Some(local.to_vec())
    }

    fn broadcast_u64(&self, _data: &mut Vec<u64>) {}

    fn is_first_on_node(&self) -> bool {
        true
    }

    fn n_processes_per_node(&self) -> usize {
        1
    }
}

#[cfg(feature = "mpi")]
pub use self::mpi_comm::MpiComm;

#[cfg(feature = "mpi")]
mod mpi_comm {
    use super::Communicator;
    use mpi::collective::Root;
    use mpi::topology::{Communicator as _, SimpleCommunicator};
    use mpi::traits::*;

    /// Communicator backed by an MPI world communicator
    pub struct MpiComm {
        world: SimpleCommunicator,
        first_on_node: bool,
        procs_per_node: usize,
    }

    impl MpiComm {
        /// Wrap the world communicator.
        ///
        /// Determines node topology by splitting the communicator by
        /// shared-memory domain, mirroring `MPI_Comm_split_type`.
        pub fn world() -> Self {
            let universe = mpi::initialize().expect("failed to initialize MPI");
            let world = universe.world();
            let node = world.split_shared(world.rank());
            let first_on_node = node.rank() == 0;
            let procs_per_node = node.size() as usize;
            std::mem::forget(universe);
            Self {
                world,
                first_on_node,
                procs_per_node,
            }
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn gather_u64(&self, local: &[u64]) -> Option<Vec<u64>> {
            let root = self.world.process_at_rank(0);
            let n_local = local.len() as u64;
            if self.world.rank() == 0 {
                let mut counts = vec![0u64; self.size()];
                root.gather_into_root(&n_local, &mut counts[..]);
                let total: u64 = counts.iter().sum();
                let mut all = vec![0u64; total as usize];
                let counts_i32: Vec<i32> = counts.iter().map(|&c| c as i32).collect();
                let displs: Vec<i32> = counts_i32
                    .iter()
                    .scan(0, |acc, &c| {
                        let d = *acc;
                        *acc += c;
                        Some(d)
                    })
                    .collect();
                {
                    let mut partition =
                        mpi::datatype::PartitionMut::new(&mut all[..], counts_i32, displs);
                    root.gather_varcount_into_root(local, &mut partition);
                }
                Some(all)
            } else {
                root.gather_into(&n_local);
                root.gather_varcount_into(local);
                None
            }
        }

        fn broadcast_u64(&self, data: &mut Vec<u64>) {
            let root = self.world.process_at_rank(0);
            let mut len = data.len() as u64;
            root.broadcast_into(&mut len);
            data.resize(len as usize, 0);
            root.broadcast_into(&mut data[..]);
        }

        fn is_first_on_node(&self) -> bool {
            self.first_on_node
        }

        fn n_processes_per_node(&self) -> usize {
            self.procs_per_node
        }
    }
}
