/// MPI-based parallel communication module.
///
/// This module provides an implementation of the `Comm` trait using the MPI (Message Passing Interface)
/// backend for distributed-memory parallelism. Only the two collectives the solver needs are
/// exposed: an element-wise sum all-reduce and a variable-count all-gather.
///
/// # References
/// - [MPI Standard](https://www.mpi-forum.org/)

#[cfg(feature = "mpi")]
use mpi::collective::SystemOperation;
#[cfg(feature = "mpi")]
use mpi::datatype::PartitionMut;
#[cfg(feature = "mpi")]
use mpi::environment::Universe;
#[cfg(feature = "mpi")]
use mpi::topology::SimpleCommunicator;
#[cfg(feature = "mpi")]
use mpi::traits::*;
#[cfg(feature = "mpi")]
use mpi::Count;

/// MPI communicator wrapper for distributed parallelism.
///
/// Owns the MPI universe so that MPI stays initialized for the lifetime of the communicator.
#[cfg(feature = "mpi")]
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
    _universe: Universe,
}

#[cfg(feature = "mpi")]
impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    ///
    /// # Panics
    /// Panics if MPI was already initialized by someone else.
    pub fn new() -> Self {
        let universe = mpi::initialize().expect("MPI initialization failed");
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        MpiComm { world, rank, size, _universe: universe }
    }
}

#[cfg(feature = "mpi")]
impl super::Comm for MpiComm {
    /// Returns the rank (ID) of this process.
    fn rank(&self) -> usize { self.rank }
    /// Returns the total number of processes in the communicator.
    fn size(&self) -> usize { self.size }
    /// Synchronizes all processes at a barrier.
    fn barrier(&self) { self.world.barrier(); }

    /// Element-wise sum of `partial` across all processes, written back in place.
    fn reduce_sum(&self, partial: &mut [f64]) {
        let send = partial.to_vec();
        self.world.all_reduce_into(&send[..], partial, &SystemOperation::sum());
    }

    /// Gathers every rank's slice (lengths may differ) into one vector on all ranks.
    fn all_gather(&self, local: &[f64]) -> Vec<f64> {
        let mut counts: Vec<Count> = vec![0; self.size];
        let n_local = local.len() as Count;
        self.world.all_gather_into(&n_local, &mut counts[..]);
        let displs: Vec<Count> = counts
            .iter()
            .scan(0, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect();
        let total: Count = counts.iter().sum();
        let mut buf = vec![0.0f64; total as usize];
        {
            let mut partition = PartitionMut::new(&mut buf[..], counts, &displs[..]);
            self.world.all_gather_varcount_into(local, &mut partition);
        }
        buf
    }
}
