//! Communication substrate for distributed row ownership.
//!
//! The solver only ever needs two collectives: a sum-reduction of partial results and an
//! all-gather of row-distributed data. Both live behind the object-safe [`Comm`] trait so that
//! the numerical core can be written and tested single-process, with a distributed backend
//! injected at runtime.

use faer::c64;

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Replace each entry of `partial` with its sum over all processes.
    fn reduce_sum(&self, partial: &mut [f64]);
    /// Concatenate every process's `local` slice in rank order.
    fn all_gather(&self, local: &[f64]) -> Vec<f64>;

    fn all_reduce(&self, x: f64) -> f64 {
        let mut buf = [x];
        self.reduce_sum(&mut buf);
        buf[0]
    }
}

/// Sum-reduce complex partials by flattening them to interleaved `(re, im)` pairs.
pub fn reduce_sum_c64(comm: &dyn Comm, partial: &mut [c64]) {
    if comm.size() == 1 {
        return;
    }
    let mut flat: Vec<f64> = partial.iter().flat_map(|z| [z.re, z.im]).collect();
    comm.reduce_sum(&mut flat);
    for (z, pair) in partial.iter_mut().zip(flat.chunks_exact(2)) {
        *z = c64::new(pair[0], pair[1]);
    }
}

/// All-gather complex data, preserving rank order.
pub fn all_gather_c64(comm: &dyn Comm, local: &[c64]) -> Vec<c64> {
    if comm.size() == 1 {
        return local.to_vec();
    }
    let flat: Vec<f64> = local.iter().flat_map(|z| [z.re, z.im]).collect();
    comm.all_gather(&flat)
        .chunks_exact(2)
        .map(|pair| c64::new(pair[0], pair[1]))
        .collect()
}

/// Single-process communicator: every collective is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) {}
    fn reduce_sum(&self, _partial: &mut [f64]) {}
    fn all_gather(&self, local: &[f64]) -> Vec<f64> {
        local.to_vec()
    }
}

#[cfg(feature="mpi")]
pub mod mpi_comm;
#[cfg(feature="mpi")]
pub use mpi_comm::MpiComm;

#[cfg(feature="rayon")]
pub mod rayon_comm;
#[cfg(feature="rayon")]
pub use rayon_comm::RayonComm;

pub mod row_map;
pub use row_map::RowMap;

pub enum UniverseComm {
    #[cfg(feature="mpi")]
    Mpi(MpiComm),
    #[cfg(feature="rayon")]
    Rayon(RayonComm),
    Serial(SerialComm),
}

impl UniverseComm {
    /// Pick the widest backend compiled in: MPI, then rayon, then serial.
    pub fn world() -> Self {
        #[cfg(feature="mpi")]
        {
            return UniverseComm::Mpi(MpiComm::new());
        }
        #[cfg(all(feature="rayon", not(feature="mpi")))]
        {
            return UniverseComm::Rayon(RayonComm::new());
        }
        #[cfg(not(any(feature="mpi", feature="rayon")))]
        {
            UniverseComm::Serial(SerialComm)
        }
    }
}

impl Comm for UniverseComm {
    fn rank(&self) -> usize {
        match self {
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.rank(),
            UniverseComm::Serial(comm) => comm.rank(),
        }
    }
    fn size(&self) -> usize {
        match self {
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.size(),
            UniverseComm::Serial(comm) => comm.size(),
        }
    }
    fn barrier(&self) {
        match self {
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.barrier(),
            UniverseComm::Serial(comm) => comm.barrier(),
        }
    }
    fn reduce_sum(&self, partial: &mut [f64]) {
        match self {
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.reduce_sum(partial),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.reduce_sum(partial),
            UniverseComm::Serial(comm) => comm.reduce_sum(partial),
        }
    }
    fn all_gather(&self, local: &[f64]) -> Vec<f64> {
        match self {
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.all_gather(local),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.all_gather(local),
            UniverseComm::Serial(comm) => comm.all_gather(local),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_collectives_are_identity() {
        let comm = SerialComm;
        let mut buf = [1.0, 2.0];
        comm.reduce_sum(&mut buf);
        assert_eq!(buf, [1.0, 2.0]);
        assert_eq!(comm.all_reduce(3.5), 3.5);
        let z = [c64::new(1.0, -1.0)];
        assert_eq!(all_gather_c64(&comm, &z), z.to_vec());
    }
}
