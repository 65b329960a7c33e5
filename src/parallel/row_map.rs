//! Contiguous row ownership over a communicator.

use super::Comm;
use std::fmt;
use std::sync::Arc;

/// Which global rows this process owns, plus the communicator used for reductions.
///
/// Rows are split into contiguous ranges in rank order; the first `global % size` ranks get
/// one extra row.
#[derive(Clone)]
pub struct RowMap {
    global: usize,
    offset: usize,
    local: usize,
    comm: Arc<dyn Comm>,
}

impl RowMap {
    /// Uniform contiguous distribution of `global` rows.
    pub fn uniform(global: usize, comm: Arc<dyn Comm>) -> Self {
        let (size, rank) = (comm.size(), comm.rank());
        let base = global / size;
        let extra = global % size;
        let local = base + usize::from(rank < extra);
        let offset = rank * base + rank.min(extra);
        Self { global, offset, local, comm }
    }

    /// Every row on a single process.
    pub fn serial(global: usize) -> Self {
        Self::uniform(global, Arc::new(super::SerialComm))
    }

    pub fn global_len(&self) -> usize { self.global }
    pub fn local_len(&self) -> usize { self.local }
    /// First global row owned here.
    pub fn offset(&self) -> usize { self.offset }
    pub fn comm(&self) -> &dyn Comm { self.comm.as_ref() }

    pub fn owns(&self, row: usize) -> bool {
        row >= self.offset && row < self.offset + self.local
    }

    /// Same global size and same local range on this process.
    pub fn is_compatible(&self, other: &RowMap) -> bool {
        self.global == other.global && self.offset == other.offset && self.local == other.local
    }
}

impl fmt::Debug for RowMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowMap")
            .field("global", &self.global)
            .field("offset", &self.offset)
            .field("local", &self.local)
            .field("rank", &self.comm.rank())
            .finish()
    }
}
