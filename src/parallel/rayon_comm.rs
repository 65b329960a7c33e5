// rayon-based shared-memory communication

/// One process whose local kernels run on the global rayon pool.
///
/// Collectives are trivial because all rows live in this process; the parallelism is inside
/// the block-vector and sparse kernels.
pub struct RayonComm {
    threads: usize,
}

impl RayonComm {
    pub fn new() -> Self {
        let threads = num_cpus::get();
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .ok();
        RayonComm { threads }
    }

    /// Worker threads available to local kernels.
    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl Default for RayonComm {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Comm for RayonComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) { rayon::scope(|_| {}); }
    fn reduce_sum(&self, _partial: &mut [f64]) {
        // No-op for shared memory
    }
    fn all_gather(&self, local: &[f64]) -> Vec<f64> {
        local.to_vec()
    }
}
