/// Combines the local partial sums of every worker. Entry points return
/// reduced results.
pub trait ReductionDriver: Send + Sync {
    fn nworkers(&self) -> usize;

    fn allreduce_inplace(&self, data: &mut [f64]);
}

/// Single worker: local sums are already global.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalReduction;

impl ReductionDriver for LocalReduction {
    fn nworkers(&self) -> usize {
        1
    }

    fn allreduce_inplace(&self, _data: &mut [f64]) {}
}
