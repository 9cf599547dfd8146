use crate::runner::{ProbeExecutor, ProbeOutcome};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::time::Duration;

/// Fixed-size worker pool that runs one probe per target and joins them all.
pub struct ProbePool {
    pool: ThreadPool,
    workers: usize,
}

impl ProbePool {
    /// Pool of `min(max_concurrency, target_count)` workers, at least one.
    pub fn new(max_concurrency: usize, target_count: usize) -> Result<Self, ThreadPoolBuildError> {
        let workers = max_concurrency.min(target_count).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("pingwatch-probe-{index}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Probe every target and return once all probes have finished.
    /// Outcomes come back in the order of `targets`.
    pub fn run<E: ProbeExecutor + ?Sized>(
        &self,
        executor: &E,
        targets: &[String],
        timeout: Duration,
    ) -> Vec<ProbeOutcome> {
        self.pool.install(|| {
            targets
                .par_iter()
                .map(|target| executor.probe(target, timeout))
                .collect()
        })
    }
}

impl std::fmt::Debug for ProbePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbePool")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}
