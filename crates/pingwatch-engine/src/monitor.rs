use crate::aggregate::{Aggregator, Round, SnapshotReader};
use crate::config::{ConfigError, MonitorConfig};
use chrono::Utc;
use pingwatch_model::Snapshot;
use pingwatch_probe::{ExecutionError, ProbeExecutor, ProbeFailure, ProbePool};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build probe pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to start scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// What one round produced besides the snapshot itself.
#[derive(Debug)]
pub struct RoundReport {
    pub snapshot: Arc<Snapshot>,
    pub timeouts: usize,
    pub errors: Vec<(String, ExecutionError)>,
}

/// A monitoring session: the configured targets, the probe pool and the
/// aggregated state. Drive it by hand with [`Monitor::run_round`] or hand it
/// to [`crate::ProbeScheduler`].
pub struct Monitor<E> {
    config: MonitorConfig,
    targets: Arc<[String]>,
    executor: E,
    pool: ProbePool,
    aggregator: Aggregator,
    rounds: u64,
}

impl<E: ProbeExecutor> Monitor<E> {
    /// Validates `config` before anything is allocated.
    pub fn new(config: MonitorConfig, executor: E) -> Result<Self, MonitorError> {
        config.validate()?;

        let targets: Arc<[String]> = config.distinct_targets().into();
        let pool = ProbePool::new(config.max_concurrency, targets.len())?;
        let aggregator = Aggregator::new(config.smoothing_alpha, config.history_window);

        tracing::debug!(
            targets = targets.len(),
            workers = pool.workers(),
            interval_ms = config.interval.as_millis() as u64,
            timeout_ms = config.probe_timeout.as_millis() as u64,
            "monitor ready"
        );

        Ok(Self {
            config,
            targets,
            executor,
            pool,
            aggregator,
            rounds: 0,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Distinct targets in the order they were configured.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn snapshots(&self) -> SnapshotReader {
        self.aggregator.reader()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.aggregator.reader().latest()
    }

    /// Probe every target once, wait for all of them, then fold and publish.
    pub fn run_round(&mut self) -> RoundReport {
        self.rounds += 1;
        let round = Round {
            number: self.rounds,
            started_at: Utc::now(),
            targets: Arc::clone(&self.targets),
        };
        let clock = Instant::now();

        let outcomes = self
            .pool
            .run(&self.executor, &round.targets, self.config.probe_timeout);

        let mut timeouts = 0;
        let mut errors = Vec::new();
        let mut measurements = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome.failure {
                Some(ProbeFailure::Timeout) => timeouts += 1,
                Some(ProbeFailure::Execution(err)) => {
                    tracing::warn!(host = %outcome.target, error = %err, "probe could not run");
                    errors.push((outcome.target.clone(), err));
                }
                None => {}
            }
            measurements.push((outcome.target, outcome.measurement));
        }

        let snapshot = self.aggregator.fold_round(&round, measurements);
        let summary = snapshot.summary();
        tracing::info!(
            round = round.number,
            up = summary.up,
            down = summary.down,
            timeouts,
            errors = errors.len(),
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "round complete"
        );

        RoundReport {
            snapshot,
            timeouts,
            errors,
        }
    }

    /// Zero every counter and drop the published snapshot.
    pub fn reset(&mut self) {
        self.aggregator.reset();
        tracing::info!(targets = self.targets.len(), "counters reset");
    }
}

impl<E> std::fmt::Debug for Monitor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("rounds", &self.rounds)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
