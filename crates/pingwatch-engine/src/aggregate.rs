//! Folding of completed rounds into per-target state, and snapshot publication.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pingwatch_model::{Measurement, Snapshot, TargetState};
use std::collections::HashMap;
use std::sync::Arc;

/// One probing pass over the distinct targets.
#[derive(Debug, Clone)]
pub struct Round {
    pub number: u64,
    pub started_at: DateTime<Utc>,
    pub targets: Arc<[String]>,
}

/// Fold one measurement into a target's counters.
pub fn record(state: &mut TargetState, measurement: Measurement, alpha: f64, capacity: usize) {
    state.sent += 1;
    if measurement.alive {
        state.received += 1;
        if let Some(rtt) = measurement.rtt_ms {
            state.last_rtt_ms = Some(rtt);
            state.smoothed_rtt_ms = Some(match state.smoothed_rtt_ms {
                Some(prev) => prev * (1.0 - alpha) + rtt * alpha,
                None => rtt,
            });
        }
    }
    state.last_alive = measurement.alive;
    state.last_checked_at = Some(measurement.timestamp);

    state.recent_history.push_back(measurement);
    while state.recent_history.len() > capacity {
        state.recent_history.pop_front();
    }
}

/// Read side of the published snapshot. Cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct SnapshotReader {
    slot: Arc<RwLock<Option<Arc<Snapshot>>>>,
}

impl SnapshotReader {
    /// The most recent complete round, if any round finished since start or reset.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.slot.read().clone()
    }
}

/// Sole owner and writer of every [`TargetState`].
#[derive(Debug)]
pub struct Aggregator {
    alpha: f64,
    capacity: usize,
    order: Vec<String>,
    states: HashMap<String, TargetState>,
    published: SnapshotReader,
}

impl Aggregator {
    pub fn new(alpha: f64, capacity: usize) -> Self {
        Self {
            alpha,
            capacity,
            order: Vec::new(),
            states: HashMap::new(),
            published: SnapshotReader::default(),
        }
    }

    pub fn reader(&self) -> SnapshotReader {
        self.published.clone()
    }

    pub fn state(&self, target: &str) -> Option<&TargetState> {
        self.states.get(target)
    }

    /// Fold a finished round and publish its snapshot. Measurements for the
    /// whole round are applied before the new snapshot becomes visible.
    pub fn fold_round<I>(&mut self, round: &Round, measurements: I) -> Arc<Snapshot>
    where
        I: IntoIterator<Item = (String, Measurement)>,
    {
        for (target, measurement) in measurements {
            if !self.states.contains_key(&target) {
                self.order.push(target.clone());
            }
            let state = self.states.entry(target).or_default();
            record(state, measurement, self.alpha, self.capacity);
        }

        let entries = self
            .order
            .iter()
            .filter_map(|target| {
                self.states
                    .get(target)
                    .map(|state| (target.clone(), state.clone()))
            })
            .collect();
        let snapshot = Arc::new(Snapshot::new(round.number, round.started_at, entries));
        *self.published.slot.write() = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Return every target to the zero state and withdraw the published snapshot.
    pub fn reset(&mut self) {
        for state in self.states.values_mut() {
            *state = TargetState::default();
        }
        *self.published.slot.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alive(rtt: f64) -> Measurement {
        Measurement::new(true, Some(rtt), Utc::now())
    }

    fn round(number: u64, targets: &[&str]) -> Round {
        Round {
            number,
            started_at: Utc::now(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn smoothing_seeds_then_blends() {
        let mut state = TargetState::default();
        assert_eq!(state.smoothed_rtt_ms, None);

        record(&mut state, alive(10.0), 0.3, 10);
        assert_eq!(state.smoothed_rtt_ms, Some(10.0));

        record(&mut state, alive(20.0), 0.3, 10);
        let smoothed = state.smoothed_rtt_ms.unwrap();
        assert!((smoothed - 13.0).abs() < 1e-9, "smoothed = {smoothed}");
    }

    #[test]
    fn lost_probe_keeps_previous_latency() {
        let mut state = TargetState::default();
        record(&mut state, alive(12.0), 0.3, 10);
        record(&mut state, Measurement::lost(Utc::now()), 0.3, 10);

        assert_eq!(state.sent, 2);
        assert_eq!(state.received, 1);
        assert!(!state.last_alive);
        assert_eq!(state.last_rtt_ms, Some(12.0));
        assert_eq!(state.smoothed_rtt_ms, Some(12.0));
    }

    #[test]
    fn alive_without_rtt_counts_but_leaves_latency() {
        let mut state = TargetState::default();
        record(&mut state, Measurement::new(true, None, Utc::now()), 0.3, 10);

        assert_eq!(state.received, 1);
        assert!(state.last_alive);
        assert_eq!(state.last_rtt_ms, None);
        assert_eq!(state.smoothed_rtt_ms, None);
    }

    #[test]
    fn history_evicts_oldest_first() {
        let mut state = TargetState::default();
        for rtt in 1..=4 {
            record(&mut state, alive(rtt as f64), 0.3, 3);
            assert!(state.recent_history.len() <= 3);
        }

        let kept: Vec<Option<f64>> = state.recent_history.iter().map(|m| m.rtt_ms).collect();
        assert_eq!(kept, vec![Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_rounds() {
        let mut aggregator = Aggregator::new(0.3, 10);
        let first = aggregator.fold_round(&round(1, &["a"]), vec![("a".to_string(), alive(5.0))]);
        let second = aggregator.fold_round(
            &round(2, &["a"]),
            vec![("a".to_string(), Measurement::lost(Utc::now()))],
        );

        assert_eq!(first.get("a").unwrap().sent, 1);
        assert!(first.get("a").unwrap().last_alive);
        assert_eq!(second.get("a").unwrap().sent, 2);
        assert_eq!(second.round(), 2);
        assert!(Arc::ptr_eq(&aggregator.reader().latest().unwrap(), &second));
    }

    #[test]
    fn reset_zeroes_state_and_clears_snapshot() {
        let mut aggregator = Aggregator::new(0.3, 10);
        let reader = aggregator.reader();
        aggregator.fold_round(&round(1, &["a"]), vec![("a".to_string(), alive(5.0))]);
        assert!(reader.latest().is_some());

        aggregator.reset();

        assert!(reader.latest().is_none());
        assert_eq!(aggregator.state("a"), Some(&TargetState::default()));
    }
}
