//! Shared data structures for pingwatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Result of one probe against one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    pub alive: bool,
    pub rtt_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    pub fn new(alive: bool, rtt_ms: Option<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            alive,
            rtt_ms,
            timestamp,
        }
    }

    /// A probe that produced no reply: timeout, unreadable output or a failed spawn.
    pub fn lost(timestamp: DateTime<Utc>) -> Self {
        Self::new(false, None, timestamp)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Up,
    Down,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => f.write_str("UP"),
            Status::Down => f.write_str("DOWN"),
        }
    }
}

/// Running counters for a single target.
///
/// `Default` is the zero state a target starts in and returns to on reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TargetState {
    pub sent: u64,
    pub received: u64,
    pub last_alive: bool,
    pub last_rtt_ms: Option<f64>,
    pub smoothed_rtt_ms: Option<f64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub recent_history: VecDeque<Measurement>,
}

impl TargetState {
    /// Percentage of probes that did not come back alive, `None` before the first probe.
    pub fn loss_percent(&self) -> Option<f64> {
        if self.sent == 0 {
            return None;
        }
        Some(100.0 * (1.0 - self.received as f64 / self.sent as f64))
    }

    pub fn status(&self) -> Status {
        if self.last_alive {
            Status::Up
        } else {
            Status::Down
        }
    }
}

/// One table row of the output surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetRow {
    pub host: String,
    pub status: Status,
    pub last_rtt_ms: Option<f64>,
    pub smoothed_rtt_ms: Option<f64>,
    pub sent: u64,
    pub received: u64,
    pub loss_percent: Option<f64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Measurement>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Summary {
    pub up: usize,
    pub down: usize,
}

/// Immutable copy of every target's state at the end of a round.
///
/// Entries keep the order in which targets were first seen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "SnapshotParts")]
pub struct Snapshot {
    round: u64,
    taken_at: DateTime<Utc>,
    entries: Vec<(String, TargetState)>,
    #[serde(skip)]
    index: BTreeMap<String, usize>,
}

#[derive(Deserialize)]
struct SnapshotParts {
    round: u64,
    taken_at: DateTime<Utc>,
    entries: Vec<(String, TargetState)>,
}

impl From<SnapshotParts> for Snapshot {
    fn from(parts: SnapshotParts) -> Self {
        Snapshot::new(parts.round, parts.taken_at, parts.entries)
    }
}

impl Snapshot {
    pub fn new(round: u64, taken_at: DateTime<Utc>, entries: Vec<(String, TargetState)>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(pos, (target, _))| (target.clone(), pos))
            .collect();
        Self {
            round,
            taken_at,
            entries,
            index,
        }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, target: &str) -> Option<&TargetState> {
        let pos = *self.index.get(target)?;
        self.entries.get(pos).map(|(_, state)| state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TargetState)> {
        self.entries
            .iter()
            .map(|(target, state)| (target.as_str(), state))
    }

    pub fn rows(&self, include_history: bool) -> Vec<TargetRow> {
        self.iter()
            .map(|(host, state)| TargetRow {
                host: host.to_string(),
                status: state.status(),
                last_rtt_ms: state.last_rtt_ms,
                smoothed_rtt_ms: state.smoothed_rtt_ms,
                sent: state.sent,
                received: state.received,
                loss_percent: state.loss_percent(),
                last_checked_at: state.last_checked_at,
                history: include_history
                    .then(|| state.recent_history.iter().cloned().collect()),
            })
            .collect()
    }

    pub fn summary(&self) -> Summary {
        self.iter().fold(Summary::default(), |mut acc, (_, state)| {
            match state.status() {
                Status::Up => acc.up += 1,
                Status::Down => acc.down += 1,
            }
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_790_000_000 + secs, 0).unwrap()
    }

    fn state(sent: u64, received: u64, alive: bool) -> TargetState {
        TargetState {
            sent,
            received,
            last_alive: alive,
            last_rtt_ms: alive.then_some(12.5),
            smoothed_rtt_ms: alive.then_some(11.0),
            last_checked_at: Some(at(0)),
            recent_history: VecDeque::from(vec![Measurement::new(alive, None, at(0))]),
        }
    }

    #[test]
    fn loss_percent_is_absent_before_first_probe() {
        assert_eq!(TargetState::default().loss_percent(), None);
        assert_eq!(TargetState::default().status(), Status::Down);
    }

    #[test]
    fn loss_percent_follows_received_over_sent() {
        let loss = state(3, 2, false).loss_percent().unwrap();
        assert!((loss - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(state(4, 4, true).loss_percent(), Some(0.0));
        assert_eq!(state(2, 0, false).loss_percent(), Some(100.0));
    }

    #[test]
    fn rows_keep_first_seen_order() {
        let snapshot = Snapshot::new(
            7,
            at(5),
            vec![
                ("8.8.8.8".to_string(), state(2, 2, true)),
                ("10.0.0.1".to_string(), state(2, 0, false)),
                ("1.1.1.1".to_string(), state(2, 1, true)),
            ],
        );

        let hosts: Vec<String> = snapshot.rows(false).into_iter().map(|row| row.host).collect();
        assert_eq!(hosts, vec!["8.8.8.8", "10.0.0.1", "1.1.1.1"]);
        assert_eq!(snapshot.round(), 7);
        assert_eq!(snapshot.get("10.0.0.1").unwrap().received, 0);
        assert!(snapshot.get("9.9.9.9").is_none());
        assert_eq!(snapshot.summary(), Summary { up: 2, down: 1 });
    }

    #[test]
    fn rows_carry_history_only_when_asked() {
        let snapshot = Snapshot::new(1, at(0), vec![("a".to_string(), state(1, 1, true))]);

        assert!(snapshot.rows(false)[0].history.is_none());
        assert_eq!(snapshot.rows(true)[0].history.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn row_json_uses_uppercase_status() {
        let snapshot = Snapshot::new(1, at(0), vec![("a".to_string(), state(2, 1, false))]);
        let json = serde_json::to_value(&snapshot.rows(false)[0]).unwrap();

        assert_eq!(json["status"], "DOWN");
        assert_eq!(json["loss_percent"], 50.0);
        assert!(json.get("history").is_none());
    }

    #[test]
    fn deserialized_snapshot_equals_its_source() {
        let snapshot = Snapshot::new(3, at(0), vec![("a".to_string(), state(1, 1, true))]);
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: Snapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.get("a").unwrap().sent, 1);
        assert!(decoded.get("b").is_none());
        assert_eq!(decoded, snapshot);
    }
}
