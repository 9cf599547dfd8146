use pingwatch_engine::{ConfigError, Monitor, MonitorConfig, MonitorError};
use pingwatch_probe::{ScriptedExecutor, ScriptedReply};
use std::time::Duration;

fn config(targets: &[&str]) -> MonitorConfig {
    MonitorConfig::new(targets.iter().copied())
        .with_interval(Duration::from_millis(200))
        .with_probe_timeout(Duration::from_millis(50))
}

#[test]
fn three_round_scenario_matches_expected_state() {
    let executor = ScriptedExecutor::new()
        .script(
            "8.8.8.8",
            [ScriptedReply::up(10.0), ScriptedReply::up(12.0), ScriptedReply::Timeout],
        )
        .script(
            "1.1.1.1",
            [ScriptedReply::up(5.0), ScriptedReply::up(5.0), ScriptedReply::up(5.0)],
        );
    let mut monitor = Monitor::new(config(&["8.8.8.8", "1.1.1.1"]), executor).unwrap();

    let mut last = None;
    for _ in 0..3 {
        last = Some(monitor.run_round());
    }
    let report = last.unwrap();
    assert_eq!(report.timeouts, 1);
    assert!(report.errors.is_empty());

    let snapshot = report.snapshot;
    assert_eq!(snapshot.round(), 3);

    let google = snapshot.get("8.8.8.8").unwrap();
    assert_eq!(google.sent, 3);
    assert_eq!(google.received, 2);
    assert!(!google.last_alive);
    assert_eq!(google.last_rtt_ms, Some(12.0));
    assert!((google.loss_percent().unwrap() - 33.333_333).abs() < 1e-3);
    // 10 seeds the average, then 10 * 0.7 + 12 * 0.3; the timeout adds nothing.
    assert!((google.smoothed_rtt_ms.unwrap() - 10.6).abs() < 1e-9);

    let cloudflare = snapshot.get("1.1.1.1").unwrap();
    assert_eq!(cloudflare.sent, 3);
    assert_eq!(cloudflare.received, 3);
    assert_eq!(cloudflare.loss_percent(), Some(0.0));
    assert!(cloudflare.last_alive);
}

#[test]
fn every_target_is_sent_once_per_round() {
    let executor = ScriptedExecutor::new()
        .script("a", [ScriptedReply::up(1.0), ScriptedReply::down()])
        .script("b", [ScriptedReply::SpawnFailure])
        .script("c", [ScriptedReply::Timeout, ScriptedReply::up(3.0)]);
    let mut monitor = Monitor::new(config(&["a", "b", "c", "d"]), executor).unwrap();

    for round in 1..=5u64 {
        let snapshot = monitor.run_round().snapshot;
        for (target, state) in snapshot.iter() {
            assert_eq!(state.sent, round, "{target} after round {round}");
            assert!(state.received <= state.sent);
        }
    }
}

#[test]
fn duplicate_targets_share_one_state() {
    let executor = ScriptedExecutor::new().script("a", vec![ScriptedReply::up(1.0); 4]);
    let mut monitor = Monitor::new(config(&["a", "b", "a"]), executor).unwrap();
    assert_eq!(monitor.targets().to_vec(), vec!["a", "b"]);

    monitor.run_round();
    let snapshot = monitor.run_round().snapshot;

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("a").unwrap().sent, 2);
    assert_eq!(snapshot.get("a").unwrap().received, 2);
}

#[test]
fn execution_error_is_isolated_to_its_target() {
    let executor = ScriptedExecutor::new()
        .script("broken", [ScriptedReply::SpawnFailure])
        .script("healthy", [ScriptedReply::up(4.0)]);
    let mut monitor = Monitor::new(config(&["broken", "healthy"]), executor).unwrap();

    let report = monitor.run_round();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "broken");
    let broken = report.snapshot.get("broken").unwrap();
    assert_eq!((broken.sent, broken.received), (1, 0));
    assert!(!broken.last_alive);
    let healthy = report.snapshot.get("healthy").unwrap();
    assert!(healthy.last_alive);
    assert_eq!(healthy.last_rtt_ms, Some(4.0));
}

#[test]
fn history_is_bounded_by_configured_window() {
    let executor = ScriptedExecutor::new().script("a", (1..=6).map(|ms| ScriptedReply::up(ms as f64)));
    let mut monitor =
        Monitor::new(config(&["a"]).with_history_window(4), executor).unwrap();

    let mut snapshot = None;
    for _ in 0..6 {
        snapshot = Some(monitor.run_round().snapshot);
    }
    let state = snapshot.unwrap().get("a").unwrap().clone();

    let history: Vec<f64> = state
        .recent_history
        .iter()
        .filter_map(|m| m.rtt_ms)
        .collect();
    assert_eq!(history, vec![3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn reset_returns_to_zero_and_counting_restarts() {
    let executor = ScriptedExecutor::new().script("a", vec![ScriptedReply::up(8.0); 3]);
    let mut monitor = Monitor::new(config(&["a"]), executor).unwrap();
    let reader = monitor.snapshots();

    monitor.run_round();
    monitor.run_round();
    monitor.reset();
    assert!(reader.latest().is_none());

    let snapshot = monitor.run_round().snapshot;
    let state = snapshot.get("a").unwrap();
    assert_eq!(state.sent, 1);
    assert_eq!(state.smoothed_rtt_ms, Some(8.0));
    assert_eq!(state.recent_history.len(), 1);
    assert!(std::sync::Arc::ptr_eq(&reader.latest().unwrap(), &snapshot));
}

#[test]
fn configured_alpha_drives_smoothing() {
    let executor = ScriptedExecutor::new().script("a", [ScriptedReply::up(10.0), ScriptedReply::up(20.0)]);
    let mut monitor =
        Monitor::new(config(&["a"]).with_smoothing_alpha(0.7), executor).unwrap();

    monitor.run_round();
    let snapshot = monitor.run_round().snapshot;

    let smoothed = snapshot.get("a").unwrap().smoothed_rtt_ms.unwrap();
    assert!((smoothed - 17.0).abs() < 1e-9);
}

#[test]
fn invalid_config_is_rejected_before_any_state() {
    let err = Monitor::new(
        config(&["a"]).with_probe_timeout(Duration::from_millis(500)),
        ScriptedExecutor::new(),
    )
    .unwrap_err();
    assert!(matches!(err, MonitorError::Config(ConfigError::Invalid(_))));

    let err = Monitor::new(MonitorConfig::default(), ScriptedExecutor::new()).unwrap_err();
    assert!(err.to_string().contains("no targets"));
}
