#![cfg(unix)]

use pingwatch_probe::{Platform, ProbeExecutor, ProbeFailure, SystemPingExecutor};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::time::{Duration, Instant};

// Kept alone in this file: writing and then exec'ing a script can hit
// ETXTBSY when another test thread forks in between.
#[test]
fn slow_ping_is_killed_at_the_time_limit() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("slow-ping");
    fs::write(
        &script,
        "#!/bin/sh\nsleep 5\necho '64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time=0.05 ms'\n",
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let grace = Duration::from_millis(250);
    let timeout = Duration::from_millis(300);
    let executor = SystemPingExecutor::new(Platform::Linux)
        .with_program(script.to_string_lossy())
        .with_exit_grace(grace);

    let started = Instant::now();
    let outcome = executor.probe("127.0.0.1", timeout);
    let elapsed = started.elapsed();

    assert!(matches!(outcome.failure, Some(ProbeFailure::Timeout)));
    assert!(!outcome.measurement.alive);
    assert_eq!(outcome.measurement.rtt_ms, None);
    assert!(elapsed >= timeout, "returned after {elapsed:?}");
    assert!(elapsed < timeout + grace + Duration::from_secs(1), "returned after {elapsed:?}");
}
