//! Timer-driven rounds on a dedicated coordinating thread.
//!
//! The thread owns the [`Monitor`], so every mutation of target state happens
//! there, strictly after a round has joined. Rounds never overlap: a tick
//! that comes due while a round is still sampling is dropped and reported as
//! [`MonitorEvent::TickSkipped`]; a manual trigger issued while a round is in
//! flight is ignored.

use crate::aggregate::SnapshotReader;
use crate::monitor::{Monitor, MonitorError};
use pingwatch_model::Snapshot;
use pingwatch_probe::ProbeExecutor;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Events queued for a consumer before new ones are dropped.
const EVENT_BACKLOG: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Sampling,
    Stopped,
}

impl SchedulerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SchedulerState::Idle,
            1 => SchedulerState::Sampling,
            _ => SchedulerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SchedulerState::Idle => 0,
            SchedulerState::Sampling => 1,
            SchedulerState::Stopped => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    RoundCompleted(Arc<Snapshot>),
    TickSkipped { missed: u64 },
    ExecutionError { target: String, message: String },
    Reset,
}

#[derive(Debug)]
enum Command {
    RunOnce { requested_at: Instant },
    Reset,
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Default)]
struct StateCell(AtomicU8);

impl StateCell {
    fn get(&self) -> SchedulerState {
        SchedulerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: SchedulerState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

pub struct ProbeScheduler<E> {
    monitor: Monitor<E>,
    paused: bool,
    events: Option<SyncSender<MonitorEvent>>,
}

impl<E: ProbeExecutor + 'static> ProbeScheduler<E> {
    pub fn new(monitor: Monitor<E>) -> Self {
        Self {
            monitor,
            paused: false,
            events: None,
        }
    }

    /// Start without the timer; rounds run only on [`SchedulerHandle::trigger_now`]
    /// until [`SchedulerHandle::resume`].
    pub fn paused(mut self) -> Self {
        self.paused = true;
        self
    }

    /// Subscribe to scheduler events. Events are dropped rather than queued
    /// without bound when the receiver falls behind.
    pub fn subscribe(&mut self) -> Receiver<MonitorEvent> {
        let (tx, rx) = mpsc::sync_channel(EVENT_BACKLOG);
        self.events = Some(tx);
        rx
    }

    pub fn start(self) -> Result<SchedulerHandle, MonitorError> {
        let (commands, inbox) = mpsc::channel();
        let state = Arc::new(StateCell::default());
        let snapshots = self.monitor.snapshots();

        let worker = Worker {
            monitor: self.monitor,
            inbox,
            state: Arc::clone(&state),
            events: self.events,
            paused: self.paused,
            last_round_started: None,
        };
        let thread = thread::Builder::new()
            .name("pingwatch-scheduler".to_string())
            .spawn(move || worker.run())
            .map_err(MonitorError::Spawn)?;

        Ok(SchedulerHandle {
            commands,
            state,
            snapshots,
            thread: Some(thread),
        })
    }
}

/// Control surface of a running scheduler. Dropping it stops the scheduler.
pub struct SchedulerHandle {
    commands: Sender<Command>,
    state: Arc<StateCell>,
    snapshots: SnapshotReader,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        self.state.get()
    }

    pub fn snapshots(&self) -> SnapshotReader {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.snapshots.latest()
    }

    /// Ask for one immediate round. Returns `false` when the request is
    /// ignored because a round is already in flight or the scheduler stopped.
    pub fn trigger_now(&self) -> bool {
        if self.state() != SchedulerState::Idle {
            return false;
        }
        self.commands
            .send(Command::RunOnce {
                requested_at: Instant::now(),
            })
            .is_ok()
    }

    /// Zero every counter once the current round, if any, has been folded.
    /// Returns `false` once the scheduler has stopped.
    pub fn reset(&self) -> bool {
        self.send(Command::Reset)
    }

    pub fn pause(&self) -> bool {
        self.send(Command::Pause)
    }

    /// Re-enable the timer; the next round starts right away.
    pub fn resume(&self) -> bool {
        self.send(Command::Resume)
    }

    fn send(&self, command: Command) -> bool {
        match self.commands.send(command) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(command = ?err.0, "scheduler stopped, command dropped");
                false
            }
        }
    }

    /// Stop scheduling. An in-flight round finishes first, so this blocks for
    /// at most one probe timeout. Calling it again is a no-op.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.commands.send(Command::Stop);
        if thread.join().is_err() {
            tracing::error!("scheduler thread panicked");
            self.state.set(SchedulerState::Stopped);
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<E> {
    monitor: Monitor<E>,
    inbox: Receiver<Command>,
    state: Arc<StateCell>,
    events: Option<SyncSender<MonitorEvent>>,
    paused: bool,
    last_round_started: Option<Instant>,
}

impl<E: ProbeExecutor> Worker<E> {
    fn run(mut self) {
        let interval = self.monitor.config().interval;
        let mut next_tick = Instant::now();
        tracing::info!(
            targets = self.monitor.targets().len(),
            interval_ms = interval.as_millis() as u64,
            paused = self.paused,
            "scheduler started"
        );

        loop {
            let command = if self.paused {
                match self.inbox.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            } else {
                let wait = next_tick.saturating_duration_since(Instant::now());
                match self.inbox.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };

            match command {
                None => {
                    let started = self.sample();
                    next_tick = started + interval;
                    self.skip_missed_ticks(&mut next_tick, interval);
                }
                Some(Command::RunOnce { requested_at }) => {
                    if self
                        .last_round_started
                        .is_some_and(|started| started >= requested_at)
                    {
                        tracing::debug!("manual trigger overlapped a round, ignored");
                        continue;
                    }
                    let started = self.sample();
                    if !self.paused {
                        next_tick = started + interval;
                        self.skip_missed_ticks(&mut next_tick, interval);
                    }
                }
                Some(Command::Reset) => {
                    self.monitor.reset();
                    self.emit(MonitorEvent::Reset);
                }
                Some(Command::Pause) => {
                    self.paused = true;
                    tracing::info!("scheduler paused");
                }
                Some(Command::Resume) => {
                    if self.paused {
                        self.paused = false;
                        next_tick = Instant::now();
                        tracing::info!("scheduler resumed");
                    }
                }
                Some(Command::Stop) => break,
            }
        }

        self.state.set(SchedulerState::Stopped);
        tracing::info!(rounds = self.monitor.rounds(), "scheduler stopped");
    }

    fn sample(&mut self) -> Instant {
        let started = Instant::now();
        self.last_round_started = Some(started);
        self.state.set(SchedulerState::Sampling);

        let report = self.monitor.run_round();

        self.state.set(SchedulerState::Idle);
        for (target, err) in report.errors {
            self.emit(MonitorEvent::ExecutionError {
                target,
                message: err.to_string(),
            });
        }
        self.emit(MonitorEvent::RoundCompleted(report.snapshot));
        started
    }

    fn skip_missed_ticks(&self, next_tick: &mut Instant, interval: Duration) {
        let now = Instant::now();
        let mut missed = 0;
        while *next_tick <= now {
            *next_tick += interval;
            missed += 1;
        }
        if missed > 0 {
            tracing::warn!(missed, "round overran the interval, ticks skipped");
            self.emit(MonitorEvent::TickSkipped { missed });
        }
    }

    fn emit(&self, event: MonitorEvent) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => tracing::debug!("event receiver lagging, event dropped"),
        }
    }
}
