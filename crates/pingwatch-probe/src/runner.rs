use crate::command::{build_ping_command, Platform};
use crate::parser::parse_ping_output;
use chrono::Utc;
use pingwatch_model::Measurement;
use process_control::{ChildExt, Control};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Slack on top of the probe timeout before the child is terminated. `ping`
/// needs a moment to exit after its own wait expires.
const DEFAULT_EXIT_GRACE: Duration = Duration::from_millis(250);

/// The probing mechanism itself could not be run.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to spawn {program} for {target}: {source}")]
    Spawn {
        program: String,
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("failed waiting on {program} for {target}: {source}")]
    Wait {
        program: String,
        target: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
pub enum ProbeFailure {
    Timeout,
    Execution(ExecutionError),
}

/// What one probe produced. A measurement is always present; `failure`
/// explains a loss that did not come from the target itself.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub target: String,
    pub measurement: Measurement,
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn completed(target: &str, measurement: Measurement) -> Self {
        Self {
            target: target.to_string(),
            measurement,
            failure: None,
        }
    }

    pub fn timed_out(target: &str) -> Self {
        Self {
            target: target.to_string(),
            measurement: Measurement::lost(Utc::now()),
            failure: Some(ProbeFailure::Timeout),
        }
    }

    pub fn failed(target: &str, err: ExecutionError) -> Self {
        Self {
            target: target.to_string(),
            measurement: Measurement::lost(Utc::now()),
            failure: Some(ProbeFailure::Execution(err)),
        }
    }
}

/// Runs a single probe. Implementations must not panic and must return
/// within roughly `timeout`.
pub trait ProbeExecutor: Send + Sync {
    fn probe(&self, target: &str, timeout: Duration) -> ProbeOutcome;
}

impl<T: ProbeExecutor + ?Sized> ProbeExecutor for Arc<T> {
    fn probe(&self, target: &str, timeout: Duration) -> ProbeOutcome {
        (**self).probe(target, timeout)
    }
}

/// Spawns the platform `ping` utility once per probe.
#[derive(Debug, Clone)]
pub struct SystemPingExecutor {
    platform: Platform,
    program: Option<String>,
    exit_grace: Duration,
}

impl Default for SystemPingExecutor {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            program: None,
            exit_grace: DEFAULT_EXIT_GRACE,
        }
    }
}

impl SystemPingExecutor {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            ..Self::default()
        }
    }

    /// Run this binary instead of `ping`, keeping the platform's flags.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_exit_grace(mut self, exit_grace: Duration) -> Self {
        self.exit_grace = exit_grace;
        self
    }
}

impl ProbeExecutor for SystemPingExecutor {
    fn probe(&self, target: &str, timeout: Duration) -> ProbeOutcome {
        let mut spec = build_ping_command(target, timeout, self.platform);
        if let Some(program) = &self.program {
            spec.program = program.clone();
        }

        let child = spec
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(source) => {
                return ProbeOutcome::failed(
                    target,
                    ExecutionError::Spawn {
                        program: spec.program,
                        target: target.to_string(),
                        source,
                    },
                );
            }
        };

        let waited = child
            .controlled_with_output()
            .time_limit(timeout + self.exit_grace)
            .terminate_for_timeout()
            .wait();

        match waited {
            Ok(Some(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                let reply = parse_ping_output(&text);
                tracing::debug!(
                    host = %target,
                    alive = reply.alive,
                    rtt_ms = ?reply.rtt_ms,
                    "probe finished"
                );
                ProbeOutcome::completed(
                    target,
                    Measurement::new(reply.alive, reply.rtt_ms, Utc::now()),
                )
            }
            Ok(None) => {
                tracing::debug!(
                    host = %target,
                    timeout_ms = timeout.as_millis() as u64,
                    "probe timed out"
                );
                ProbeOutcome::timed_out(target)
            }
            Err(source) => ProbeOutcome::failed(
                target,
                ExecutionError::Wait {
                    program: spec.program,
                    target: target.to_string(),
                    source,
                },
            ),
        }
    }
}

/// One scripted answer for [`ScriptedExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Reply { alive: bool, rtt_ms: Option<f64> },
    Timeout,
    SpawnFailure,
}

impl ScriptedReply {
    pub fn up(rtt_ms: f64) -> Self {
        ScriptedReply::Reply {
            alive: true,
            rtt_ms: Some(rtt_ms),
        }
    }

    pub fn down() -> Self {
        ScriptedReply::Reply {
            alive: false,
            rtt_ms: None,
        }
    }
}

/// Executor that replays per-target scripts without touching the network.
///
/// Targets without a script, or whose script ran out, answer as lost.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    delay: Duration,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every probe.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(
        self,
        target: impl Into<String>,
        replies: impl IntoIterator<Item = ScriptedReply>,
    ) -> Self {
        self.push(target, replies);
        self
    }

    pub fn push(&self, target: impl Into<String>, replies: impl IntoIterator<Item = ScriptedReply>) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|err| err.into_inner());
        scripts.entry(target.into()).or_default().extend(replies);
    }

    fn next_reply(&self, target: &str) -> Option<ScriptedReply> {
        let mut scripts = self.scripts.lock().unwrap_or_else(|err| err.into_inner());
        scripts.get_mut(target).and_then(VecDeque::pop_front)
    }
}

impl ProbeExecutor for ScriptedExecutor {
    fn probe(&self, target: &str, _timeout: Duration) -> ProbeOutcome {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        match self.next_reply(target) {
            Some(ScriptedReply::Reply { alive, rtt_ms }) => {
                ProbeOutcome::completed(target, Measurement::new(alive, rtt_ms, Utc::now()))
            }
            Some(ScriptedReply::Timeout) => ProbeOutcome::timed_out(target),
            Some(ScriptedReply::SpawnFailure) => ProbeOutcome::failed(
                target,
                ExecutionError::Spawn {
                    program: "ping".to_string(),
                    target: target.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
                },
            ),
            None => ProbeOutcome::completed(target, Measurement::lost(Utc::now())),
        }
    }
}
