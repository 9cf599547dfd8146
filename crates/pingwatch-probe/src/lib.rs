//! Ping invocation, output parsing and probe execution.

pub mod command;
pub mod parser;
pub mod pool;
pub mod runner;
pub mod targets;

pub use command::{build_ping_command, PingCommand, Platform};
pub use parser::{parse_ping_output, ParsedReply};
pub use pool::ProbePool;
pub use runner::{
    ExecutionError, ProbeExecutor, ProbeFailure, ProbeOutcome, ScriptedExecutor, ScriptedReply,
    SystemPingExecutor,
};
pub use targets::parse_target_list;
