//! Per-target aggregation and round scheduling.

pub mod aggregate;
pub mod config;
pub mod monitor;
pub mod scheduler;

pub use aggregate::{record, Aggregator, Round, SnapshotReader};
pub use config::{ConfigError, MonitorConfig};
pub use monitor::{Monitor, MonitorError, RoundReport};
pub use scheduler::{MonitorEvent, ProbeScheduler, SchedulerHandle, SchedulerState};
