mod table;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use pingwatch_engine::{Monitor, MonitorConfig, MonitorEvent, ProbeScheduler};
use pingwatch_model::{Snapshot, Summary, TargetRow};
use pingwatch_probe::{parse_target_list, SystemPingExecutor};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pingwatch", version, about = "Concurrent ping monitor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Once(OnceArgs),
    Watch(WatchArgs),
}

#[derive(Args)]
struct MonitorArgs {
    /// Newline separated host list; `#` starts a comment.
    #[arg(long)]
    targets: Option<PathBuf>,

    #[arg(long = "target")]
    target_list: Vec<String>,

    /// JSON monitor configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    interval_secs: Option<u64>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    history: Option<usize>,

    #[arg(long)]
    alpha: Option<f64>,

    #[arg(long)]
    show_history: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
#[command(about = "Probe every target once and print the result.")]
struct OnceArgs {
    #[command(flatten)]
    monitor: MonitorArgs,
}

#[derive(Args)]
#[command(about = "Probe on a fixed interval until Ctrl-C. Only target hosts you may monitor.")]
struct WatchArgs {
    #[command(flatten)]
    monitor: MonitorArgs,

    /// Stop after this many completed rounds.
    #[arg(long)]
    rounds: Option<u64>,

    /// Append each round instead of redrawing the screen.
    #[arg(long)]
    plain: bool,
}

#[derive(Serialize)]
struct RoundOutput {
    round: u64,
    taken_at: DateTime<Utc>,
    summary: Summary,
    targets: Vec<TargetRow>,
}

impl RoundOutput {
    fn new(snapshot: &Snapshot, show_history: bool) -> Self {
        Self {
            round: snapshot.round(),
            taken_at: snapshot.taken_at(),
            summary: snapshot.summary(),
            targets: snapshot.rows(show_history),
        }
    }
}

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Once(args) => run_once(args),
        Commands::Watch(args) => run_watch(args),
    }
}

fn run_once(args: OnceArgs) -> Result<()> {
    let config = load_config(&args.monitor)?;
    let mut monitor = Monitor::new(config, SystemPingExecutor::default())?;

    let report = monitor.run_round();
    for (target, err) in &report.errors {
        eprintln!("probe failed for {target}: {err}");
    }
    print_snapshot(&report.snapshot, &args.monitor, true)
}

fn run_watch(args: WatchArgs) -> Result<()> {
    let config = load_config(&args.monitor)?;
    let monitor = Monitor::new(config, SystemPingExecutor::default())?;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .map_err(|err| anyhow!("failed to install Ctrl-C handler: {err}"))?;

    let mut scheduler = ProbeScheduler::new(monitor);
    let events = scheduler.subscribe();
    let mut handle = scheduler.start()?;

    let redraw = !args.plain && !args.monitor.json;
    let mut completed = 0u64;
    let mut result = Ok(());
    while !stop.load(Ordering::SeqCst) {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(MonitorEvent::RoundCompleted(snapshot)) => {
                if redraw {
                    if let Err(err) = execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0)) {
                        result = Err(anyhow!("failed to clear terminal: {err}"));
                        break;
                    }
                }
                if let Err(err) = print_snapshot(&snapshot, &args.monitor, false) {
                    result = Err(err);
                    break;
                }
                completed += 1;
                if args.rounds.is_some_and(|limit| completed >= limit) {
                    break;
                }
            }
            Ok(MonitorEvent::ExecutionError { target, message }) => {
                eprintln!("probe failed for {target}: {message}");
            }
            Ok(MonitorEvent::TickSkipped { .. }) | Ok(MonitorEvent::Reset) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                result = Err(anyhow!("scheduler exited unexpectedly"));
                break;
            }
        }
    }

    handle.stop();
    result
}

fn load_config(args: &MonitorArgs) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::from_json_file(path)?,
        None => MonitorConfig::default(),
    };

    if let Some(path) = &args.targets {
        let contents = fs::read_to_string(path)
            .map_err(|err| anyhow!("failed to read targets file {:?}: {}", path, err))?;
        config.targets.extend(parse_target_list(&contents));
    }
    config.targets.extend(args.target_list.iter().cloned());

    if config.targets.is_empty() {
        return Err(anyhow!(
            "no targets provided (use --targets, --target or a config file)"
        ));
    }

    if let Some(secs) = args.interval_secs {
        config = config.with_interval(Duration::from_secs(secs));
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_probe_timeout(Duration::from_millis(ms));
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_max_concurrency(concurrency);
    }
    if let Some(history) = args.history {
        config = config.with_history_window(history);
    }
    if let Some(alpha) = args.alpha {
        config = config.with_smoothing_alpha(alpha);
    }

    config.validate()?;
    tracing::debug!(targets = config.targets.len(), "configuration loaded");
    Ok(config)
}

fn print_snapshot(snapshot: &Snapshot, args: &MonitorArgs, one_shot: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if args.json {
        let output = RoundOutput::new(snapshot, args.show_history);
        let json = if one_shot {
            serde_json::to_string_pretty(&output)?
        } else {
            serde_json::to_string(&output)?
        };
        writeln!(stdout, "{json}")?;
    } else {
        write!(stdout, "{}", table::render(snapshot, args.show_history))?;
        if !one_shot {
            writeln!(stdout)?;
        }
    }
    stdout.flush()?;
    Ok(())
}
