//! Plain-text rendering of a snapshot.

use chrono::{DateTime, Utc};
use pingwatch_model::{Measurement, Snapshot, TargetRow};
use std::fmt::Write;

const HEADERS: [&str; 8] = [
    "HOST", "STATUS", "LAST ms", "AVG ms", "SENT", "RECV", "LOSS %", "CHECKED",
];

pub fn render(snapshot: &Snapshot, show_history: bool) -> String {
    let summary = snapshot.summary();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "round {} at {}  UP {}  DOWN {}",
        snapshot.round(),
        snapshot.taken_at().format("%Y-%m-%d %H:%M:%S UTC"),
        summary.up,
        summary.down
    );
    out.push('\n');

    let rows: Vec<Vec<String>> = snapshot
        .rows(show_history)
        .iter()
        .map(cells)
        .collect();

    let mut headers: Vec<&str> = HEADERS.to_vec();
    if show_history {
        headers.push("HISTORY");
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    push_line(&mut out, headers.iter().copied(), &widths);
    for row in &rows {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn cells(row: &TargetRow) -> Vec<String> {
    let mut cells = vec![
        row.host.clone(),
        row.status.to_string(),
        format_ms(row.last_rtt_ms),
        format_ms(row.smoothed_rtt_ms),
        row.sent.to_string(),
        row.received.to_string(),
        row.loss_percent
            .map(|loss| format!("{loss:.1}"))
            .unwrap_or_else(|| "-".to_string()),
        format_checked(row.last_checked_at),
    ];
    if let Some(history) = &row.history {
        cells.push(format_history(history));
    }
    cells
}

// Host and history are left-aligned, numbers right-aligned.
fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let mut line = String::new();
    for (col, (cell, width)) in cells.zip(widths).enumerate() {
        if col > 0 {
            line.push_str("  ");
        }
        if col == 0 || col == 1 || col == 8 {
            let _ = write!(line, "{cell:<width$}");
        } else {
            let _ = write!(line, "{cell:>width$}");
        }
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

fn format_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("{ms:.1}"),
        None => "-".to_string(),
    }
}

fn format_checked(value: Option<DateTime<Utc>>) -> String {
    match value {
        Some(at) => at.format("%H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

/// Oldest first; a lost probe shows as `x`, alive without a latency as `?`.
fn format_history(history: &[Measurement]) -> String {
    history
        .iter()
        .map(|m| match (m.alive, m.rtt_ms) {
            (true, Some(ms)) => format!("{ms:.0}"),
            (true, None) => "?".to_string(),
            (false, _) => "x".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
