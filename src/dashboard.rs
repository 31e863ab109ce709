//! Text rendering of metrics snapshots.
//!
//! `render_table` and `render_record` are pure; `Dashboard::present` decides
//! where and how a snapshot is written and never fails the run.

use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::metrics::Snapshot;

/// Used when the terminal width cannot be determined.
pub const DEFAULT_WIDTH: usize = 100;

const SPACING: &str = "   ";
const MB: f64 = 1024.0 * 1024.0;

/// Where dashboard frames go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Tables on a terminal, JSON lines otherwise.
    #[default]
    Auto,
    Table,
    Json,
    /// Render nothing (tests, or runs that only want logs).
    None,
}

/// Live frames are redrawn in place; the final frame stays on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Live,
    Final,
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    mode: OutputMode,
}

impl Dashboard {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn quiet() -> Self {
        Self::new(OutputMode::None)
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Write one frame to stdout. Errors are logged, never returned.
    pub fn present(&self, snapshot: &Snapshot, frame: Frame) {
        let is_tty = std::io::stdout().is_terminal();
        let as_json = match self.mode {
            OutputMode::None => return,
            OutputMode::Json => true,
            OutputMode::Table => false,
            OutputMode::Auto => !is_tty,
        };

        let text = if as_json {
            match render_record(snapshot) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "cannot encode snapshot as JSON; using table");
                    render_table(snapshot, terminal_width(), frame)
                }
            }
        } else {
            let mut text = render_table(snapshot, terminal_width(), frame);
            if frame == Frame::Live && is_tty {
                // Clear screen and move the cursor home before redrawing
                text.insert_str(0, "\x1b[2J\x1b[H");
            }
            text
        };

        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{text}").and_then(|_| out.flush()) {
            warn!(error = %e, "cannot write dashboard frame");
        }
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new(OutputMode::Auto)
    }
}

fn terminal_width() -> usize {
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        Ok(_) => DEFAULT_WIDTH,
        Err(e) => {
            debug!(error = %e, fallback = DEFAULT_WIDTH, "terminal width unavailable");
            DEFAULT_WIDTH
        }
    }
}

/// One-line JSON form of a snapshot.
pub fn render_record(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(snapshot)
}

/// Full dashboard as text: performance, system resources and per-core
/// tables side by side, then per-endpoint and status-code tables.
pub fn render_table(snapshot: &Snapshot, width: usize, frame: Frame) -> String {
    let width = if width == 0 { DEFAULT_WIDTH } else { width };
    let title = match frame {
        Frame::Live => "Load Test Metrics Dashboard",
        Frame::Final => "Load Test Final Report",
    };

    let mut out = String::new();
    let rule = "=".repeat(width);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{title:^width$}");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);

    let mut panels = vec![
        ("Performance Metrics", grid(&["Metric", "Value"], &performance_rows(snapshot))),
        ("System Resources", grid(&["Resource", "Usage"], &resource_rows(snapshot))),
    ];
    let cores = core_rows(snapshot);
    if !cores.is_empty() {
        panels.push(("CPU Core Usage", grid(&["Core", "Usage"], &cores)));
    }
    out.push_str(&side_by_side(&panels));

    let endpoints = endpoint_rows(snapshot);
    if !endpoints.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Endpoints");
        out.push_str(&grid(
            &["Endpoint", "Requests", "Failed", "Success", "Avg", "Median", "p95"],
            &endpoints,
        ));
    }

    let statuses = status_rows(snapshot);
    if !statuses.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Status Codes");
        out.push_str(&grid(&["Endpoint", "Status", "Requests", "Share"], &statuses));
    }

    let _ = writeln!(out);
    if let Some(secs) = snapshot.duration_secs {
        let _ = writeln!(out, "Test Duration: {secs:.0} seconds");
    }
    let _ = writeln!(
        out,
        "Last Updated: {}",
        snapshot.taken_at.format("%Y-%m-%d %H:%M:%S")
    );
    out
}

// ─── Rows ────────────────────────────────────────────────────────

type Rows = Vec<Vec<String>>;

fn row<const N: usize>(cells: [String; N]) -> Vec<String> {
    cells.into_iter().collect()
}

fn performance_rows(s: &Snapshot) -> Rows {
    let o = &s.overall;
    let r = &s.resources;
    let mut rows = vec![
        row(["Total Requests".into(), thousands(o.total)]),
        row(["Failed Requests".into(), thousands(o.failed)]),
        row(["Success Rate".into(), format!("{:.1}%", o.success_rate)]),
        row(["Current TPS".into(), format!("{:.1}", r.tps_current)]),
        row(["Average TPS".into(), format!("{:.1}", r.tps_avg)]),
    ];

    if o.latency.samples > 0 {
        rows.push(row(["Avg Response Time".into(), format!("{:.1}ms", o.latency.mean)]));
        rows.push(row([
            "Median Response Time".into(),
            format!("{:.1}ms", o.latency.median),
        ]));
        if let Some(p95) = o.latency.p95 {
            rows.push(row(["95th Percentile".into(), format!("{p95:.1}ms")]));
        }
    }
    if s.run_latency.has_data() {
        rows.push(row([
            "99th Percentile (run)".into(),
            format!("{:.1}ms", s.run_latency.p99),
        ]));
    }
    rows
}

fn resource_rows(s: &Snapshot) -> Rows {
    let r = &s.resources;
    vec![
        row(["CPU (Total)".into(), format!("{:.1}%", r.cpu_total_avg)]),
        row(["CPU (Peak)".into(), format!("{:.1}%", r.cpu_total_max)]),
        row(["Memory".into(), format!("{:.1}%", r.memory_percent_avg)]),
        row(["Memory Used".into(), format!("{:.1} GB", r.memory_used_gb_avg)]),
        row([
            "Memory Available".into(),
            format!("{:.1} GB", r.memory_available_gb_avg),
        ]),
        row(["Swap".into(), format!("{:.1}%", r.swap_percent_avg)]),
        row(["Network In".into(), format!("{:.2} MB/s", r.network_in_avg / MB)]),
        row(["Network Out".into(), format!("{:.2} MB/s", r.network_out_avg / MB)]),
        row(["Disk Read".into(), format!("{:.2} MB/s", r.disk_read_avg / MB)]),
        row(["Disk Write".into(), format!("{:.2} MB/s", r.disk_write_avg / MB)]),
    ]
}

fn core_rows(s: &Snapshot) -> Rows {
    s.resources
        .cpu_per_core
        .iter()
        .enumerate()
        .map(|(core, usage)| row([format!("Core {core}"), format!("{usage:.1}%")]))
        .collect()
}

fn endpoint_rows(s: &Snapshot) -> Rows {
    s.endpoints
        .iter()
        .map(|(name, e)| {
            let ms = |v: f64| {
                if e.latency.samples > 0 {
                    format!("{v:.1}ms")
                } else {
                    "-".into()
                }
            };
            row([
                name.clone(),
                thousands(e.total),
                thousands(e.failed),
                format!("{:.1}%", e.success_rate),
                ms(e.latency.mean),
                ms(e.latency.median),
                e.latency.p95.map_or_else(|| "-".into(), |p| format!("{p:.1}ms")),
            ])
        })
        .collect()
}

fn status_rows(s: &Snapshot) -> Rows {
    s.endpoints
        .iter()
        .flat_map(|(name, e)| {
            let total = e.total.max(1) as f64;
            e.status_counts.iter().map(move |(code, count)| {
                row([
                    name.clone(),
                    code.to_string(),
                    thousands(*count),
                    format!("{:.1}%", *count as f64 * 100.0 / total),
                ])
            })
        })
        .collect()
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ─── Grid layout ─────────────────────────────────────────────────

/// `+---+` bordered table with a header row.
fn grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for r in rows {
        for (i, cell) in r.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let border = |fill: char| {
        let mut line = String::from("+");
        for w in &widths {
            line.extend(std::iter::repeat(fill).take(w + 2));
            line.push('+');
        }
        line
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", border('-'));
    let _ = writeln!(out, "{}", grid_line(headers.iter().copied(), &widths));
    let _ = writeln!(out, "{}", border('='));
    for r in rows {
        let _ = writeln!(out, "{}", grid_line(r.iter().map(String::as_str), &widths));
        let _ = writeln!(out, "{}", border('-'));
    }
    out
}

fn grid_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (cell, &w) in cells.zip(widths) {
        let _ = write!(line, " {cell:<w$} |");
    }
    line
}

/// Lay titled tables out next to each other, padding shorter ones.
fn side_by_side(panels: &[(&str, String)]) -> String {
    let columns: Vec<Vec<&str>> = panels.iter().map(|(_, t)| t.lines().collect()).collect();
    let widths: Vec<usize> = panels
        .iter()
        .zip(&columns)
        .map(|((title, _), lines)| {
            lines
                .iter()
                .map(|l| l.chars().count())
                .max()
                .unwrap_or(0)
                .max(title.chars().count())
        })
        .collect();
    let height = columns.iter().map(Vec::len).max().unwrap_or(0);

    let mut out = String::new();
    let titles: Vec<String> = panels
        .iter()
        .zip(&widths)
        .map(|((title, _), &w)| format!("{title:<w$}"))
        .collect();
    let _ = writeln!(out, "{}", titles.join(SPACING).trim_end());

    for i in 0..height {
        let cells: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(lines, &w)| format!("{:<w$}", lines.get(i).copied().unwrap_or("")))
            .collect();
        let _ = writeln!(out, "{}", cells.join(SPACING).trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::recorder::RequestRecorder;
    use crate::metrics::system::ResourceSummary;
    use chrono::Local;

    fn snapshot_from(rec: &RequestRecorder, resources: ResourceSummary) -> Snapshot {
        let r = rec.snapshot();
        Snapshot {
            taken_at: Local::now(),
            duration_secs: Some(12.0),
            overall: r.overall,
            endpoints: r.endpoints,
            run_latency: r.run_latency,
            resources,
        }
    }

    #[test]
    fn empty_snapshot_omits_latency_and_cores() {
        let snap = snapshot_from(&RequestRecorder::default(), ResourceSummary::default());
        let text = render_table(&snap, 80, Frame::Live);
        assert!(text.contains("Total Requests"));
        assert!(text.contains("Success Rate"));
        assert!(!text.contains("Avg Response Time"));
        assert!(!text.contains("95th Percentile"));
        assert!(!text.contains("CPU Core Usage"));
        assert!(!text.contains("Endpoints"));
        assert!(text.contains("Test Duration: 12 seconds"));
    }

    #[test]
    fn populated_snapshot_shows_every_section() {
        let rec = RequestRecorder::default();
        for i in 0..25 {
            rec.track_request_with_status("get_profile", 10.0 + i as f64, i % 5 == 0, Some(200));
        }
        let resources = ResourceSummary {
            cpu_per_core: vec![12.5, 80.0],
            network_in_avg: 2.0 * MB,
            ..ResourceSummary::default()
        };
        let text = render_table(&snapshot_from(&rec, resources), 120, Frame::Final);

        assert!(text.contains("Load Test Final Report"));
        assert!(text.contains("Avg Response Time"));
        assert!(text.contains("95th Percentile"));
        assert!(text.contains("Core 1"));
        assert!(text.contains("80.0%"));
        assert!(text.contains("2.00 MB/s"));
        assert!(text.contains("get_profile"));
        assert!(text.contains("Status Codes"));
    }

    #[test]
    fn zero_width_falls_back_to_default() {
        let snap = snapshot_from(&RequestRecorder::default(), ResourceSummary::default());
        let text = render_table(&snap, 0, Frame::Live);
        assert_eq!(text.lines().next().unwrap().len(), DEFAULT_WIDTH);
    }

    #[test]
    fn record_is_single_line_json() {
        let rec = RequestRecorder::default();
        rec.track_request("login", 5.0, false);
        let line = render_record(&snapshot_from(&rec, ResourceSummary::default())).unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["overall"]["total"], 1);
        assert_eq!(value["endpoints"]["login"]["failed"], 0);
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn grid_pads_columns() {
        let text = grid(&["A", "B"], &[row(["long cell".into(), "x".into()])]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "+-----------+---+");
        assert_eq!(lines[1], "| A         | B |");
        assert_eq!(lines[3], "| long cell | x |");
    }
}
