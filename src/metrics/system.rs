//! Host resource sampling.
//!
//! A background task reads cumulative host counters once per interval through
//! a [`ResourceProbe`], turns the cumulative ones into per-second rates and
//! keeps the last minute of each series in a [`RollingWindow`]. Sampling is
//! best-effort: a failed read is logged and that tick is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Networks, System};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::window::{RollingWindow, DEFAULT_WINDOW};
use crate::error::MonitorError;

// ─── Configuration ───────────────────────────────────────────────

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// How long `stop()` waits for the sampling task before giving up on it.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// TPS samples are only taken over intervals at least this long.
const TPS_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// "Current" TPS is the mean of this many newest samples.
const TPS_CURRENT_SAMPLES: usize = 5;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

// ─── Probe seam ──────────────────────────────────────────────────

/// One reading of host counters. Network and disk values are cumulative
/// byte totals; everything else is an instantaneous level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCounters {
    pub cpu_total: f64,
    pub cpu_per_core: Vec<f64>,
    pub memory_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_available_bytes: u64,
    pub swap_percent: f64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
}

/// Source of host counters. Reads may be slow and may fail.
pub trait ResourceProbe: Send + 'static {
    fn read(&mut self) -> Result<RawCounters, MonitorError>;
}

/// Production probe backed by `sysinfo`.
pub struct SysinfoProbe {
    system: System,
    networks: Networks,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the CPU counters so the first real read has a baseline.
        system.refresh_cpu();
        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn read(&mut self) -> Result<RawCounters, MonitorError> {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.system.refresh_processes();
        self.networks.refresh();

        let total_memory = self.system.total_memory();
        if total_memory == 0 {
            return Err(MonitorError::Probe("host reported zero total memory".into()));
        }
        let used_memory = self.system.used_memory();
        let total_swap = self.system.total_swap();

        let (net_rx_bytes, net_tx_bytes) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (
                    rx.saturating_add(data.total_received()),
                    tx.saturating_add(data.total_transmitted()),
                )
            });

        // sysinfo has no host-wide disk counter; sum per-process totals.
        let (disk_read_bytes, disk_write_bytes) = self
            .system
            .processes()
            .values()
            .map(|p| p.disk_usage())
            .fold((0u64, 0u64), |(r, w), usage| {
                (
                    r.saturating_add(usage.total_read_bytes),
                    w.saturating_add(usage.total_written_bytes),
                )
            });

        Ok(RawCounters {
            cpu_total: self.system.global_cpu_info().cpu_usage() as f64,
            cpu_per_core: self
                .system
                .cpus()
                .iter()
                .map(|cpu| cpu.cpu_usage() as f64)
                .collect(),
            memory_percent: used_memory as f64 / total_memory as f64 * 100.0,
            memory_used_bytes: used_memory,
            memory_available_bytes: self.system.available_memory(),
            swap_percent: if total_swap == 0 {
                0.0
            } else {
                self.system.used_swap() as f64 / total_swap as f64 * 100.0
            },
            net_rx_bytes,
            net_tx_bytes,
            disk_read_bytes,
            disk_write_bytes,
        })
    }
}

// ─── Aggregates ──────────────────────────────────────────────────

/// Averages over the retained window, copied out for reporting.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ResourceSummary {
    pub cpu_total_avg: f64,
    pub cpu_total_max: f64,
    pub cpu_per_core: Vec<f64>,
    pub memory_percent_avg: f64,
    pub memory_used_gb_avg: f64,
    pub memory_available_gb_avg: f64,
    pub swap_percent_avg: f64,
    /// Bytes per second.
    pub network_in_avg: f64,
    pub network_out_avg: f64,
    pub disk_read_avg: f64,
    pub disk_write_avg: f64,
    pub tps_current: f64,
    pub tps_avg: f64,
    pub samples_taken: u64,
    pub samples_failed: u64,
}

// ─── Internal state ──────────────────────────────────────────────

struct Series {
    cpu_total: RollingWindow,
    cpu_per_core: Vec<RollingWindow>,
    memory_percent: RollingWindow,
    memory_used: RollingWindow,
    memory_available: RollingWindow,
    swap_percent: RollingWindow,
    network_in: RollingWindow,
    network_out: RollingWindow,
    disk_read: RollingWindow,
    disk_write: RollingWindow,
    tps: RollingWindow,
}

struct MonitorState {
    window: usize,
    series: Series,
    previous: Option<(RawCounters, Instant)>,
    last_request_count: u64,
    last_request_time: Instant,
    samples_taken: u64,
    samples_failed: u64,
}

impl MonitorState {
    fn new(window: usize) -> Self {
        let w = || RollingWindow::new(window);
        Self {
            window,
            series: Series {
                cpu_total: w(),
                cpu_per_core: Vec::new(),
                memory_percent: w(),
                memory_used: w(),
                memory_available: w(),
                swap_percent: w(),
                network_in: w(),
                network_out: w(),
                disk_read: w(),
                disk_write: w(),
                tps: w(),
            },
            previous: None,
            last_request_count: 0,
            last_request_time: Instant::now(),
            samples_taken: 0,
            samples_failed: 0,
        }
    }

    /// Fold one probe reading into the series. Rate metrics need a previous
    /// reading, so the first call only records absolute levels.
    fn ingest(&mut self, raw: RawCounters, at: Instant) {
        let s = &mut self.series;
        s.cpu_total.append(raw.cpu_total);
        if s.cpu_per_core.len() < raw.cpu_per_core.len() {
            let window = self.window;
            s.cpu_per_core
                .resize_with(raw.cpu_per_core.len(), || RollingWindow::new(window));
        }
        for (core, pct) in s.cpu_per_core.iter_mut().zip(&raw.cpu_per_core) {
            core.append(*pct);
        }
        s.memory_percent.append(raw.memory_percent);
        s.memory_used.append(raw.memory_used_bytes as f64 / BYTES_PER_GB);
        s.memory_available
            .append(raw.memory_available_bytes as f64 / BYTES_PER_GB);
        s.swap_percent.append(raw.swap_percent);

        if let Some((prev, prev_at)) = &self.previous {
            let secs = at.saturating_duration_since(*prev_at).as_secs_f64();
            if secs > 0.0 {
                let rate = |now: u64, before: u64| now.saturating_sub(before) as f64 / secs;
                s.network_in.append(rate(raw.net_rx_bytes, prev.net_rx_bytes));
                s.network_out.append(rate(raw.net_tx_bytes, prev.net_tx_bytes));
                s.disk_read.append(rate(raw.disk_read_bytes, prev.disk_read_bytes));
                s.disk_write
                    .append(rate(raw.disk_write_bytes, prev.disk_write_bytes));
            }
        }

        self.samples_taken += 1;
        self.previous = Some((raw, at));
    }

    fn update_tps(&mut self, current_requests: u64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_request_time);
        if elapsed < TPS_MIN_INTERVAL {
            return;
        }
        let delta = current_requests.saturating_sub(self.last_request_count);
        self.series.tps.append(delta as f64 / elapsed.as_secs_f64());
        self.last_request_count = current_requests;
        self.last_request_time = now;
    }

    fn summary(&self) -> ResourceSummary {
        let s = &self.series;
        ResourceSummary {
            cpu_total_avg: s.cpu_total.mean(),
            cpu_total_max: s.cpu_total.max(),
            cpu_per_core: s.cpu_per_core.iter().map(RollingWindow::mean).collect(),
            memory_percent_avg: s.memory_percent.mean(),
            memory_used_gb_avg: s.memory_used.mean(),
            memory_available_gb_avg: s.memory_available.mean(),
            swap_percent_avg: s.swap_percent.mean(),
            network_in_avg: s.network_in.mean(),
            network_out_avg: s.network_out.mean(),
            disk_read_avg: s.disk_read.mean(),
            disk_write_avg: s.disk_write.mean(),
            tps_current: s.tps.recent(TPS_CURRENT_SAMPLES),
            tps_avg: s.tps.mean(),
            samples_taken: self.samples_taken,
            samples_failed: self.samples_failed,
        }
    }
}

// ─── SystemResourceMonitor ───────────────────────────────────────

/// Background sampler of host resources plus the TPS series.
pub struct SystemResourceMonitor {
    interval: Duration,
    stop_grace: Duration,
    state: Arc<Mutex<MonitorState>>,
    probe: Arc<Mutex<Box<dyn ResourceProbe>>>,
    stop_requested: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SystemResourceMonitor {
    pub fn new(probe: Box<dyn ResourceProbe>, interval: Duration, window: usize) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(10)),
            stop_grace: DEFAULT_STOP_GRACE,
            state: Arc::new(Mutex::new(MonitorState::new(window))),
            probe: Arc::new(Mutex::new(probe)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Monitor backed by the host's real counters.
    pub fn with_sysinfo(interval: Duration, window: usize) -> Self {
        Self::new(Box::new(SysinfoProbe::new()), interval, window)
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Spawn the sampling task. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            debug!("resource monitor already running");
            return;
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let state = self.state.clone();
        let probe = self.probe.clone();
        let stop = self.stop_requested.clone();
        let interval = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticks = IntervalStream::new(tokio::time::interval(interval));
            while ticks.next().await.is_some() {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = sample_once(&probe, &state).await {
                    warn!(error = %e, "skipping resource sample");
                }
            }
        }));
        info!(interval_ms = interval.as_millis() as u64, "system metrics collection started");
    }

    /// Request shutdown and wait (bounded) for the sampling task to exit.
    pub async fn stop(&self) {
        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            debug!("resource monitor not running; nothing to stop");
            return;
        };
        self.stop_requested.store(true, Ordering::SeqCst);

        match tokio::time::timeout(self.stop_grace, handle).await {
            Ok(Ok(())) => info!("system metrics collection stopped"),
            Ok(Err(e)) => warn!(error = %e, "resource sampling task ended abnormally"),
            Err(_) => warn!(
                grace_ms = self.stop_grace.as_millis() as u64,
                "resource sampling task did not stop in time; continuing without it"
            ),
        }
    }

    /// Derive a TPS sample from the running request total. Calls closer
    /// than one second apart are ignored.
    pub fn update_tps(&self, current_total_requests: u64) {
        self.state.lock().update_tps(current_total_requests, Instant::now());
    }

    pub fn summary(&self) -> ResourceSummary {
        self.state.lock().summary()
    }
}

/// Read the probe off the async threads, then fold the result in.
async fn sample_once(
    probe: &Arc<Mutex<Box<dyn ResourceProbe>>>,
    state: &Arc<Mutex<MonitorState>>,
) -> Result<(), MonitorError> {
    let probe = probe.clone();
    let read = tokio::task::spawn_blocking(move || {
        let mut probe = probe.lock();
        probe.read()
    })
    .await
    .map_err(|e| MonitorError::Task(e.to_string()));

    match read.and_then(|r| r) {
        Ok(raw) => {
            state.lock().ingest(raw, Instant::now());
            Ok(())
        }
        Err(e) => {
            state.lock().samples_failed += 1;
            Err(e)
        }
    }
}
