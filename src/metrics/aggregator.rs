use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::percentiles::PercentileSet;
use super::recorder::{EndpointSummary, RequestRecorder};
use super::system::{ResourceSummary, SystemResourceMonitor};
use super::RequestEvent;
use crate::config::MetricsConfig;
use crate::dashboard::{Dashboard, Frame};

// ─── Public types ────────────────────────────────────────────────

/// Central metrics engine for one load-test run.
/// Virtual users call `on_request()`, the harness owns `start()`/`stop()`.
pub struct MetricsAggregator {
    recorder: RequestRecorder,
    monitor: SystemResourceMonitor,
    dashboard: Dashboard,
    /// Render a live frame every N requests (0 = never)
    render_every: u64,
    lifecycle: Mutex<Lifecycle>,
}

/// Point-in-time copy of every aggregate, safe to format without locks.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Local>,
    /// `None` until the aggregator has been started.
    pub duration_secs: Option<f64>,
    pub overall: EndpointSummary,
    pub endpoints: BTreeMap<String, EndpointSummary>,
    pub run_latency: PercentileSet,
    pub resources: ResourceSummary,
}

#[derive(Debug, Clone, Copy)]
enum Lifecycle {
    Idle,
    Running { started: Instant },
    Stopped { started: Instant, stopped: Instant },
}

impl Lifecycle {
    fn duration(&self) -> Option<Duration> {
        match *self {
            Lifecycle::Idle => None,
            Lifecycle::Running { started } => Some(started.elapsed()),
            Lifecycle::Stopped { started, stopped } => {
                Some(stopped.saturating_duration_since(started))
            }
        }
    }
}

// ─── MetricsAggregator impl ──────────────────────────────────────

impl MetricsAggregator {
    pub fn new(
        recorder: RequestRecorder,
        monitor: SystemResourceMonitor,
        dashboard: Dashboard,
        render_every: u64,
    ) -> Self {
        Self {
            recorder,
            monitor,
            dashboard,
            render_every,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Aggregator sampling the real host, configured from `[metrics]`.
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(
            RequestRecorder::new(config.history),
            SystemResourceMonitor::with_sysinfo(
                Duration::from_millis(config.sample_interval_ms),
                config.window,
            ),
            Dashboard::new(config.output),
            config.render_every,
        )
    }

    /// Begin the run: stamp the start time and launch resource sampling.
    /// The monitor is spawned under the lifecycle lock, so a concurrent
    /// `stop()` always finds the task it has to stop.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Idle => {
                *lifecycle = Lifecycle::Running {
                    started: Instant::now(),
                };
                self.monitor.start();
            }
            Lifecycle::Running { .. } => {
                debug!("metrics collection already started");
                return;
            }
            Lifecycle::Stopped { .. } => {
                info!("metrics collection already finished; ignoring start");
                return;
            }
        }
        drop(lifecycle);
        info!("test metrics collection started");
    }

    /// Finish the run: stop sampling and render the final report.
    /// Stopping before `start()` or a second time does nothing.
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Idle => {
                    info!("metrics stop requested before start; nothing to do");
                    return;
                }
                Lifecycle::Stopped { .. } => {
                    debug!("metrics collection already stopped");
                    return;
                }
                Lifecycle::Running { started } => {
                    *lifecycle = Lifecycle::Stopped {
                        started,
                        stopped: Instant::now(),
                    }
                }
            }
        }

        self.monitor.stop().await;
        let snapshot = self.snapshot();
        self.dashboard.present(&snapshot, Frame::Final);
        info!(
            total = snapshot.overall.total,
            failed = snapshot.overall.failed,
            duration_secs = snapshot.duration_secs.unwrap_or(0.0),
            "test metrics collection stopped"
        );
    }

    /// Request-completion hook: record, update TPS, maybe redraw.
    pub fn on_request(&self, event: RequestEvent) {
        let failed = event.failed();
        let total = self.recorder.track_request_with_status(
            &event.name,
            event.response_time_ms,
            failed,
            event.status,
        );

        if let Some(error) = &event.error {
            warn!(
                request_type = event.request_type,
                endpoint = %event.name,
                status = ?event.status,
                error = %error,
                "request failed"
            );
        }

        self.monitor.update_tps(total);

        if self.render_every > 0 && total % self.render_every == 0 {
            self.dashboard.present(&self.snapshot(), Frame::Live);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let duration = self.lifecycle.lock().duration();
        let requests = self.recorder.snapshot();
        Snapshot {
            taken_at: Local::now(),
            duration_secs: duration.map(|d| d.as_secs_f64()),
            overall: requests.overall,
            endpoints: requests.endpoints,
            run_latency: requests.run_latency,
            resources: self.monitor.summary(),
        }
    }

    pub fn recorder(&self) -> &RequestRecorder {
        &self.recorder
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::metrics::system::{RawCounters, ResourceProbe};

    struct IdleProbe;

    impl ResourceProbe for IdleProbe {
        fn read(&mut self) -> Result<RawCounters, MonitorError> {
            Ok(RawCounters {
                cpu_per_core: vec![1.0, 2.0, 3.0, 4.0],
                ..RawCounters::default()
            })
        }
    }

    fn quiet_aggregator() -> MetricsAggregator {
        MetricsAggregator::new(
            RequestRecorder::default(),
            SystemResourceMonitor::new(Box::new(IdleProbe), Duration::from_millis(10), 60),
            Dashboard::quiet(),
            5,
        )
    }

    fn event(name: &str, ms: f64, error: Option<&str>) -> RequestEvent {
        RequestEvent {
            request_type: "POST",
            name: name.into(),
            response_time_ms: ms,
            status: Some(if error.is_some() { 500 } else { 200 }),
            error: error.map(String::from),
        }
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let agg = quiet_aggregator();
        agg.stop().await;
        agg.stop().await;
        let snap = agg.snapshot();
        assert!(snap.duration_secs.is_none());
        assert!(!agg.is_running());
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let agg = quiet_aggregator();
        agg.start();
        agg.start();
        assert!(agg.is_running());

        for i in 0..12 {
            let err = (i % 4 == 0).then_some("boom");
            agg.on_request(event("login", 10.0 * (i + 1) as f64, err));
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        agg.stop().await;
        assert!(!agg.is_running());
        let first = agg.snapshot();
        assert_eq!(first.overall.total, 12);
        assert_eq!(first.overall.failed, 3);
        assert_eq!(first.endpoints["login"].status_counts[&500], 3);
        assert!(first.duration_secs.is_some());
        assert_eq!(first.resources.cpu_per_core.len(), 4);

        // duration is frozen once stopped; a second stop changes nothing
        agg.stop().await;
        assert_eq!(agg.snapshot().duration_secs, first.duration_secs);

        // restart after stop is refused
        agg.start();
        assert!(!agg.is_running());
    }

    #[tokio::test]
    async fn monitor_follows_lifecycle() {
        let agg = quiet_aggregator();
        assert!(!agg.monitor.is_running());

        agg.start();
        assert!(agg.is_running());
        assert!(agg.monitor.is_running());

        agg.stop().await;
        assert!(!agg.monitor.is_running());

        // a refused restart must not leave a sampler behind
        agg.start();
        assert!(!agg.monitor.is_running());
    }

    #[test]
    fn requests_are_tracked_without_start() {
        let agg = quiet_aggregator();
        agg.on_request(event("register", 3.0, None));
        let snap = agg.snapshot();
        assert_eq!(snap.overall.total, 1);
        assert_eq!(snap.overall.success_rate, 100.0);
        assert!(snap.duration_secs.is_none());
    }
}
