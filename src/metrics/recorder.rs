use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Local};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::{new_histogram, LatencySummary, PercentileSet};

// ─── Configuration ───────────────────────────────────────────────

/// How many response times each endpoint keeps for mean/median/p95
pub const DEFAULT_HISTORY: usize = 1000;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe per-endpoint request statistics.
/// Virtual users call `track_request()`, the dashboard calls `snapshot()`.
pub struct RequestRecorder {
    history: usize,
    inner: Mutex<Inner>,
}

/// Derived, read-only view of one endpoint (or of the whole run).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EndpointSummary {
    pub total: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub latency: LatencySummary,
    pub status_counts: BTreeMap<u16, u64>,
    pub first_seen: Option<DateTime<Local>>,
}

/// Everything the recorder knows, copied out in one lock acquisition.
#[derive(Debug, Clone, Serialize)]
pub struct RecorderSnapshot {
    pub overall: EndpointSummary,
    pub endpoints: BTreeMap<String, EndpointSummary>,
    pub run_latency: PercentileSet,
}

// ─── Internal state ──────────────────────────────────────────────

#[derive(Debug, Clone)]
struct EndpointStats {
    total_requests: u64,
    failed_requests: u64,
    response_times: VecDeque<f64>,
    status_counts: BTreeMap<u16, u64>,
    start_time: Option<DateTime<Local>>,
}

struct Inner {
    endpoints: HashMap<String, EndpointStats>,
    overall: EndpointStats,
    run_hist: Histogram<u64>,
}

// ─── RequestRecorder impl ────────────────────────────────────────

impl RequestRecorder {
    pub fn new(history: usize) -> Self {
        let history = history.max(1);
        Self {
            history,
            inner: Mutex::new(Inner {
                endpoints: HashMap::new(),
                overall: EndpointStats::new(history),
                run_hist: new_histogram(),
            }),
        }
    }

    pub fn track_request(&self, endpoint: &str, response_time_ms: f64, failed: bool) {
        self.track_request_with_status(endpoint, response_time_ms, failed, None);
    }

    /// Record one completed request, optionally with the HTTP status it got.
    /// Returns the run-wide request count including this one.
    pub fn track_request_with_status(
        &self,
        endpoint: &str,
        response_time_ms: f64,
        failed: bool,
        status: Option<u16>,
    ) -> u64 {
        let response_time_ms = if response_time_ms.is_finite() {
            response_time_ms.max(0.0)
        } else {
            0.0
        };
        // Histogram works in whole microseconds (clamp to ≥ 1 μs)
        let us = ((response_time_ms * 1000.0) as u64).max(1);

        let mut inner = self.inner.lock();
        let history = self.history;
        inner
            .endpoints
            .entry(endpoint.to_owned())
            .or_insert_with(|| EndpointStats::new(history))
            .push(response_time_ms, failed, status, history);
        inner.overall.push(response_time_ms, failed, status, history);
        inner.run_hist.saturating_record(us);
        inner.overall.total_requests
    }

    /// Run-wide request counter, used for TPS derivation.
    pub fn total_requests(&self) -> u64 {
        self.inner.lock().overall.total_requests
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        // Copy out under the lock, derive after releasing it.
        let (overall, endpoints, hist) = {
            let inner = self.inner.lock();
            (
                inner.overall.clone(),
                inner.endpoints.clone(),
                inner.run_hist.clone(),
            )
        };

        RecorderSnapshot {
            overall: overall.summarize(),
            endpoints: endpoints
                .into_iter()
                .map(|(name, stats)| (name, stats.summarize()))
                .collect(),
            run_latency: PercentileSet::from_histogram(&hist),
        }
    }
}

impl Default for RequestRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

// ─── EndpointStats impl ──────────────────────────────────────────

impl EndpointStats {
    fn new(history: usize) -> Self {
        Self {
            total_requests: 0,
            failed_requests: 0,
            response_times: VecDeque::with_capacity(history.min(DEFAULT_HISTORY) + 1),
            status_counts: BTreeMap::new(),
            start_time: None,
        }
    }

    fn push(&mut self, response_time_ms: f64, failed: bool, status: Option<u16>, history: usize) {
        self.start_time.get_or_insert_with(Local::now);
        self.total_requests += 1;
        if failed {
            self.failed_requests += 1;
        }
        if let Some(code) = status {
            *self.status_counts.entry(code).or_insert(0) += 1;
        }
        self.response_times.push_back(response_time_ms);
        while self.response_times.len() > history {
            self.response_times.pop_front();
        }
    }

    fn summarize(&self) -> EndpointSummary {
        EndpointSummary {
            total: self.total_requests,
            failed: self.failed_requests,
            success_rate: success_rate(self.total_requests, self.failed_requests),
            latency: LatencySummary::from_samples(&self.response_times),
            status_counts: self.status_counts.clone(),
            first_seen: self.start_time,
        }
    }
}

/// Percentage of successful requests; 0 when nothing was sent yet.
pub fn success_rate(total: u64, failed: u64) -> f64 {
    total.saturating_sub(failed) as f64 / total.max(1) as f64 * 100.0
}

/// Wall-clock helper for callers that time a request themselves.
pub fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
