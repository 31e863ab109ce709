pub mod aggregator;
pub mod percentiles;
pub mod recorder;
pub mod system;
pub mod window;

pub use aggregator::{MetricsAggregator, Snapshot};
pub use recorder::RequestRecorder;
pub use system::SystemResourceMonitor;
pub use window::RollingWindow;

/// One completed request, as reported by a virtual user.
/// This is the "write" side: clients create these and push them in.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// e.g. "GET", "POST"
    pub request_type: &'static str,
    /// Logical endpoint name used as the aggregation key, e.g. "get_profile"
    pub name: String,
    /// Wall time of the request in milliseconds
    pub response_time_ms: f64,
    /// HTTP status when a response arrived at all
    pub status: Option<u16>,
    /// Set when the request counts as failed
    pub error: Option<String>,
}

impl RequestEvent {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}
