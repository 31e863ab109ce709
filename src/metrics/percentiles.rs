use hdrhistogram::Histogram;
use serde::Serialize;

/// HdrHistogram range: 1 μs → 10 min, 3 significant figures
pub const HIST_LOW_US: u64 = 1;
pub const HIST_HIGH_US: u64 = 600_000_000;
pub const HIST_SIGFIG: u8 = 3;

/// Minimum history length before a p95 is reported from the window.
const P95_MIN_SAMPLES: usize = 20;

/// Run-wide percentile breakdown in milliseconds, taken from the
/// histogram of every request seen since the process started.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PercentileSet {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
    pub count: u64,
}

impl PercentileSet {
    /// Extract a full percentile set from a microsecond histogram.
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        let ms = |us: u64| us as f64 / 1000.0;
        Self {
            min: ms(hist.min()),
            max: ms(hist.max()),
            mean: hist.mean() / 1000.0,
            p50: ms(hist.value_at_percentile(50.0)),
            p95: ms(hist.value_at_percentile(95.0)),
            p99: ms(hist.value_at_percentile(99.0)),
            p999: ms(hist.value_at_percentile(99.9)),
            count: hist.len(),
        }
    }

    /// All-zero placeholder used before any samples are recorded.
    pub fn empty() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
            p999: 0.0,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

pub fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW_US, HIST_HIGH_US, HIST_SIGFIG)
        .expect("static histogram bounds are valid")
}

/// Mean / median / p95 over the retained response-time window.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean: f64,
    pub median: f64,
    /// Only present once more than 20 samples are held.
    pub p95: Option<f64>,
}

impl LatencySummary {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a f64>) -> Self {
        let mut sorted: Vec<f64> = samples.into_iter().copied().collect();
        if sorted.is_empty() {
            return Self {
                samples: 0,
                mean: 0.0,
                median: 0.0,
                p95: None,
            };
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        let p95 = (n > P95_MIN_SAMPLES).then(|| sorted[(n as f64 * 0.95) as usize]);

        Self {
            samples: n,
            mean,
            median,
            p95,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_samples_have_no_p95() {
        let s = LatencySummary::from_samples(&[100.0, 200.0, 300.0, 400.0, 500.0]);
        assert_eq!(s.mean, 300.0);
        assert_eq!(s.median, 300.0);
        assert_eq!(s.p95, None);
    }

    #[test]
    fn p95_indexes_sorted_history() {
        // 21 samples; after sorting the outlier sits at index 20
        let mut samples = vec![100.0; 20];
        samples.insert(7, 1000.0);
        let s = LatencySummary::from_samples(&samples);
        let idx = (21.0_f64 * 0.95).floor() as usize;
        assert_eq!(idx, 19);
        assert_eq!(s.p95, Some(100.0));

        // with the outlier placed at the index itself
        let mut samples = vec![100.0; 19];
        samples.extend([1000.0, 2000.0]);
        let s = LatencySummary::from_samples(&samples);
        assert_eq!(s.p95, Some(1000.0));
    }

    #[test]
    fn p95_needs_more_than_twenty_samples() {
        assert_eq!(LatencySummary::from_samples(&[1.0; 20]).p95, None);
        assert_eq!(LatencySummary::from_samples(&[1.0; 21]).p95, Some(1.0));
    }

    #[test]
    fn even_length_median_averages_middle_pair() {
        let s = LatencySummary::from_samples(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(s.median, 2.5);
    }

    #[test]
    fn empty_summary_is_zero() {
        let s = LatencySummary::from_samples(&Vec::<f64>::new());
        assert_eq!(s.samples, 0);
        assert_eq!(s.mean, 0.0);
        assert_eq!(s.median, 0.0);
        assert!(s.p95.is_none());
    }

    #[test]
    fn histogram_set_converts_to_millis() {
        let mut h = new_histogram();
        h.record(2_000).unwrap();
        h.record(4_000).unwrap();
        let set = PercentileSet::from_histogram(&h);
        assert!(set.has_data());
        assert_eq!(set.count, 2);
        assert!((set.mean - 3.0).abs() < 0.01);
        assert!((set.max - 4.0).abs() < 0.01);
        assert!(!PercentileSet::from_histogram(&new_histogram()).has_data());
    }
}
