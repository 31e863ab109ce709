use std::collections::VecDeque;

/// Default number of samples kept per resource series (one minute at 1 Hz).
pub const DEFAULT_WINDOW: usize = 60;

/// Fixed-capacity FIFO of recent samples.
///
/// Aggregates over an empty window are 0 rather than an error: these values
/// only ever end up on the dashboard.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Push a sample, evicting the oldest once the window is full.
    pub fn append(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn max(&self) -> f64 {
        self.samples
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
            .unwrap_or(0.0)
    }

    /// Mean of the newest `n` samples (or all of them if fewer are held).
    pub fn recent(&self, n: usize) -> f64 {
        let take = n.min(self.samples.len());
        if take == 0 {
            return 0.0;
        }
        self.samples.iter().rev().take(take).sum::<f64>() / take as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.samples.iter()
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_zero() {
        let w = RollingWindow::default();
        assert_eq!(w.mean(), 0.0);
        assert_eq!(w.max(), 0.0);
        assert_eq!(w.recent(5), 0.0);
        assert!(w.is_empty());
    }

    #[test]
    fn evicts_oldest_first() {
        let mut w = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            w.append(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
        assert_eq!(w.mean(), 4.0);
        assert_eq!(w.max(), 5.0);
    }

    #[test]
    fn max_handles_negative_values() {
        let mut w = RollingWindow::new(4);
        w.append(-3.0);
        w.append(-1.5);
        assert_eq!(w.max(), -1.5);
    }

    #[test]
    fn recent_uses_newest_samples() {
        let mut w = RollingWindow::new(10);
        for v in 1..=8 {
            w.append(v as f64);
        }
        // last five: 4..=8
        assert_eq!(w.recent(5), 6.0);
        assert_eq!(w.recent(50), 4.5);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut w = RollingWindow::new(0);
        w.append(7.0);
        w.append(9.0);
        assert_eq!(w.capacity(), 1);
        assert_eq!(w.mean(), 9.0);
    }
}
