use std::collections::VecDeque;

use super::DataPoint;

/// Samples of one series, evicted once older than the retention window.
pub struct RollingSeries {
    window_ms: i64,
    samples: VecDeque<DataPoint>,
}

impl RollingSeries {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            samples: VecDeque::new(),
        }
    }

    pub fn push(&mut self, timestamp_ms: i64, value: Option<f64>) {
        let at = self
            .samples
            .iter()
            .rposition(|p| p.timestamp_ms <= timestamp_ms)
            .map_or(0, |i| i + 1);
        self.samples.insert(at, DataPoint { timestamp_ms, value });

        let newest = self.samples.back().map_or(timestamp_ms, |p| p.timestamp_ms);
        self.evict(newest);
    }

    pub fn range(&self, from_ms: i64, to_ms: i64) -> Vec<DataPoint> {
        self.samples
            .iter()
            .filter(|p| p.timestamp_ms >= from_ms && p.timestamp_ms <= to_ms)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn evict(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.window_ms;
        while let Some(p) = self.samples.front() {
            if p.timestamp_ms < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
