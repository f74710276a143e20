// 3.0 deviation.rs: bounded ring of recent peg deviations. the breaker needs
// persistence, not a single spike, before escalating, so it queries windows of
// this history. fixed capacity, allocation-free after construction, newest
// sample first when scanning.

use crate::types::{BlockNumber, Timestamp};
use serde::{Deserialize, Serialize};

/// Ring capacity. Every breaker window is validated against this bound.
pub const DEVIATION_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationSample {
    pub block: BlockNumber,
    pub deviation_bps: u64,
    pub signed_bps: i64,
    pub timestamp: Timestamp,
}

/// Circular history of absolute deviations, overwrite-oldest when full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationTracker {
    samples: Vec<DeviationSample>,
    head: usize,
    count: usize,
}

impl DeviationTracker {
    pub fn new() -> Self {
        Self {
            samples: Vec::with_capacity(DEVIATION_CAPACITY),
            head: 0,
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn record(&mut self, sample: DeviationSample) {
        if self.samples.len() < DEVIATION_CAPACITY {
            self.samples.push(sample);
        } else {
            self.samples[self.head] = sample;
        }
        self.head = (self.head + 1) % DEVIATION_CAPACITY;
        if self.count < DEVIATION_CAPACITY {
            self.count += 1;
        }
    }

    /// Newest-first iteration over the most recent `window` samples.
    fn recent(&self, window: usize) -> impl Iterator<Item = &DeviationSample> {
        // before the ring fills, head == samples.len(), so head - back is in range
        let take = window.min(self.count);
        (1..=take).map(move |back| {
            let idx = (self.head + DEVIATION_CAPACITY - back) % DEVIATION_CAPACITY;
            &self.samples[idx]
        })
    }

    /// Maximum absolute deviation over the most recent `window` samples.
    pub fn max_over(&self, window: usize) -> u64 {
        self.recent(window)
            .map(|s| s.deviation_bps)
            .max()
            .unwrap_or(0)
    }

    /// Number of samples >= `threshold_bps` within the most recent `window`.
    pub fn count_above(&self, window: usize, threshold_bps: u64) -> usize {
        self.recent(window)
            .filter(|s| s.deviation_bps >= threshold_bps)
            .count()
    }

    /// Recovery query: true only when at least `window` samples exist and
    /// every one of the most recent `window` is strictly below `threshold_bps`.
    pub fn all_below(&self, window: usize, threshold_bps: u64) -> bool {
        if self.count < window {
            return false;
        }
        self.recent(window).all(|s| s.deviation_bps < threshold_bps)
    }

    pub fn latest(&self) -> Option<&DeviationSample> {
        self.recent(1).next()
    }
}

impl Default for DeviationTracker {
    fn default() -> Self {
        Self::new()
    }
}
