//! Keyed bounded sliding-window storage for metric observations.
//!
//! Each `MetricKey` owns a fixed-capacity ring of its most recent values.
//! Mutations for a given key are serialized by the backing map's shard
//! locks; distinct keys proceed independently.

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::models::MetricKey;

/// Fixed-capacity ring of the most recent observations for one key.
#[derive(Debug)]
struct MetricSeries {
    values: VecDeque<f64>,
    capacity: usize,
}

impl MetricSeries {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn snapshot(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}

/// Per-key sliding windows over the metric stream.
pub struct MetricStore {
    series: DashMap<MetricKey, MetricSeries>,
    capacity: usize,
}

impl MetricStore {
    /// Capacity applies uniformly to every series and is immutable after
    /// creation.
    pub fn new(capacity: usize) -> Self {
        Self {
            series: DashMap::new(),
            capacity,
        }
    }

    /// Append `value` to the series for `key`, creating it on first sight.
    /// Inserting beyond capacity evicts the oldest sample.
    pub fn update(&self, key: &MetricKey, value: f64) {
        self.series
            .entry(key.clone())
            .or_insert_with(|| MetricSeries::new(self.capacity))
            .push(value);
    }

    /// Current window, oldest-first. Empty for unseen keys. Read-only: a
    /// returned snapshot never blocks future updates.
    pub fn history(&self, key: &MetricKey) -> Vec<f64> {
        self.series
            .get(key)
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    /// Current window length, 0 for unseen keys.
    pub fn size(&self, key: &MetricKey) -> usize {
        self.series.get(key).map(|s| s.values.len()).unwrap_or(0)
    }

    /// Number of distinct keys seen so far.
    pub fn tracked_keys(&self) -> usize {
        self.series.len()
    }
}
