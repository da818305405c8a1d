//! Z-score anomaly scoring with rate-limited alerting.
//!
//! Scores the current value against the key's sliding window and applies a
//! per-key cooldown so a sustained excursion raises one alert per window,
//! not one per sample.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::config::AnomalyConfig;
use crate::models::MetricKey;
use crate::store::MetricStore;

/// Detects per-key deviations exceeding a z-score threshold.
pub struct AnomalyDetector {
    threshold: f64,
    min_samples: usize,
    cooldown_secs: f64,
    /// Last alert wall-clock per key; entries are created on first alert and
    /// never removed.
    last_alert: DashMap<MetricKey, f64>,
    total_detected: AtomicU64,
    per_key: DashMap<MetricKey, u64>,
}

impl AnomalyDetector {
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            threshold: config.threshold,
            min_samples: config.min_samples,
            cooldown_secs: config.cooldown_secs,
            last_alert: DashMap::new(),
            total_detected: AtomicU64::new(0),
            per_key: DashMap::new(),
        }
    }

    /// Score `current` against the key's window.
    ///
    /// Returns `(true, score)` only when the score exceeds the threshold AND
    /// the key's cooldown has elapsed; that path is the sole mutation point
    /// (cooldown stamp + counters). An exceedance inside the cooldown still
    /// reports the score so callers can log it without re-alerting.
    pub fn evaluate(
        &self,
        store: &MetricStore,
        key: &MetricKey,
        current: f64,
        now: f64,
    ) -> (bool, f64) {
        let history = store.history(key);
        if history.len() < self.min_samples {
            return (false, 0.0);
        }

        let mean = mean(&history);
        let std_dev = population_std_dev(&history, mean);
        // Constant window: no dispersion to score against.
        if std_dev < f64::EPSILON {
            return (false, 0.0);
        }

        let score = (current - mean).abs() / std_dev;
        if score <= self.threshold {
            return (false, score);
        }

        let cooldown_elapsed = match self.last_alert.get(key) {
            Some(last) => now - *last > self.cooldown_secs,
            None => true,
        };
        if !cooldown_elapsed {
            return (false, score);
        }

        self.last_alert.insert(key.clone(), now);
        self.total_detected.fetch_add(1, Ordering::Relaxed);
        *self.per_key.entry(key.clone()).or_insert(0) += 1;
        (true, score)
    }

    /// Detection counters since startup.
    pub fn stats(&self) -> AnomalyStats {
        let mut by_key: Vec<(MetricKey, u64)> = self
            .per_key
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        by_key.sort_by(|a, b| b.1.cmp(&a.1));
        AnomalyStats {
            total_detected: self.total_detected.load(Ordering::Relaxed),
            by_key,
        }
    }
}

/// Detection counters, most-alerted keys first.
#[derive(Debug, Clone)]
pub struct AnomalyStats {
    pub total_detected: u64,
    pub by_key: Vec<(MetricKey, u64)>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
