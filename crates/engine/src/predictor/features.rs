//! Feature derivation from an entity's stored throughput history.

use std::collections::BTreeMap;

use crate::models::{EntityId, MetricKey, METRIC_THP_DL, METRIC_THP_UL};
use crate::store::MetricStore;

/// Number of model input features.
pub const NUM_FEATURES: usize = 6;

/// Rolling-average lookback over the downlink/uplink windows.
const ROLLING_WINDOW: usize = 10;

/// Half-width of the short-term trend comparison.
const TREND_WINDOW: usize = 3;

/// Derives the fixed-length feature vector: current DL/UL, rolling average
/// DL/UL, short-term DL trend, and history length.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Extract features for `entity` from the current snapshot plus its
    /// stored downlink/uplink windows. `None` when the entity has no
    /// downlink history yet.
    pub fn extract(
        &self,
        store: &MetricStore,
        entity: &EntityId,
        snapshot: &BTreeMap<String, f64>,
    ) -> Option<Vec<f64>> {
        let dl_history = store.history(&MetricKey::new(entity.clone(), METRIC_THP_DL));
        if dl_history.is_empty() {
            return None;
        }
        let ul_history = store.history(&MetricKey::new(entity.clone(), METRIC_THP_UL));

        let current_dl = snapshot.get(METRIC_THP_DL).copied().unwrap_or(0.0);
        let current_ul = snapshot.get(METRIC_THP_UL).copied().unwrap_or(0.0);

        Some(vec![
            current_dl,
            current_ul,
            tail_mean(&dl_history, ROLLING_WINDOW),
            tail_mean(&ul_history, ROLLING_WINDOW),
            short_term_trend(&dl_history),
            dl_history.len() as f64,
        ])
    }
}

/// Mean of the most recent `n` values; 0.0 for an empty slice.
fn tail_mean(values: &[f64], n: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let tail = &values[values.len().saturating_sub(n)..];
    tail.iter().sum::<f64>() / tail.len() as f64
}

/// Mean of the most recent 3 values minus the mean of the preceding 3;
/// 0.0 until both halves exist.
fn short_term_trend(values: &[f64]) -> f64 {
    if values.len() < 2 * TREND_WINDOW {
        return 0.0;
    }
    let recent = &values[values.len() - TREND_WINDOW..];
    let older = &values[values.len() - 2 * TREND_WINDOW..values.len() - TREND_WINDOW];
    mean(recent) - mean(older)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
