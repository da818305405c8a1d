//! Heuristic traffic-type classification from throughput patterns.

use std::collections::{BTreeMap, VecDeque};

use dashmap::DashMap;

use crate::config::ClassifierConfig;
use crate::models::{EntityId, TrafficType, METRIC_THP_DL, METRIC_THP_UL};

/// Aggregate throughput statistics over the classification lookback.
struct WindowStats {
    avg_dl: f64,
    avg_ul: f64,
    var_dl: f64,
    var_ul: f64,
}

type Rule = (TrafficType, fn(&ClassifierConfig, &WindowStats) -> bool);

fn is_voice(c: &ClassifierConfig, s: &WindowStats) -> bool {
    s.avg_dl < c.voice_max_avg
        && s.avg_ul < c.voice_max_avg
        && s.var_dl < c.voice_max_variance
        && s.var_ul < c.voice_max_variance
}

fn is_video(c: &ClassifierConfig, s: &WindowStats) -> bool {
    s.avg_dl > c.video_min_avg_dl && s.var_dl > c.video_min_var_dl
}

fn is_gaming(c: &ClassifierConfig, s: &WindowStats) -> bool {
    s.avg_ul > c.gaming_min_avg_ul && s.var_ul > c.gaming_min_var_ul
}

fn is_web(c: &ClassifierConfig, s: &WindowStats) -> bool {
    s.avg_dl >= c.web_min_avg_dl && s.avg_dl <= c.web_max_avg_dl
}

fn is_file_transfer(c: &ClassifierConfig, s: &WindowStats) -> bool {
    s.avg_dl > c.file_transfer_min_avg_dl
}

/// First-match-wins classification rules. The order is load-bearing: the
/// threshold ranges overlap (FileTransfer's floor lies inside Video's
/// range), so reordering changes results.
const RULES: &[Rule] = &[
    (TrafficType::Voice, is_voice),
    (TrafficType::Video, is_video),
    (TrafficType::Gaming, is_gaming),
    (TrafficType::Web, is_web),
    (TrafficType::FileTransfer, is_file_transfer),
];

/// Classifies an entity's traffic from its recent metric snapshots.
pub struct TrafficClassifier {
    config: ClassifierConfig,
    history: DashMap<EntityId, VecDeque<BTreeMap<String, f64>>>,
}

impl TrafficClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
        }
    }

    /// Append `snapshot` to the entity's history and classify from the most
    /// recent entries. Returns `Unknown` until enough history accumulates or
    /// when throughput metrics are absent from the lookback.
    pub fn classify(
        &self,
        entity: &EntityId,
        snapshot: &BTreeMap<String, f64>,
    ) -> TrafficType {
        let (len, dl, ul) = {
            let mut entry = self.history.entry(entity.clone()).or_default();
            if entry.len() == self.config.history_capacity {
                entry.pop_front();
            }
            entry.push_back(snapshot.clone());

            let lookback = entry.len().min(self.config.min_history);
            let recent = entry.iter().skip(entry.len() - lookback);
            let mut dl = Vec::with_capacity(lookback);
            let mut ul = Vec::with_capacity(lookback);
            for entry_snapshot in recent {
                if let Some(v) = entry_snapshot.get(METRIC_THP_DL) {
                    dl.push(*v);
                }
                if let Some(v) = entry_snapshot.get(METRIC_THP_UL) {
                    ul.push(*v);
                }
            }
            (entry.len(), dl, ul)
        };

        if len < self.config.min_history {
            return TrafficType::Unknown;
        }
        if dl.is_empty() || ul.is_empty() {
            return TrafficType::Unknown;
        }

        let stats = WindowStats {
            avg_dl: mean(&dl),
            avg_ul: mean(&ul),
            var_dl: variance(&dl),
            var_ul: variance(&ul),
        };

        RULES
            .iter()
            .find(|(_, rule)| rule(&self.config, &stats))
            .map(|(traffic, _)| *traffic)
            .unwrap_or(TrafficType::Unknown)
    }

    /// Entities with classification history.
    pub fn tracked_entities(&self) -> usize {
        self.history.len()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance; 0.0 below two samples.
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}
