//! Engine configuration
//!
//! Every knob is a named, defaulted option; construction-time validation
//! rejects malformed values before any sample is processed.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{QosProfile, TrafficType};

/// Malformed configuration detected at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NonPositive { field: &'static str },
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{low_field} ({low}) must be below {high_field} ({high})")]
    InvertedBounds {
        low_field: &'static str,
        low: f64,
        high_field: &'static str,
        high: f64,
    },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Sliding-window capacity for every per-key metric series.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    #[serde(default)]
    pub anomaly: AnomalyConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub steering: SteeringConfig,

    #[serde(default)]
    pub predictor: PredictorConfig,
}

/// Z-score anomaly detection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Z-score above which a value counts as anomalous.
    #[serde(default = "default_anomaly_threshold")]
    pub threshold: f64,

    /// Minimum window length before scoring is attempted.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Seconds between alerts for the same key.
    #[serde(default = "default_alert_cooldown")]
    pub cooldown_secs: f64,
}

/// Traffic classification and QoS thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-entity snapshot history capacity.
    #[serde(default = "default_traffic_history")]
    pub history_capacity: usize,

    /// Entries required before classification; also the lookback used for
    /// throughput averages and variances.
    #[serde(default = "default_classify_min")]
    pub min_history: usize,

    #[serde(default = "default_voice_max_avg")]
    pub voice_max_avg: f64,
    #[serde(default = "default_voice_max_variance")]
    pub voice_max_variance: f64,
    #[serde(default = "default_video_min_avg_dl")]
    pub video_min_avg_dl: f64,
    #[serde(default = "default_video_min_var_dl")]
    pub video_min_var_dl: f64,
    #[serde(default = "default_gaming_min_avg_ul")]
    pub gaming_min_avg_ul: f64,
    #[serde(default = "default_gaming_min_var_ul")]
    pub gaming_min_var_ul: f64,
    #[serde(default = "default_web_min_avg_dl")]
    pub web_min_avg_dl: f64,
    #[serde(default = "default_web_max_avg_dl")]
    pub web_max_avg_dl: f64,
    #[serde(default = "default_file_transfer_min_avg_dl")]
    pub file_transfer_min_avg_dl: f64,

    /// Fraction of a profile's bandwidth below which downlink violates.
    #[serde(default = "default_dl_floor_fraction")]
    pub dl_floor_fraction: f64,
    /// Fraction of a profile's bandwidth below which uplink violates.
    #[serde(default = "default_ul_floor_fraction")]
    pub ul_floor_fraction: f64,

    /// QoS requirements per traffic class.
    #[serde(default = "default_qos_profiles")]
    pub qos_profiles: BTreeMap<TrafficType, QosProfile>,
}

/// Traffic steering gate parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SteeringConfig {
    /// Accumulated QoS violations required before steering.
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u32,

    /// Cell load above which offloading is considered.
    #[serde(default = "default_load_threshold")]
    pub load_threshold: f64,

    /// Highest (numerically largest) profile priority eligible for steering.
    #[serde(default = "default_priority_ceiling")]
    pub priority_ceiling: u8,

    /// Seconds between steering actions for the same entity.
    #[serde(default = "default_steering_cooldown")]
    pub cooldown_secs: f64,

    /// Throughput (Mbps) that maps to a load indicator of 1.0.
    #[serde(default = "default_load_normalization")]
    pub load_normalization_mbps: f64,
}

/// Online prediction parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Training buffer high-water mark.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Samples retained after a compaction.
    #[serde(default = "default_buffer_retain")]
    pub buffer_retain: usize,

    /// Buffered samples required before a retrain fits anything.
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,

    /// Recorded samples between retrain attempts.
    #[serde(default = "default_retrain_interval")]
    pub retrain_interval: usize,

    /// Low discrete operating point for the predicted PRB ratio.
    #[serde(default = "default_low_prb_ratio")]
    pub low_prb_ratio: f64,

    /// High discrete operating point; also the untrained default.
    #[serde(default = "default_high_prb_ratio")]
    pub high_prb_ratio: f64,

    /// Positive-class probability above which the trigger fires.
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_window_capacity() -> usize {
    200
}

fn default_anomaly_threshold() -> f64 {
    3.0
}

fn default_min_samples() -> usize {
    30
}

fn default_alert_cooldown() -> f64 {
    60.0
}

fn default_traffic_history() -> usize {
    50
}

fn default_classify_min() -> usize {
    10
}

fn default_voice_max_avg() -> f64 {
    0.5
}

fn default_voice_max_variance() -> f64 {
    1.0
}

fn default_video_min_avg_dl() -> f64 {
    20.0
}

fn default_video_min_var_dl() -> f64 {
    100.0
}

fn default_gaming_min_avg_ul() -> f64 {
    2.0
}

fn default_gaming_min_var_ul() -> f64 {
    10.0
}

fn default_web_min_avg_dl() -> f64 {
    1.0
}

fn default_web_max_avg_dl() -> f64 {
    20.0
}

fn default_file_transfer_min_avg_dl() -> f64 {
    50.0
}

fn default_dl_floor_fraction() -> f64 {
    0.5
}

fn default_ul_floor_fraction() -> f64 {
    0.3
}

fn default_qos_profiles() -> BTreeMap<TrafficType, QosProfile> {
    BTreeMap::from([
        (
            TrafficType::Voice,
            QosProfile {
                latency_ms: 10.0,
                bandwidth_mbps: 0.1,
                priority: 1,
            },
        ),
        (
            TrafficType::Video,
            QosProfile {
                latency_ms: 30.0,
                bandwidth_mbps: 5.0,
                priority: 2,
            },
        ),
        (
            TrafficType::Gaming,
            QosProfile {
                latency_ms: 20.0,
                bandwidth_mbps: 1.0,
                priority: 1,
            },
        ),
        (
            TrafficType::Web,
            QosProfile {
                latency_ms: 100.0,
                bandwidth_mbps: 10.0,
                priority: 3,
            },
        ),
        (
            TrafficType::FileTransfer,
            QosProfile {
                latency_ms: 500.0,
                bandwidth_mbps: 50.0,
                priority: 4,
            },
        ),
    ])
}

fn default_violation_threshold() -> u32 {
    3
}

fn default_load_threshold() -> f64 {
    0.8
}

fn default_priority_ceiling() -> u8 {
    2
}

fn default_steering_cooldown() -> f64 {
    120.0
}

fn default_load_normalization() -> f64 {
    1000.0
}

fn default_buffer_capacity() -> usize {
    1000
}

fn default_buffer_retain() -> usize {
    500
}

fn default_min_training_samples() -> usize {
    20
}

fn default_retrain_interval() -> usize {
    50
}

fn default_low_prb_ratio() -> f64 {
    10.0
}

fn default_high_prb_ratio() -> f64 {
    100.0
}

fn default_trigger_threshold() -> f64 {
    0.7
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: default_window_capacity(),
            anomaly: AnomalyConfig::default(),
            classifier: ClassifierConfig::default(),
            steering: SteeringConfig::default(),
            predictor: PredictorConfig::default(),
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_anomaly_threshold(),
            min_samples: default_min_samples(),
            cooldown_secs: default_alert_cooldown(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_capacity: default_traffic_history(),
            min_history: default_classify_min(),
            voice_max_avg: default_voice_max_avg(),
            voice_max_variance: default_voice_max_variance(),
            video_min_avg_dl: default_video_min_avg_dl(),
            video_min_var_dl: default_video_min_var_dl(),
            gaming_min_avg_ul: default_gaming_min_avg_ul(),
            gaming_min_var_ul: default_gaming_min_var_ul(),
            web_min_avg_dl: default_web_min_avg_dl(),
            web_max_avg_dl: default_web_max_avg_dl(),
            file_transfer_min_avg_dl: default_file_transfer_min_avg_dl(),
            dl_floor_fraction: default_dl_floor_fraction(),
            ul_floor_fraction: default_ul_floor_fraction(),
            qos_profiles: default_qos_profiles(),
        }
    }
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            violation_threshold: default_violation_threshold(),
            load_threshold: default_load_threshold(),
            priority_ceiling: default_priority_ceiling(),
            cooldown_secs: default_steering_cooldown(),
            load_normalization_mbps: default_load_normalization(),
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_capacity: default_buffer_capacity(),
            buffer_retain: default_buffer_retain(),
            min_training_samples: default_min_training_samples(),
            retrain_interval: default_retrain_interval(),
            low_prb_ratio: default_low_prb_ratio(),
            high_prb_ratio: default_high_prb_ratio(),
            trigger_threshold: default_trigger_threshold(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment (`ENGINE__*` variables),
    /// falling back to defaults, then validate.
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::with_prefix("ENGINE").separator("__"))
            .build()?;

        let cfg: EngineConfig = source.try_deserialize().unwrap_or_default();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject malformed values before any sample is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 {
            return Err(ConfigError::NonPositive {
                field: "window_capacity",
            });
        }
        if self.anomaly.threshold <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "anomaly.threshold",
            });
        }
        if self.anomaly.min_samples == 0 {
            return Err(ConfigError::NonPositive {
                field: "anomaly.min_samples",
            });
        }
        if self.anomaly.cooldown_secs < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "anomaly.cooldown_secs",
                min: 0.0,
                max: f64::INFINITY,
                value: self.anomaly.cooldown_secs,
            });
        }
        if self.classifier.history_capacity == 0 {
            return Err(ConfigError::NonPositive {
                field: "classifier.history_capacity",
            });
        }
        if self.classifier.min_history == 0 {
            return Err(ConfigError::NonPositive {
                field: "classifier.min_history",
            });
        }
        if self.classifier.min_history > self.classifier.history_capacity {
            return Err(ConfigError::OutOfRange {
                field: "classifier.min_history",
                min: 1.0,
                max: self.classifier.history_capacity as f64,
                value: self.classifier.min_history as f64,
            });
        }
        for (field, value) in [
            (
                "classifier.dl_floor_fraction",
                self.classifier.dl_floor_fraction,
            ),
            (
                "classifier.ul_floor_fraction",
                self.classifier.ul_floor_fraction,
            ),
            ("steering.load_threshold", self.steering.load_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    min: 0.0,
                    max: 1.0,
                    value,
                });
            }
        }
        if self.steering.violation_threshold == 0 {
            return Err(ConfigError::NonPositive {
                field: "steering.violation_threshold",
            });
        }
        if self.steering.cooldown_secs < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "steering.cooldown_secs",
                min: 0.0,
                max: f64::INFINITY,
                value: self.steering.cooldown_secs,
            });
        }
        if self.steering.load_normalization_mbps <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "steering.load_normalization_mbps",
            });
        }
        if self.predictor.buffer_capacity == 0 {
            return Err(ConfigError::NonPositive {
                field: "predictor.buffer_capacity",
            });
        }
        if self.predictor.buffer_retain == 0
            || self.predictor.buffer_retain > self.predictor.buffer_capacity
        {
            return Err(ConfigError::OutOfRange {
                field: "predictor.buffer_retain",
                min: 1.0,
                max: self.predictor.buffer_capacity as f64,
                value: self.predictor.buffer_retain as f64,
            });
        }
        if self.predictor.min_training_samples < 2 {
            return Err(ConfigError::OutOfRange {
                field: "predictor.min_training_samples",
                min: 2.0,
                max: self.predictor.buffer_capacity as f64,
                value: self.predictor.min_training_samples as f64,
            });
        }
        if self.predictor.retrain_interval == 0 {
            return Err(ConfigError::NonPositive {
                field: "predictor.retrain_interval",
            });
        }
        if self.predictor.low_prb_ratio >= self.predictor.high_prb_ratio {
            return Err(ConfigError::InvertedBounds {
                low_field: "predictor.low_prb_ratio",
                low: self.predictor.low_prb_ratio,
                high_field: "predictor.high_prb_ratio",
                high: self.predictor.high_prb_ratio,
            });
        }
        if !(0.0 < self.predictor.trigger_threshold && self.predictor.trigger_threshold < 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "predictor.trigger_threshold",
                min: 0.0,
                max: 1.0,
                value: self.predictor.trigger_threshold,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_profiles_cover_known_types() {
        let cfg = ClassifierConfig::default();
        for t in [
            TrafficType::Voice,
            TrafficType::Video,
            TrafficType::Gaming,
            TrafficType::Web,
            TrafficType::FileTransfer,
        ] {
            assert!(cfg.qos_profiles.contains_key(&t), "missing profile for {t}");
        }
        assert!(!cfg.qos_profiles.contains_key(&TrafficType::Unknown));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let cfg = EngineConfig {
            window_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositive {
                field: "window_capacity"
            })
        ));
    }

    #[test]
    fn test_out_of_range_load_threshold_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.steering.load_threshold = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_inverted_prb_bounds_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.predictor.low_prb_ratio = 100.0;
        cfg.predictor.high_prb_ratio = 10.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn test_trigger_threshold_must_be_a_probability() {
        let mut cfg = EngineConfig::default();
        cfg.predictor.trigger_threshold = 1.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }
}
