//! Observability infrastructure for the decision engine
//!
//! Provides:
//! - Prometheus metrics (sample throughput, decision counts, latency)
//! - Structured logging with tracing for significant engine events

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{Decision, EntityId, MetricKey, TrafficType};

/// Histogram buckets for per-sample decision latency (in seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.000001, 0.000005, 0.00001, 0.000025, 0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025,
    0.005, 0.01,
];

/// Global metrics instance (registered once).
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    samples_processed: IntCounter,
    anomalies_detected: IntCounter,
    qos_violations: IntCounter,
    steering_recommendations: IntCounter,
    parameter_updates: IntCounter,
    model_retrains: IntCounter,
    decision_latency_seconds: Histogram,
    tracked_series: IntGauge,
    training_samples: IntGauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            samples_processed: register_int_counter!(
                "decision_engine_samples_processed_total",
                "Measurement reports processed by the engine"
            )
            .expect("Failed to register samples_processed"),

            anomalies_detected: register_int_counter!(
                "decision_engine_anomalies_detected_total",
                "Anomaly decisions emitted"
            )
            .expect("Failed to register anomalies_detected"),

            qos_violations: register_int_counter!(
                "decision_engine_qos_violations_total",
                "QoS violation decisions emitted"
            )
            .expect("Failed to register qos_violations"),

            steering_recommendations: register_int_counter!(
                "decision_engine_steering_recommendations_total",
                "Steering recommendations emitted"
            )
            .expect("Failed to register steering_recommendations"),

            parameter_updates: register_int_counter!(
                "decision_engine_parameter_updates_total",
                "Resource parameter updates emitted"
            )
            .expect("Failed to register parameter_updates"),

            model_retrains: register_int_counter!(
                "decision_engine_model_retrains_total",
                "Model snapshots published by retraining"
            )
            .expect("Failed to register model_retrains"),

            decision_latency_seconds: register_histogram!(
                "decision_engine_decision_latency_seconds",
                "Time spent deciding on one measurement report",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register decision_latency_seconds"),

            tracked_series: register_int_gauge!(
                "decision_engine_tracked_series",
                "Distinct metric series currently stored"
            )
            .expect("Failed to register tracked_series"),

            training_samples: register_int_gauge!(
                "decision_engine_training_samples",
                "Samples currently held in the training buffer"
            )
            .expect("Failed to register training_samples"),
        }
    }
}

/// Engine metrics for Prometheus exposition.
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_samples_processed(&self) {
        self.inner().samples_processed.inc();
    }

    /// Count one emitted decision under its kind.
    pub fn count_decision(&self, decision: &Decision) {
        let inner = self.inner();
        match decision {
            Decision::Anomaly { .. } => inner.anomalies_detected.inc(),
            Decision::QosViolation { .. } => inner.qos_violations.inc(),
            Decision::SteeringRecommendation { .. } => inner.steering_recommendations.inc(),
            Decision::ParameterUpdate { .. } => inner.parameter_updates.inc(),
        }
    }

    pub fn inc_model_retrains(&self) {
        self.inner().model_retrains.inc();
    }

    pub fn observe_decision_latency(&self, duration_secs: f64) {
        self.inner().decision_latency_seconds.observe(duration_secs);
    }

    pub fn set_tracked_series(&self, count: i64) {
        self.inner().tracked_series.set(count);
    }

    pub fn set_training_samples(&self, count: i64) {
        self.inner().training_samples.set(count);
    }
}

/// Structured logger for engine events.
///
/// Consistent field names for anomalies, violations, steering, and model
/// lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    scope: String,
}

impl StructuredLogger {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn log_anomaly(&self, key: &MetricKey, value: f64, score: f64) {
        warn!(
            event = "anomaly_detected",
            scope = %self.scope,
            entity = %key.entity,
            metric = %key.metric,
            value = value,
            z_score = score,
            "Anomaly detected"
        );
    }

    pub fn log_qos_violation(&self, entity: &EntityId, traffic_type: TrafficType, count: u32) {
        info!(
            event = "qos_violation",
            scope = %self.scope,
            entity = %entity,
            traffic_type = %traffic_type,
            violations = count,
            "QoS violation detected"
        );
    }

    pub fn log_steering(
        &self,
        entity: &EntityId,
        traffic_type: TrafficType,
        violations: u32,
        cell_load: f64,
    ) {
        warn!(
            event = "steering_recommended",
            scope = %self.scope,
            entity = %entity,
            traffic_type = %traffic_type,
            violations = violations,
            cell_load = cell_load,
            "Steering recommended"
        );
    }

    pub fn log_retrain(&self, buffered_samples: usize, has_classifier: bool) {
        info!(
            event = "model_retrained",
            scope = %self.scope,
            buffered_samples = buffered_samples,
            has_classifier = has_classifier,
            "Model retrained"
        );
    }

    /// Decision payload serialized for downstream log consumers.
    pub fn log_decision(&self, decision: &Decision) {
        let payload = serde_json::to_string(decision).unwrap_or_default();
        info!(
            event = "decision_emitted",
            scope = %self.scope,
            kind = decision.kind(),
            decision = %payload,
            "Decision emitted"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "engine_started",
            scope = %self.scope,
            engine_version = %version,
            "Decision engine started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            scope = %self.scope,
            reason = %reason,
            "Decision engine shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityId;

    #[test]
    fn test_engine_metrics_observe() {
        let metrics = EngineMetrics::new();
        metrics.inc_samples_processed();
        metrics.count_decision(&Decision::ParameterUpdate {
            entity: EntityId::ue("0"),
            value: 100.0,
        });
        metrics.inc_model_retrains();
        metrics.observe_decision_latency(0.0001);
        metrics.set_tracked_series(4);
        metrics.set_training_samples(20);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("engine-test");
        assert_eq!(logger.scope, "engine-test");
        logger.log_anomaly(
            &MetricKey::new(EntityId::ue("0"), "DRB.UEThpDl"),
            100.0,
            5.0,
        );
    }
}
