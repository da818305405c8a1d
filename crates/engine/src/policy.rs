//! Per-sample orchestration and decision emission.
//!
//! `DecisionEngine` wires the store, the anomaly detector, the classifier,
//! and the predictor into one per-sample pipeline, and pumps decisions to
//! the external dispatcher.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::anomaly::AnomalyDetector;
use crate::classifier::{QosMonitor, TrafficClassifier};
use crate::config::EngineConfig;
use crate::models::{
    Decision, EntityId, MeasurementReport, MetricKey, TrafficType, METRIC_CONN_ESTAB,
    METRIC_THP_DL, METRIC_THP_UL,
};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::predictor::OnlinePredictor;
use crate::store::MetricStore;

/// Outbound seam: translates a decision into a protocol-level control
/// action. The engine fires and forgets; it never reacts to a transmission
/// result.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, decision: Decision);
}

/// The streaming decision engine.
pub struct DecisionEngine {
    config: EngineConfig,
    store: MetricStore,
    anomaly: AnomalyDetector,
    classifier: TrafficClassifier,
    qos: QosMonitor,
    predictor: OnlinePredictor,
    /// Last steering wall-clock per entity; independent of the anomaly
    /// cooldown.
    last_steering: DashMap<EntityId, f64>,
    samples_seen: AtomicU64,
    decisions_emitted: AtomicU64,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        let store = MetricStore::new(config.window_capacity);
        let anomaly = AnomalyDetector::new(&config.anomaly);
        let classifier = TrafficClassifier::new(config.classifier.clone());
        let qos = QosMonitor::new(
            config.classifier.qos_profiles.clone(),
            config.classifier.dl_floor_fraction,
            config.classifier.ul_floor_fraction,
        );
        let predictor = OnlinePredictor::new(config.predictor.clone());
        Ok(Self {
            config,
            store,
            anomaly,
            classifier,
            qos,
            predictor,
            last_steering: DashMap::new(),
            samples_seen: AtomicU64::new(0),
            decisions_emitted: AtomicU64::new(0),
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("decision-engine"),
        })
    }

    /// Process one decoded measurement report and return the decisions it
    /// warrants, in emission order.
    pub fn on_sample(&self, report: &MeasurementReport) -> Result<Vec<Decision>> {
        let started = Instant::now();
        let now = report.timestamp;
        let mut decisions = Vec::new();

        for (name, value) in &report.metrics {
            self.store
                .update(&MetricKey::new(report.entity.clone(), name.clone()), *value);
        }

        if self.config.anomaly.enabled {
            self.run_anomaly_stage(report, now, &mut decisions);
        }
        if self.config.classifier.enabled {
            self.run_classification_stage(report, now, &mut decisions);
        }
        if self.config.predictor.enabled {
            self.run_prediction_stage(report, &mut decisions)?;
        }

        self.samples_seen.fetch_add(1, Ordering::Relaxed);
        self.decisions_emitted
            .fetch_add(decisions.len() as u64, Ordering::Relaxed);
        self.metrics.inc_samples_processed();
        for decision in &decisions {
            self.metrics.count_decision(decision);
        }
        self.metrics
            .set_tracked_series(self.store.tracked_keys() as i64);
        self.metrics
            .observe_decision_latency(started.elapsed().as_secs_f64());
        Ok(decisions)
    }

    fn run_anomaly_stage(
        &self,
        report: &MeasurementReport,
        now: f64,
        decisions: &mut Vec<Decision>,
    ) {
        for (name, value) in &report.metrics {
            let key = MetricKey::new(report.entity.clone(), name.clone());
            let (is_anomaly, score) = self.anomaly.evaluate(&self.store, &key, *value, now);
            if is_anomaly {
                self.logger.log_anomaly(&key, *value, score);
                decisions.push(Decision::Anomaly {
                    key,
                    value: *value,
                    score,
                });
            } else if score > 0.0 {
                debug!(key = %key, z_score = score, "Scored within bounds");
            }
        }
    }

    fn run_classification_stage(
        &self,
        report: &MeasurementReport,
        now: f64,
        decisions: &mut Vec<Decision>,
    ) {
        let traffic = self.classifier.classify(&report.entity, &report.metrics);
        let cell_load = self.evaluate_cell_load(&report.metrics);

        if self
            .qos
            .check_violation(&report.entity, traffic, &report.metrics)
        {
            let count = self.qos.violations(&report.entity);
            self.logger.log_qos_violation(&report.entity, traffic, count);
            decisions.push(Decision::QosViolation {
                entity: report.entity.clone(),
                traffic_type: traffic,
            });
        }

        if self.should_steer(&report.entity, cell_load, traffic, now) {
            let violations = self.qos.violations(&report.entity);
            self.last_steering.insert(report.entity.clone(), now);
            self.qos.reset_violations(&report.entity);
            self.logger
                .log_steering(&report.entity, traffic, violations, cell_load);
            decisions.push(Decision::SteeringRecommendation {
                entity: report.entity.clone(),
                traffic_type: traffic,
                violations,
                cell_load,
            });
        }
    }

    fn run_prediction_stage(
        &self,
        report: &MeasurementReport,
        decisions: &mut Vec<Decision>,
    ) -> Result<()> {
        let value = self
            .predictor
            .predict_parameter(&self.store, &report.entity, &report.metrics)?;
        decisions.push(Decision::ParameterUpdate {
            entity: report.entity.clone(),
            value,
        });

        // The emitted value stands in for the realized outcome until a
        // feedback path exists.
        self.predictor
            .record_sample(&self.store, &report.entity, &report.metrics, value, 0);
        self.metrics
            .set_training_samples(self.predictor.buffer_len() as i64);

        let recorded = self.predictor.samples_recorded();
        if recorded > 0 && recorded % self.config.predictor.retrain_interval as u64 == 0 {
            if self.predictor.maybe_retrain() {
                self.logger.log_retrain(
                    self.predictor.buffer_len(),
                    self.predictor.has_trigger_classifier(),
                );
                self.metrics.inc_model_retrains();
            }
        }
        Ok(())
    }

    /// Average of the clamped [0, 1] load indicators present in the sample;
    /// 0.0 when none are present.
    fn evaluate_cell_load(&self, metrics: &BTreeMap<String, f64>) -> f64 {
        let norm = self.config.steering.load_normalization_mbps;
        let mut indicators = Vec::new();
        if let Some(dl) = metrics.get(METRIC_THP_DL) {
            indicators.push((dl / norm).clamp(0.0, 1.0));
        }
        if let Some(ul) = metrics.get(METRIC_THP_UL) {
            indicators.push((ul / norm).clamp(0.0, 1.0));
        }
        if let Some(rate) = metrics.get(METRIC_CONN_ESTAB) {
            // Degrading establishment success reads as congestion.
            let indicator = if *rate > 0.0 { 1.0 - rate / 100.0 } else { 0.0 };
            indicators.push(indicator.clamp(0.0, 1.0));
        }
        if indicators.is_empty() {
            return 0.0;
        }
        indicators.iter().sum::<f64>() / indicators.len() as f64
    }

    fn should_steer(
        &self,
        entity: &EntityId,
        cell_load: f64,
        traffic: TrafficType,
        now: f64,
    ) -> bool {
        if let Some(last) = self.last_steering.get(entity) {
            if now - *last < self.config.steering.cooldown_secs {
                return false;
            }
        }
        if self.qos.violations(entity) < self.config.steering.violation_threshold {
            return false;
        }
        cell_load > self.config.steering.load_threshold
            && self.qos.priority(traffic) <= self.config.steering.priority_ceiling
    }

    /// Trigger prediction for external consumers (e.g. a handover planner);
    /// not part of the per-sample pipeline.
    pub fn predict_trigger(&self, entity: &EntityId, metrics: &BTreeMap<String, f64>) -> Result<bool> {
        Ok(self.predictor.predict_trigger(&self.store, entity, metrics)?)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            samples_seen: self.samples_seen.load(Ordering::Relaxed),
            decisions_emitted: self.decisions_emitted.load(Ordering::Relaxed),
            anomalies_detected: self.anomaly.stats().total_detected,
            tracked_series: self.store.tracked_keys(),
            classified_entities: self.classifier.tracked_entities(),
            model_trained: self.predictor.is_trained(),
        }
    }

    /// Drive the engine from a report channel, dispatching each decision.
    /// Exits when the channel closes or shutdown is signalled.
    pub async fn run(
        self: Arc<Self>,
        mut reports: mpsc::Receiver<MeasurementReport>,
        dispatcher: Arc<dyn Dispatcher>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Starting decision engine loop");
        loop {
            tokio::select! {
                maybe_report = reports.recv() => {
                    match maybe_report {
                        Some(report) => match self.on_sample(&report) {
                            Ok(decisions) => {
                                for decision in decisions {
                                    self.logger.log_decision(&decision);
                                    dispatcher.dispatch(decision).await;
                                }
                            }
                            Err(e) => {
                                warn!(entity = %report.entity, error = %e, "Sample processing failed");
                            }
                        },
                        None => {
                            info!("Report stream closed");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    self.logger.log_shutdown("shutdown signal received");
                    break;
                }
            }
        }
    }
}

/// Point-in-time engine counters.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub samples_seen: u64,
    pub decisions_emitted: u64,
    pub anomalies_detected: u64,
    pub tracked_series: usize,
    pub classified_entities: usize,
    pub model_trained: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(entity: &str, ts: f64, dl: f64, ul: f64) -> MeasurementReport {
        MeasurementReport::new(EntityId::ue(entity), ts)
            .with_metric(METRIC_THP_DL, dl)
            .with_metric(METRIC_THP_UL, ul)
    }

    fn engine_with(config: EngineConfig) -> DecisionEngine {
        DecisionEngine::new(config).unwrap()
    }

    #[test]
    fn test_cell_load_missing_metrics_is_zero() {
        let engine = engine_with(EngineConfig::default());
        assert_eq!(engine.evaluate_cell_load(&BTreeMap::new()), 0.0);
    }

    #[test]
    fn test_cell_load_averages_clamped_indicators() {
        let engine = engine_with(EngineConfig::default());
        let metrics = BTreeMap::from([
            (METRIC_THP_DL.to_string(), 2000.0),
            (METRIC_THP_UL.to_string(), 500.0),
            (METRIC_CONN_ESTAB.to_string(), 40.0),
        ]);
        // Indicators: 1.0 (clamped), 0.5, 0.6 -> 0.7
        let load = engine.evaluate_cell_load(&metrics);
        assert!((load - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_cell_load_zero_success_rate_reads_idle() {
        let engine = engine_with(EngineConfig::default());
        let metrics = BTreeMap::from([(METRIC_CONN_ESTAB.to_string(), 0.0)]);
        assert_eq!(engine.evaluate_cell_load(&metrics), 0.0);
    }

    #[test]
    fn test_disabled_stages_emit_nothing() {
        let mut config = EngineConfig::default();
        config.anomaly.enabled = false;
        config.classifier.enabled = false;
        config.predictor.enabled = false;
        let engine = engine_with(config);

        for i in 0..40 {
            let decisions = engine.on_sample(&report("0", i as f64, 10.0, 1.0)).unwrap();
            assert!(decisions.is_empty());
        }
        // The store still tracks windows for when stages come back.
        assert_eq!(engine.stats().tracked_series, 2);
        assert_eq!(engine.stats().samples_seen, 40);
    }

    #[test]
    fn test_parameter_update_emitted_every_sample() {
        let mut config = EngineConfig::default();
        config.anomaly.enabled = false;
        config.classifier.enabled = false;
        let engine = engine_with(config);

        let decisions = engine.on_sample(&report("0", 0.0, 10.0, 1.0)).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(
            decisions[0],
            Decision::ParameterUpdate {
                entity: EntityId::ue("0"),
                value: 100.0,
            }
        );
    }

    #[test]
    fn test_steering_gate_requires_all_conditions() {
        let mut config = EngineConfig::default();
        config.anomaly.enabled = false;
        config.predictor.enabled = false;
        // Make load reachable with modest uplink throughput.
        config.steering.load_normalization_mbps = 1.0;
        config.steering.load_threshold = 0.5;
        let engine = engine_with(config);
        let entity = EntityId::ue("0");

        // Gaming-shaped traffic (variable UL) with a DL below the 0.5 Mbps
        // floor: violations accumulate from the 10th sample onward.
        let mut steered_at = None;
        for i in 0..14 {
            let ul = if i % 2 == 0 { 2.0 } else { 12.0 };
            let decisions = engine
                .on_sample(&report("0", i as f64, 0.3, ul))
                .unwrap();
            if decisions
                .iter()
                .any(|d| matches!(d, Decision::SteeringRecommendation { .. }))
            {
                steered_at = Some(i);
                break;
            }
        }
        // Classification starts at index 9 (violations 1..), threshold 3
        // reached within the sample at index 11.
        assert_eq!(steered_at, Some(11));
        assert_eq!(engine.qos.violations(&entity), 0);
    }

    #[test]
    fn test_steering_cooldown_blocks_back_to_back_recommendations() {
        let mut config = EngineConfig::default();
        config.anomaly.enabled = false;
        config.predictor.enabled = false;
        config.steering.load_normalization_mbps = 1.0;
        config.steering.load_threshold = 0.5;
        let engine = engine_with(config);

        let mut steering_times = Vec::new();
        for i in 0..300 {
            let ul = if i % 2 == 0 { 2.0 } else { 12.0 };
            let decisions = engine
                .on_sample(&report("0", i as f64, 0.3, ul))
                .unwrap();
            if decisions
                .iter()
                .any(|d| matches!(d, Decision::SteeringRecommendation { .. }))
            {
                steering_times.push(i as f64);
            }
        }
        assert!(steering_times.len() >= 2);
        for pair in steering_times.windows(2) {
            assert!(pair[1] - pair[0] >= 120.0);
        }
    }
}
