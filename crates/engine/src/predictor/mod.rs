//! Online resource-parameter prediction
//!
//! Accumulates labeled feature vectors from the live stream, periodically
//! refits a regression model (PRB quota) and an optional trigger classifier,
//! and serves predictions once trained. Retraining publishes a complete
//! snapshot atomically so inference never observes half-fit state.

mod features;
mod model;
mod training;

pub use features::{FeatureExtractor, NUM_FEATURES};
pub use model::{FeatureScaler, LinearModel, LogisticModel, ModelSnapshot, PredictorError};
pub use training::{TrainingBuffer, TrainingSample};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::config::PredictorConfig;
use crate::models::EntityId;
use crate::store::MetricStore;

/// Online predictor for the per-entity resource-allocation parameter.
pub struct OnlinePredictor {
    config: PredictorConfig,
    extractor: FeatureExtractor,
    buffer: Mutex<TrainingBuffer>,
    snapshot: RwLock<Option<Arc<ModelSnapshot>>>,
}

impl OnlinePredictor {
    pub fn new(config: PredictorConfig) -> Self {
        let buffer = TrainingBuffer::new(config.buffer_capacity, config.buffer_retain);
        Self {
            config,
            extractor: FeatureExtractor,
            buffer: Mutex::new(buffer),
            snapshot: RwLock::new(None),
        }
    }

    /// Derive features for the entity and append a training sample. Returns
    /// false when the entity has no history to featurize yet.
    pub fn record_sample(
        &self,
        store: &MetricStore,
        entity: &EntityId,
        snapshot: &BTreeMap<String, f64>,
        target: f64,
        label: u8,
    ) -> bool {
        let Some(features) = self.extractor.extract(store, entity, snapshot) else {
            return false;
        };
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push(TrainingSample {
            features,
            target,
            label,
        });
        true
    }

    /// Samples recorded over the predictor's lifetime.
    pub fn samples_recorded(&self) -> u64 {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_recorded()
    }

    /// Current buffer occupancy.
    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True once a snapshot has been published.
    pub fn is_trained(&self) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// True when the published snapshot carries a trigger classifier.
    pub fn has_trigger_classifier(&self) -> bool {
        self.current_snapshot()
            .map(|s| s.classifier.is_some())
            .unwrap_or(false)
    }

    /// Refit on the buffered samples and publish a new snapshot. A no-op
    /// below the minimum sample count. The trigger classifier is refit only
    /// when both labels are present; otherwise the previous fit carries
    /// over.
    pub fn maybe_retrain(&self) -> bool {
        let (rows, targets, labels, distinct) = {
            let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            if buffer.len() < self.config.min_training_samples {
                return false;
            }
            let rows: Vec<Vec<f64>> =
                buffer.samples().iter().map(|s| s.features.clone()).collect();
            let targets: Vec<f64> = buffer.samples().iter().map(|s| s.target).collect();
            let labels: Vec<u8> = buffer.samples().iter().map(|s| s.label).collect();
            (rows, targets, labels, buffer.distinct_labels())
        };

        let scaler = FeatureScaler::fit(&rows);
        let scaled: Vec<Vec<f64>> = match rows.iter().map(|r| scaler.transform(r)).collect() {
            Ok(scaled) => scaled,
            // Unreachable with extractor-shaped rows; refuse to publish
            // rather than train misaligned.
            Err(_) => return false,
        };
        let regression = LinearModel::fit(&scaled, &targets);
        let classifier = if distinct >= 2 {
            Some(LogisticModel::fit(&scaled, &labels))
        } else {
            self.snapshot
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
                .and_then(|s| s.classifier.clone())
        };

        let next = Arc::new(ModelSnapshot {
            scaler,
            regression,
            classifier,
            trained_samples: rows.len(),
        });
        debug!(
            samples = next.trained_samples,
            has_classifier = next.classifier.is_some(),
            "Published model snapshot"
        );
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Some(next);
        true
    }

    /// Predict the resource parameter for the entity, mapped to one of the
    /// two configured operating points. Untrained, or an entity without
    /// history, gets the high default.
    pub fn predict_parameter(
        &self,
        store: &MetricStore,
        entity: &EntityId,
        snapshot: &BTreeMap<String, f64>,
    ) -> Result<f64, PredictorError> {
        let Some(model) = self.current_snapshot() else {
            return Ok(self.config.high_prb_ratio);
        };
        let Some(features) = self.extractor.extract(store, entity, snapshot) else {
            return Ok(self.config.high_prb_ratio);
        };

        let raw = model.predict_value(&features)?;
        let midpoint = (self.config.high_prb_ratio + self.config.low_prb_ratio) / 2.0;
        Ok(if raw > midpoint {
            self.config.high_prb_ratio
        } else {
            self.config.low_prb_ratio
        })
    }

    /// Predict whether the trigger condition (e.g. a handover) is expected.
    /// False until a classifier has seen both classes.
    pub fn predict_trigger(
        &self,
        store: &MetricStore,
        entity: &EntityId,
        snapshot: &BTreeMap<String, f64>,
    ) -> Result<bool, PredictorError> {
        let Some(model) = self.current_snapshot() else {
            return Ok(false);
        };
        let Some(features) = self.extractor.extract(store, entity, snapshot) else {
            return Ok(false);
        };
        match model.trigger_probability(&features)? {
            Some(p) => Ok(p > self.config.trigger_threshold),
            None => Ok(false),
        }
    }

    fn current_snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
