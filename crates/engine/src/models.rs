//! Core data models for the decision engine

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Downlink throughput measurement name (E2SM-KPM).
pub const METRIC_THP_DL: &str = "DRB.UEThpDl";
/// Uplink throughput measurement name (E2SM-KPM).
pub const METRIC_THP_UL: &str = "DRB.UEThpUl";
/// RRC connection establishment success rate.
pub const METRIC_CONN_ESTAB: &str = "RRC.ConnEstabSucc";

/// Identifier for a monitored endpoint: a UE, or the cell-level aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    /// Per-UE series.
    pub fn ue(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Cell-wide aggregate series.
    pub fn cell() -> Self {
        Self("cell".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_cell(&self) -> bool {
        self.0 == "cell"
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Composite key for one metric series: entity plus metric name.
///
/// Replaces the string-concatenation key of earlier designs; comparable and
/// hashable without parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub entity: EntityId,
    pub metric: String,
}

impl MetricKey {
    pub fn new(entity: EntityId, metric: impl Into<String>) -> Self {
        Self {
            entity,
            metric: metric.into(),
        }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity, self.metric)
    }
}

/// One decoded measurement report delivered by the subscription layer.
///
/// Values are pre-aggregated scalars: any multi-sample aggregation happens
/// upstream before the report reaches the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub entity: EntityId,
    /// Wall-clock seconds when the report was produced.
    pub timestamp: f64,
    pub metrics: BTreeMap<String, f64>,
}

impl MeasurementReport {
    pub fn new(entity: EntityId, timestamp: f64) -> Self {
        Self {
            entity,
            timestamp,
            metrics: BTreeMap::new(),
        }
    }

    /// Report stamped with the current wall clock.
    pub fn now(entity: EntityId) -> Self {
        let ts = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        Self::new(entity, ts)
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// Traffic classes recognized by the heuristic classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrafficType {
    Voice,
    Video,
    Gaming,
    Web,
    FileTransfer,
    Unknown,
}

impl std::fmt::Display for TrafficType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrafficType::Voice => "voice",
            TrafficType::Video => "video",
            TrafficType::Gaming => "gaming",
            TrafficType::Web => "web",
            TrafficType::FileTransfer => "file_transfer",
            TrafficType::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// QoS requirements for one traffic class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosProfile {
    pub latency_ms: f64,
    pub bandwidth_mbps: f64,
    pub priority: u8,
}

/// A control decision produced by the engine, consumed exactly once by the
/// external dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// A metric deviated beyond the z-score threshold.
    Anomaly {
        key: MetricKey,
        value: f64,
        score: f64,
    },
    /// The current sample fell below the classified type's QoS floor.
    QosViolation {
        entity: EntityId,
        traffic_type: TrafficType,
    },
    /// Accumulated violations under cell load warrant moving the entity.
    SteeringRecommendation {
        entity: EntityId,
        traffic_type: TrafficType,
        violations: u32,
        cell_load: f64,
    },
    /// Updated resource-allocation parameter for the entity.
    ParameterUpdate { entity: EntityId, value: f64 },
}

impl Decision {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Decision::Anomaly { .. } => "anomaly",
            Decision::QosViolation { .. } => "qos_violation",
            Decision::SteeringRecommendation { .. } => "steering_recommendation",
            Decision::ParameterUpdate { .. } => "parameter_update",
        }
    }
}
