//! Streaming statistical decision engine for RAN telemetry
//!
//! This crate provides the core functionality for:
//! - Bounded per-key sliding-window metric storage
//! - Online z-score anomaly detection with rate-limited alerting
//! - Heuristic traffic classification and QoS violation tracking
//! - Incremental model training and resource-parameter prediction
//! - Per-sample decision orchestration and dispatch

pub mod anomaly;
pub mod classifier;
pub mod config;
pub mod models;
pub mod observability;
pub mod policy;
pub mod predictor;
pub mod store;

pub use config::{
    AnomalyConfig, ClassifierConfig, ConfigError, EngineConfig, PredictorConfig, SteeringConfig,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use policy::{DecisionEngine, Dispatcher, EngineStats};
pub use store::MetricStore;
