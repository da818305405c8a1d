//! Anomaly detection over per-key metric windows
//!
//! Z-score deviation scoring with per-key alert cooldown and detection
//! counters.

mod zscore;

pub use zscore::{AnomalyDetector, AnomalyStats};
