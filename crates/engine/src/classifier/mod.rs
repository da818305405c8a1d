//! Traffic classification and QoS violation tracking
//!
//! Heuristic pattern classification over recent throughput windows, plus a
//! per-entity violation counter against the classified type's QoS profile.

mod qos;
mod traffic;

pub use qos::QosMonitor;
pub use traffic::TrafficClassifier;
