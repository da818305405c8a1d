//! QoS profile lookup and per-entity violation tracking.

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::models::{EntityId, QosProfile, TrafficType, METRIC_THP_DL, METRIC_THP_UL};

/// Profile priority assumed when a type has no configured profile.
const UNPROFILED_PRIORITY: u8 = 5;

/// Checks samples against the classified type's bandwidth floor and counts
/// violations per entity until a steering decision resets them.
pub struct QosMonitor {
    profiles: BTreeMap<TrafficType, QosProfile>,
    dl_floor_fraction: f64,
    ul_floor_fraction: f64,
    violations: DashMap<EntityId, u32>,
}

impl QosMonitor {
    pub fn new(
        profiles: BTreeMap<TrafficType, QosProfile>,
        dl_floor_fraction: f64,
        ul_floor_fraction: f64,
    ) -> Self {
        Self {
            profiles,
            dl_floor_fraction,
            ul_floor_fraction,
            violations: DashMap::new(),
        }
    }

    /// Check the snapshot against the type's bandwidth floor.
    ///
    /// Downlink is checked before uplink and the first violating metric
    /// wins; a missing metric skips its sub-check. Increments the entity's
    /// violation counter on the violating path only.
    pub fn check_violation(
        &self,
        entity: &EntityId,
        traffic_type: TrafficType,
        snapshot: &BTreeMap<String, f64>,
    ) -> bool {
        if traffic_type == TrafficType::Unknown {
            return false;
        }
        let Some(profile) = self.profiles.get(&traffic_type) else {
            return false;
        };

        if let Some(dl) = snapshot.get(METRIC_THP_DL) {
            if *dl < profile.bandwidth_mbps * self.dl_floor_fraction {
                *self.violations.entry(entity.clone()).or_insert(0) += 1;
                return true;
            }
        }
        if let Some(ul) = snapshot.get(METRIC_THP_UL) {
            if *ul < profile.bandwidth_mbps * self.ul_floor_fraction {
                *self.violations.entry(entity.clone()).or_insert(0) += 1;
                return true;
            }
        }
        false
    }

    /// Accumulated violations for the entity since the last reset.
    pub fn violations(&self, entity: &EntityId) -> u32 {
        self.violations.get(entity).map(|v| *v).unwrap_or(0)
    }

    /// Reset after a steering decision fires.
    pub fn reset_violations(&self, entity: &EntityId) {
        self.violations.insert(entity.clone(), 0);
    }

    /// Scheduling priority of the type, or the unprofiled default.
    pub fn priority(&self, traffic_type: TrafficType) -> u8 {
        self.profiles
            .get(&traffic_type)
            .map(|p| p.priority)
            .unwrap_or(UNPROFILED_PRIORITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    fn monitor() -> QosMonitor {
        let cfg = ClassifierConfig::default();
        QosMonitor::new(cfg.qos_profiles, cfg.dl_floor_fraction, cfg.ul_floor_fraction)
    }

    fn snapshot(dl: f64, ul: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([
            (METRIC_THP_DL.to_string(), dl),
            (METRIC_THP_UL.to_string(), ul),
        ])
    }

    #[test]
    fn test_unknown_type_never_violates() {
        let monitor = monitor();
        let entity = EntityId::ue("0");
        assert!(!monitor.check_violation(&entity, TrafficType::Unknown, &snapshot(0.0, 0.0)));
        assert_eq!(monitor.violations(&entity), 0);
    }

    #[test]
    fn test_violation_increments_once_per_sample() {
        let monitor = monitor();
        let entity = EntityId::ue("0");
        // Gaming floor: DL < 0.5, UL < 0.3. Both below floor, DL wins; the
        // counter moves by exactly one.
        assert!(monitor.check_violation(&entity, TrafficType::Gaming, &snapshot(0.1, 0.05)));
        assert_eq!(monitor.violations(&entity), 1);
        assert!(monitor.check_violation(&entity, TrafficType::Gaming, &snapshot(0.1, 0.05)));
        assert_eq!(monitor.violations(&entity), 2);
    }

    #[test]
    fn test_uplink_checked_when_downlink_healthy() {
        let monitor = monitor();
        let entity = EntityId::ue("0");
        // Gaming: DL 0.8 clears the 0.5 floor, UL 0.1 misses the 0.3 floor.
        assert!(monitor.check_violation(&entity, TrafficType::Gaming, &snapshot(0.8, 0.1)));
        assert_eq!(monitor.violations(&entity), 1);
    }

    #[test]
    fn test_healthy_sample_leaves_counter_untouched() {
        let monitor = monitor();
        let entity = EntityId::ue("0");
        assert!(!monitor.check_violation(&entity, TrafficType::Gaming, &snapshot(0.8, 0.5)));
        assert_eq!(monitor.violations(&entity), 0);
    }

    #[test]
    fn test_missing_metrics_skip_sub_checks() {
        let monitor = monitor();
        let entity = EntityId::ue("0");
        let empty = BTreeMap::new();
        assert!(!monitor.check_violation(&entity, TrafficType::Voice, &empty));

        // Only UL present and below the voice floor (0.1 * 0.3 = 0.03).
        let ul_only = BTreeMap::from([(METRIC_THP_UL.to_string(), 0.01)]);
        assert!(monitor.check_violation(&entity, TrafficType::Voice, &ul_only));
    }

    #[test]
    fn test_reset_zeroes_counter() {
        let monitor = monitor();
        let entity = EntityId::ue("0");
        for _ in 0..4 {
            monitor.check_violation(&entity, TrafficType::Voice, &snapshot(0.01, 0.001));
        }
        assert_eq!(monitor.violations(&entity), 4);
        monitor.reset_violations(&entity);
        assert_eq!(monitor.violations(&entity), 0);
    }

    #[test]
    fn test_priority_lookup() {
        let monitor = monitor();
        assert_eq!(monitor.priority(TrafficType::Voice), 1);
        assert_eq!(monitor.priority(TrafficType::FileTransfer), 4);
        assert_eq!(monitor.priority(TrafficType::Unknown), UNPROFILED_PRIORITY);
    }
}
