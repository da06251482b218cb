//! AlertAggregator - Alert Log and Running Counters
//!
//! ## Responsibilities
//!
//! - Keep the ordered alert log (most recent first)
//! - Maintain per-type counters and the running total
//! - Drive the target room's status on every ingested alert
//! - Swap in server-computed batches wholesale
//!
//! The log, the counters, and the room update are applied as one unit:
//! `ingest` is synchronous end to end, so under cooperative scheduling
//! no other task can observe counters advanced without the matching
//! room update or vice versa.

use crate::error::Result;
use crate::models::{Alert, AlertSummary, AlertType};
use crate::room_registry::{RoomId, RoomRegistry, RoomStatus};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Derived aggregate over the alert log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertStats {
    pub total_alerts: u64,
    pub counts: AlertSummary,
}

impl AlertStats {
    /// Count for one category
    pub fn count_for(&self, alert_type: AlertType) -> u64 {
        self.counts.count_for(alert_type)
    }
}

struct AggregatorInner {
    /// Most recent first: log[0] is the newest alert
    log: Vec<Alert>,
    stats: AlertStats,
}

/// AlertAggregator instance
///
/// Exclusive owner of the alert log and derived stats. Room state is
/// only touched through the registry's contract, never directly.
pub struct AlertAggregator {
    inner: RwLock<AggregatorInner>,
    registry: Arc<RoomRegistry>,
}

impl AlertAggregator {
    /// Create a new aggregator bound to a room registry
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            inner: RwLock::new(AggregatorInner {
                log: Vec::new(),
                stats: AlertStats::default(),
            }),
            registry,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AggregatorInner> {
        self.inner.read().expect("aggregator lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, AggregatorInner> {
        self.inner.write().expect("aggregator lock poisoned")
    }

    /// Ingest one live alert for the given room.
    ///
    /// Prepends the alert to the log, bumps the total and the per-type
    /// counter, and applies the severity-derived status (plus the alert
    /// itself as `last_alert`) to the target room. All three effects
    /// land before the call returns, with no suspension point between
    /// them; on an unknown room nothing is mutated at all.
    pub fn ingest(&self, alert: Alert, target_room: RoomId) -> Result<RoomStatus> {
        let mut inner = self.write();

        // Room update first: it is the only fallible step, and a failed
        // ingest must leave the log and counters untouched. The
        // aggregator lock is held across both updates; lock order is
        // always aggregator -> registry.
        let room_status =
            self.registry
                .apply_alert_status(target_room, alert.severity, alert.clone())?;

        inner.stats.total_alerts += 1;
        inner.stats.counts.record(alert.alert_type);

        tracing::debug!(
            room_id = target_room,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            total_alerts = inner.stats.total_alerts,
            "Alert ingested"
        );

        inner.log.insert(0, alert);

        Ok(room_status)
    }

    /// Replace the log and counters wholesale with a processed batch.
    ///
    /// Not a merge: a new analysis supersedes any prior session history.
    /// The total comes from the batch length and the per-type counters
    /// from the server summary, displayed as supplied. Batch order is
    /// preserved verbatim. Room status is not touched here; the upload
    /// pipeline applies its own outcome.
    pub fn replace_all(&self, alerts: Vec<Alert>, summary: AlertSummary) {
        let mut inner = self.write();

        inner.stats = AlertStats {
            total_alerts: alerts.len() as u64,
            counts: summary,
        };
        inner.log = alerts;

        tracing::info!(
            total_alerts = inner.stats.total_alerts,
            "Alert log replaced with processed batch"
        );
    }

    /// Empty the log and zero all counters. Room status is deliberately
    /// left alone; only alert arrival or a new batch changes it.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.log.clear();
        inner.stats = AlertStats::default();

        tracing::info!("Alert log cleared");
    }

    /// Current stats
    pub fn stats(&self) -> AlertStats {
        self.read().stats
    }

    /// Current log, most recent first
    pub fn alerts(&self) -> Vec<Alert> {
        self.read().log.clone()
    }

    /// Number of alerts in the log
    pub fn len(&self) -> usize {
        self.read().log.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.read().log.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertTimestamp, Severity};

    fn alert(alert_type: AlertType, severity: Severity, message: &str) -> Alert {
        Alert {
            alert_type,
            severity,
            timestamp: AlertTimestamp::Elapsed(5.0),
            frame: None,
            confidence: None,
            speed: None,
            distance: None,
            posture_type: None,
            breathing_rate: None,
            status: None,
            message: message.to_string(),
            timestamp_iso: None,
        }
    }

    fn setup() -> (Arc<RoomRegistry>, AlertAggregator) {
        let registry = Arc::new(RoomRegistry::with_default_wards());
        let aggregator = AlertAggregator::new(registry.clone());
        (registry, aggregator)
    }

    /// total == log length == counter sum, checked after every step
    fn assert_invariant(aggregator: &AlertAggregator) {
        let stats = aggregator.stats();
        assert_eq!(stats.total_alerts, aggregator.len() as u64);
        assert_eq!(stats.total_alerts, stats.counts.total());
    }

    #[test]
    fn test_ingest_updates_log_counters_and_room() {
        let (registry, aggregator) = setup();

        let status = aggregator
            .ingest(alert(AlertType::Fall, Severity::High, "Fall detected"), 2)
            .unwrap();

        assert_eq!(status, RoomStatus::Alert);
        assert_eq!(aggregator.stats().total_alerts, 1);
        assert_eq!(aggregator.stats().count_for(AlertType::Fall), 1);

        let room = registry.get(2).unwrap();
        assert_eq!(room.status, RoomStatus::Alert);
        assert_eq!(
            room.last_alert.as_ref().map(|a| a.alert_type),
            Some(AlertType::Fall)
        );
        assert_invariant(&aggregator);
    }

    #[test]
    fn test_counter_invariant_holds_through_ingest_sequence() {
        let (_registry, aggregator) = setup();

        let sequence = [
            (AlertType::Fall, Severity::High),
            (AlertType::RapidMovement, Severity::Medium),
            (AlertType::Seizure, Severity::Critical),
            (AlertType::BedExit, Severity::Low),
            (AlertType::Fall, Severity::Low),
            (AlertType::AbnormalBreathing, Severity::Critical),
        ];

        for (alert_type, severity) in sequence {
            aggregator
                .ingest(alert(alert_type, severity, "event"), 1)
                .unwrap();
            assert_invariant(&aggregator);
        }

        let stats = aggregator.stats();
        assert_eq!(stats.total_alerts, 6);
        assert_eq!(stats.count_for(AlertType::Fall), 2);
        assert_eq!(stats.count_for(AlertType::AbnormalPosture), 0);
    }

    #[test]
    fn test_log_is_most_recent_first() {
        let (_registry, aggregator) = setup();

        aggregator
            .ingest(alert(AlertType::Fall, Severity::High, "A1"), 1)
            .unwrap();
        aggregator
            .ingest(alert(AlertType::Seizure, Severity::Critical, "A2"), 1)
            .unwrap();
        aggregator
            .ingest(alert(AlertType::BedExit, Severity::Medium, "A3"), 1)
            .unwrap();

        let messages: Vec<String> =
            aggregator.alerts().into_iter().map(|a| a.message).collect();
        assert_eq!(messages, vec!["A3", "A2", "A1"]);
    }

    #[test]
    fn test_failed_ingest_mutates_nothing() {
        let (_registry, aggregator) = setup();
        aggregator
            .ingest(alert(AlertType::Fall, Severity::Low, "seed"), 1)
            .unwrap();
        let before_stats = aggregator.stats();
        let before_log = aggregator.alerts();

        let result = aggregator.ingest(alert(AlertType::Fall, Severity::High, "late"), 99);

        assert!(result.is_err());
        assert_eq!(aggregator.stats(), before_stats);
        assert_eq!(aggregator.alerts(), before_log);
    }

    #[test]
    fn test_clear_then_reingest_matches_fresh_aggregator() {
        let (_registry, aggregator) = setup();
        let (_fresh_registry, fresh) = setup();

        aggregator
            .ingest(alert(AlertType::Fall, Severity::High, "old"), 1)
            .unwrap();
        aggregator.clear();
        assert_invariant(&aggregator);

        let replay = [
            (AlertType::Seizure, Severity::Critical),
            (AlertType::RapidMovement, Severity::Low),
            (AlertType::Seizure, Severity::High),
        ];
        for (alert_type, severity) in replay {
            aggregator
                .ingest(alert(alert_type, severity, "event"), 1)
                .unwrap();
            fresh
                .ingest(alert(alert_type, severity, "event"), 1)
                .unwrap();
        }

        assert_eq!(aggregator.stats(), fresh.stats());
        assert_eq!(aggregator.alerts(), fresh.alerts());
    }

    #[test]
    fn test_clear_leaves_room_status_alone() {
        let (registry, aggregator) = setup();
        aggregator
            .ingest(alert(AlertType::Fall, Severity::Critical, "fall"), 3)
            .unwrap();
        assert_eq!(registry.get(3).unwrap().status, RoomStatus::Alert);

        aggregator.clear();

        assert!(aggregator.is_empty());
        assert_eq!(aggregator.stats().total_alerts, 0);
        assert_eq!(registry.get(3).unwrap().status, RoomStatus::Alert);
    }

    #[test]
    fn test_replace_all_is_wholesale() {
        let (_registry, aggregator) = setup();
        aggregator
            .ingest(alert(AlertType::BedExit, Severity::Low, "live"), 1)
            .unwrap();

        let batch = vec![
            alert(AlertType::Fall, Severity::High, "batch fall"),
            alert(AlertType::RapidMovement, Severity::Low, "batch movement"),
        ];
        let summary = AlertSummary {
            fall_count: 1,
            rapid_movement_count: 1,
            ..Default::default()
        };

        aggregator.replace_all(batch, summary);

        let stats = aggregator.stats();
        assert_eq!(stats.total_alerts, 2);
        assert_eq!(stats.count_for(AlertType::Fall), 1);
        // The pre-batch live alert is gone, not merged
        assert_eq!(stats.count_for(AlertType::BedExit), 0);
        assert_eq!(aggregator.alerts()[0].message, "batch fall");
        assert_invariant(&aggregator);
    }

    #[test]
    fn test_replace_all_preserves_batch_order() {
        let (_registry, aggregator) = setup();
        let batch = vec![
            alert(AlertType::Fall, Severity::High, "first"),
            alert(AlertType::Seizure, Severity::Critical, "second"),
        ];

        aggregator.replace_all(batch, AlertSummary::default());

        let messages: Vec<String> =
            aggregator.alerts().into_iter().map(|a| a.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }
}
