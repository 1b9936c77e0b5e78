//! Violation detector
//!
//! Runs after every SLA status read or write. A breach is recorded at most
//! once per (ticket, type): the store rejects the second insert with
//! `Duplicate`, which the detector treats as "already recorded". Concurrent
//! detectors for the same ticket can therefore race freely.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::events::{SharedEventSink, TicketEvent};
use crate::sla::{breach_seconds, SlaStatus};
use crate::store::{with_deadline, SharedTicketStore, StoreError};
use crate::types::{SlaViolation, ViolationType};

/// Violations implied by an SLA status, whether or not already stored.
///
/// A deadline counts only once its actual instant is recorded and judged
/// late; an overdue but still-unanswered ticket produces nothing yet.
pub fn breaches(sla: &SlaStatus, now: DateTime<Utc>) -> Vec<SlaViolation> {
    let deadlines = [
        (
            ViolationType::FirstResponse,
            sla.first_response_actual,
            sla.first_response_met,
            sla.first_response_target,
        ),
        (
            ViolationType::Resolution,
            sla.resolution_actual,
            sla.resolution_met,
            sla.resolution_target,
        ),
    ];

    deadlines
        .into_iter()
        .filter_map(|(violation_type, actual, met, target)| match (actual, met) {
            (Some(actual), Some(false)) => Some(SlaViolation {
                id: Uuid::new_v4(),
                ticket_id: sla.ticket_id,
                priority: sla.priority,
                violation_type,
                target_time: target,
                actual_time: actual,
                violation_duration: breach_seconds(actual, target).max(1),
                detected_at: now,
            }),
            _ => None,
        })
        .collect()
}

/// Records breaches and announces the new ones
#[derive(Clone)]
pub struct ViolationDetector {
    store: SharedTicketStore,
    events: SharedEventSink,
    store_timeout: Duration,
}

impl ViolationDetector {
    pub fn new(store: SharedTicketStore, events: SharedEventSink, store_timeout: Duration) -> Self {
        Self {
            store,
            events,
            store_timeout,
        }
    }

    /// Record any breach in `sla` not yet stored. Returns only the
    /// violations this call inserted.
    pub async fn detect(&self, sla: &SlaStatus, now: DateTime<Utc>) -> EngineResult<Vec<SlaViolation>> {
        let mut recorded = Vec::new();

        for violation in breaches(sla, now) {
            let insert = self.store.insert_violation(&violation);
            match with_deadline(self.store_timeout, insert).await {
                Ok(()) => {
                    warn!(
                        ticket_id = %violation.ticket_id,
                        priority = %violation.priority,
                        violation_type = %violation.violation_type,
                        overdue_secs = violation.violation_duration,
                        "SLA violation recorded"
                    );
                    if let Err(e) = self
                        .events
                        .publish(TicketEvent::sla_violated(violation.clone(), now))
                    {
                        warn!(ticket_id = %violation.ticket_id, "Failed to publish violation event: {}", e);
                    }
                    recorded.push(violation);
                }
                Err(StoreError::Duplicate(key)) => {
                    debug!(key = %key, "Violation already recorded");
                }
                Err(e) => return Err(EngineError::from_store("insert_violation", e)),
            }
        }

        Ok(recorded)
    }
}
