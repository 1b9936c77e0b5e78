//! SLA calculator: deadline arithmetic relative to wall-clock time
//!
//! Everything here is pure: callers pass "now" in explicitly (from the
//! injected [`crate::clock::Clock`]) so results are reproducible in tests.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::policy::{SlaPolicy, SlaPolicyTable};
use crate::types::{Priority, TicketId};

/// Compute `(first_response_target, resolution_target)` for a ticket
pub fn compute_targets(
    policies: &SlaPolicyTable,
    priority: Priority,
    created_at: DateTime<Utc>,
) -> EngineResult<(DateTime<Utc>, DateTime<Utc>)> {
    let policy = policies.lookup(priority)?;
    Ok((
        created_at + policy.first_response(),
        created_at + policy.resolution(),
    ))
}

/// Signed seconds until `target`, rounded up. Zero or negative means overdue.
pub fn compute_remaining(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    ceil_seconds(target - now)
}

/// A deadline is met when the actual instant is at or before the target
pub fn is_met(actual: DateTime<Utc>, target: DateTime<Utc>) -> bool {
    actual <= target
}

/// Seconds by which `actual` overshot `target`, rounded up.
///
/// At least 1 whenever `actual > target`, so a recorded breach never
/// reports a zero duration.
pub fn breach_seconds(actual: DateTime<Utc>, target: DateTime<Utc>) -> i64 {
    ceil_seconds(actual - target)
}

/// Share of the window `created_at..target` used up at `now`. Above 1.0
/// once the target has passed.
pub fn elapsed_ratio(created_at: DateTime<Utc>, target: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let window = (target - created_at).num_milliseconds();
    if window <= 0 {
        return 1.0;
    }
    (now - created_at).num_milliseconds() as f64 / window as f64
}

fn ceil_seconds(delta: TimeDelta) -> i64 {
    let millis = delta.num_milliseconds();
    let whole = millis.div_euclid(1000);
    if millis.rem_euclid(1000) > 0 {
        whole + 1
    } else {
        whole
    }
}

/// Deadline an alert is about, and whether it has already passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    FirstResponseWarning,
    FirstResponseOverdue,
    ResolutionWarning,
    ResolutionOverdue,
}

/// An unmet deadline that has used up its policy's warning share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaAlert {
    pub ticket_id: TicketId,
    pub priority: Priority,
    pub kind: AlertKind,
    pub target: DateTime<Utc>,
    pub elapsed_ratio: f64,
    /// Signed seconds until the target
    pub time_remaining: i64,
}

/// Per-ticket SLA state, persisted alongside the ticket for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaStatus {
    pub ticket_id: TicketId,
    pub priority: Priority,
    pub first_response_target: DateTime<Utc>,
    pub first_response_actual: Option<DateTime<Utc>>,
    pub resolution_target: DateTime<Utc>,
    pub resolution_actual: Option<DateTime<Utc>>,
    /// Immutable once set
    pub first_response_met: Option<bool>,
    /// Immutable once set
    pub resolution_met: Option<bool>,
    /// Recomputed on every read; negative = overdue
    pub time_remaining_to_first_response: i64,
    /// Recomputed on every read; negative = overdue
    pub time_remaining_to_resolution: i64,
}

impl SlaStatus {
    /// Initial SLA state for a ticket created at `created_at`
    pub fn new(
        policies: &SlaPolicyTable,
        ticket_id: TicketId,
        priority: Priority,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let (first_response_target, resolution_target) =
            compute_targets(policies, priority, created_at)?;
        let mut status = Self {
            ticket_id,
            priority,
            first_response_target,
            first_response_actual: None,
            resolution_target,
            resolution_actual: None,
            first_response_met: None,
            resolution_met: None,
            time_remaining_to_first_response: 0,
            time_remaining_to_resolution: 0,
        };
        status.refresh(now);
        Ok(status)
    }

    /// Recompute both remaining-time fields relative to `now`
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        self.time_remaining_to_first_response =
            compute_remaining(self.first_response_target, now);
        self.time_remaining_to_resolution = compute_remaining(self.resolution_target, now);
    }

    /// Recompute targets after a priority change. Recorded actuals and met
    /// flags are left untouched.
    pub fn retarget(
        &mut self,
        policies: &SlaPolicyTable,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let (first_response_target, resolution_target) =
            compute_targets(policies, priority, created_at)?;
        self.priority = priority;
        self.first_response_target = first_response_target;
        self.resolution_target = resolution_target;
        Ok(())
    }

    /// Record the first response. Returns false if one was already recorded.
    pub fn record_first_response(&mut self, at: DateTime<Utc>) -> bool {
        if self.first_response_actual.is_some() {
            return false;
        }
        self.first_response_actual = Some(at);
        if self.first_response_met.is_none() {
            self.first_response_met = Some(is_met(at, self.first_response_target));
        }
        true
    }

    /// Record the resolution. Only the first resolution counts.
    pub fn record_resolution(&mut self, at: DateTime<Utc>) -> bool {
        if self.resolution_actual.is_some() {
            return false;
        }
        self.resolution_actual = Some(at);
        if self.resolution_met.is_none() {
            self.resolution_met = Some(is_met(at, self.resolution_target));
        }
        true
    }

    /// Alerts for deadlines without a recorded actual whose elapsed share
    /// has reached `policy.warning_threshold`
    pub fn alerts(
        &self,
        created_at: DateTime<Utc>,
        policy: &SlaPolicy,
        now: DateTime<Utc>,
    ) -> Vec<SlaAlert> {
        let deadlines = [
            (
                self.first_response_actual,
                self.first_response_target,
                AlertKind::FirstResponseWarning,
                AlertKind::FirstResponseOverdue,
            ),
            (
                self.resolution_actual,
                self.resolution_target,
                AlertKind::ResolutionWarning,
                AlertKind::ResolutionOverdue,
            ),
        ];

        deadlines
            .into_iter()
            .filter(|(actual, ..)| actual.is_none())
            .filter_map(|(_, target, warning, overdue)| {
                let ratio = elapsed_ratio(created_at, target, now);
                if ratio < policy.warning_threshold {
                    return None;
                }
                Some(SlaAlert {
                    ticket_id: self.ticket_id,
                    priority: self.priority,
                    kind: if now > target { overdue } else { warning },
                    target,
                    elapsed_ratio: ratio,
                    time_remaining: compute_remaining(target, now),
                })
            })
            .collect()
    }

    /// Whether either deadline has a recorded breach
    pub fn is_breached(&self) -> bool {
        self.first_response_met == Some(false) || self.resolution_met == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_targets_are_exact_for_every_priority() {
        let policies = SlaPolicyTable::default();
        for priority in Priority::all() {
            let policy = policies.lookup(*priority).unwrap();
            let (first, resolution) = compute_targets(&policies, *priority, t0()).unwrap();
            assert_eq!(first, t0() + policy.first_response());
            assert_eq!(resolution, t0() + policy.resolution());
        }
    }

    #[test]
    fn test_remaining_rounds_up() {
        let target = t0() + TimeDelta::seconds(10);
        assert_eq!(compute_remaining(target, t0()), 10);
        assert_eq!(
            compute_remaining(target, t0() + TimeDelta::milliseconds(500)),
            10
        );
        assert_eq!(compute_remaining(target, target), 0);
        assert_eq!(
            compute_remaining(target, target + TimeDelta::milliseconds(1500)),
            -1
        );
        assert_eq!(compute_remaining(target, target + TimeDelta::minutes(2)), -120);
    }

    #[test]
    fn test_met_includes_equality() {
        assert!(is_met(t0(), t0()));
        assert!(is_met(t0() - TimeDelta::seconds(1), t0()));
        assert!(!is_met(t0() + TimeDelta::milliseconds(1), t0()));
    }

    #[test]
    fn test_breach_seconds_never_zero() {
        assert_eq!(breach_seconds(t0() + TimeDelta::milliseconds(1), t0()), 1);
        assert_eq!(breach_seconds(t0() + TimeDelta::minutes(15), t0()), 900);
    }

    #[test]
    fn test_first_response_recorded_once() {
        let policies = SlaPolicyTable::default();
        let mut sla = SlaStatus::new(&policies, Uuid::new_v4(), Priority::High, t0(), t0()).unwrap();
        assert_eq!(sla.time_remaining_to_first_response, 30 * 60);

        assert!(sla.record_first_response(t0() + TimeDelta::minutes(45)));
        assert_eq!(sla.first_response_met, Some(false));
        assert!(!sla.record_first_response(t0() + TimeDelta::minutes(1)));
        assert_eq!(sla.first_response_actual, Some(t0() + TimeDelta::minutes(45)));
        assert!(sla.is_breached());
    }

    #[test]
    fn test_retarget_keeps_met_flags() {
        let policies = SlaPolicyTable::default();
        let mut sla = SlaStatus::new(&policies, Uuid::new_v4(), Priority::Low, t0(), t0()).unwrap();
        sla.record_first_response(t0() + TimeDelta::minutes(20));
        assert_eq!(sla.first_response_met, Some(true));

        sla.retarget(&policies, Priority::Urgent, t0()).unwrap();
        assert_eq!(sla.priority, Priority::Urgent);
        assert_eq!(sla.first_response_target, t0() + TimeDelta::minutes(15));
        assert_eq!(sla.first_response_met, Some(true));
        assert_eq!(sla.resolution_target, t0() + TimeDelta::hours(1));
    }

    #[test]
    fn test_alerts_follow_warning_threshold() {
        let policies = SlaPolicyTable::default();
        let policy = policies.lookup(Priority::High).unwrap();
        let mut sla = SlaStatus::new(&policies, Uuid::new_v4(), Priority::High, t0(), t0()).unwrap();

        assert!(sla.alerts(t0(), &policy, t0() + TimeDelta::minutes(23)).is_empty());

        let alerts = sla.alerts(t0(), &policy, t0() + TimeDelta::minutes(24));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::FirstResponseWarning);
        assert_eq!(alerts[0].elapsed_ratio, 0.8);
        assert_eq!(alerts[0].time_remaining, 360);

        // Exactly at the target is still a warning
        let alerts = sla.alerts(t0(), &policy, t0() + TimeDelta::minutes(30));
        assert_eq!(alerts[0].kind, AlertKind::FirstResponseWarning);

        let alerts = sla.alerts(t0(), &policy, t0() + TimeDelta::minutes(31));
        assert_eq!(alerts[0].kind, AlertKind::FirstResponseOverdue);
        assert_eq!(alerts[0].time_remaining, -60);

        sla.record_first_response(t0() + TimeDelta::minutes(31));
        let late = t0() + TimeDelta::minutes(200);
        let alerts = sla.alerts(t0(), &policy, late);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::ResolutionWarning);

        let strict = policy.with_warning_threshold(0.9);
        assert!(sla.alerts(t0(), &strict, late).is_empty());
    }
}
