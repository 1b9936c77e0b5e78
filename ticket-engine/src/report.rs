//! SLA compliance summary
//!
//! Built from the stored SLA statuses in one pass. A deadline is "measured"
//! once its actual instant is recorded; open deadlines are not counted as
//! either met or breached.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sla::SlaStatus;
use crate::types::{Priority, Ticket};

/// Counters for one deadline kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadlineCompliance {
    pub measured: usize,
    pub met: usize,
    pub breached: usize,
    /// `met / measured` as a percentage; `None` when nothing was measured
    pub compliance_rate: Option<f64>,
    /// Mean seconds from creation to the actual instant
    pub average_seconds: Option<f64>,
    #[serde(skip)]
    total_seconds: i64,
}

impl DeadlineCompliance {
    fn record(&mut self, created_at: DateTime<Utc>, actual: Option<DateTime<Utc>>, met: Option<bool>) {
        let Some(actual) = actual else {
            return;
        };
        self.measured += 1;
        self.total_seconds += (actual - created_at).num_seconds();
        match met {
            Some(true) => self.met += 1,
            Some(false) => self.breached += 1,
            None => {}
        }
    }

    fn finish(&mut self) {
        if self.measured > 0 {
            let measured = self.measured as f64;
            self.compliance_rate = Some(self.met as f64 / measured * 100.0);
            self.average_seconds = Some(self.total_seconds as f64 / measured);
        }
    }
}

/// Compliance figures for one priority tier (or overall)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityCompliance {
    pub total_tickets: usize,
    pub first_response: DeadlineCompliance,
    pub resolution: DeadlineCompliance,
}

impl PriorityCompliance {
    fn record(&mut self, ticket: &Ticket, sla: &SlaStatus) {
        self.total_tickets += 1;
        self.first_response.record(
            ticket.created_at,
            sla.first_response_actual,
            sla.first_response_met,
        );
        self.resolution
            .record(ticket.created_at, sla.resolution_actual, sla.resolution_met);
    }

    fn finish(&mut self) {
        self.first_response.finish();
        self.resolution.finish();
    }
}

/// Report across every ticket in the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub generated_at: DateTime<Utc>,
    pub overall: PriorityCompliance,
    pub by_priority: BTreeMap<Priority, PriorityCompliance>,
    /// Violations on record
    pub violations: usize,
}

impl ComplianceReport {
    pub fn build<'a>(
        records: impl IntoIterator<Item = (&'a Ticket, &'a SlaStatus)>,
        violations: usize,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut report = Self {
            generated_at,
            violations,
            ..Default::default()
        };
        for (ticket, sla) in records {
            report.overall.record(ticket, sla);
            report
                .by_priority
                .entry(ticket.priority)
                .or_default()
                .record(ticket, sla);
        }
        report.overall.finish();
        for tier in report.by_priority.values_mut() {
            tier.finish();
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SlaPolicyTable;
    use crate::types::{Category, NewTicket};
    use chrono::{TimeDelta, TimeZone};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap()
    }

    fn pair(priority: Priority, first_response_after: Option<i64>) -> (Ticket, SlaStatus) {
        let ticket = Ticket::open(
            &NewTicket::new(Uuid::new_v4(), "Where is my mount"),
            Category::Gameplay,
            priority,
            t0(),
        );
        let mut sla =
            SlaStatus::new(&SlaPolicyTable::default(), ticket.id, priority, t0(), t0()).unwrap();
        if let Some(minutes) = first_response_after {
            sla.record_first_response(t0() + TimeDelta::minutes(minutes));
        }
        (ticket, sla)
    }

    #[test]
    fn test_compliance_rates() {
        let pairs = vec![
            pair(Priority::High, Some(10)),
            pair(Priority::High, Some(45)),
            pair(Priority::High, None),
            pair(Priority::Low, Some(20)),
        ];
        let report = ComplianceReport::build(pairs.iter().map(|(t, s)| (t, s)), 1, t0());

        assert_eq!(report.overall.total_tickets, 4);
        assert_eq!(report.overall.first_response.measured, 3);
        assert_eq!(report.overall.first_response.breached, 1);

        let high = &report.by_priority[&Priority::High];
        assert_eq!(high.total_tickets, 3);
        assert_eq!(high.first_response.met, 1);
        assert_eq!(high.first_response.compliance_rate, Some(50.0));
        assert_eq!(high.first_response.average_seconds, Some(1650.0));
        assert_eq!(high.resolution.compliance_rate, None);
    }

    #[test]
    fn test_empty_report() {
        let report = ComplianceReport::build(std::iter::empty(), 0, t0());
        assert_eq!(report.overall.total_tickets, 0);
        assert!(report.by_priority.is_empty());
        assert_eq!(report.overall.first_response.compliance_rate, None);
    }
}
