//! Ticket lifecycle events
//!
//! Notifications only: losing one never affects ticket or SLA state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{SlaViolation, TicketId, TicketStatus};

/// Events emitted by the ticket service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicketEvent {
    /// A ticket moved between statuses
    StatusChanged {
        ticket_id: TicketId,
        old: TicketStatus,
        new: TicketStatus,
        timestamp: DateTime<Utc>,
    },

    /// A first-response or resolution deadline breach was recorded
    SlaViolated {
        violation: SlaViolation,
        timestamp: DateTime<Utc>,
    },
}

impl TicketEvent {
    pub fn status_changed(
        ticket_id: TicketId,
        old: TicketStatus,
        new: TicketStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::StatusChanged {
            ticket_id,
            old,
            new,
            timestamp,
        }
    }

    pub fn sla_violated(violation: SlaViolation, timestamp: DateTime<Utc>) -> Self {
        Self::SlaViolated {
            violation,
            timestamp,
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StatusChanged { timestamp, .. } => *timestamp,
            Self::SlaViolated { timestamp, .. } => *timestamp,
        }
    }

    /// Topic name of this event
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "ticket.status_changed",
            Self::SlaViolated { .. } => "ticket.sla_violated",
        }
    }

    /// Ticket this event is about
    pub fn ticket_id(&self) -> TicketId {
        match self {
            Self::StatusChanged { ticket_id, .. } => *ticket_id,
            Self::SlaViolated { violation, .. } => violation.ticket_id,
        }
    }
}
