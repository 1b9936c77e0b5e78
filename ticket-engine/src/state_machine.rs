//! Ticket State Machine: explicit statuses and legal transition guards.
//!
//! Transitions are computed on a copy of the ticket: a rejected request
//! returns an error and the caller's ticket is untouched, an accepted one
//! returns the updated copy plus a [`TransitionRecord`] for logs and events.
//!
//! ```text
//! open ──assign──▶ assigned ◀──▶ in_progress ◀──▶ pending_customer
//!                     │              │  ▲                │
//!                     └──────────────┼──┼────────────────┘
//!                                    ▼  │ reopen
//!                                  resolved ──▶ closed
//!
//! any non-terminal ──▶ cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::{AgentId, Ticket, TicketStatus};

/// Legal status edges, excluding cancellation which any non-terminal
/// status may take.
fn is_legal_transition(from: TicketStatus, to: TicketStatus) -> bool {
    use TicketStatus::*;

    if to == Cancelled && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Open, Assigned)
            // Work-in-progress toggles
            | (Assigned, InProgress)
            | (InProgress, Assigned)
            | (InProgress, PendingCustomer)
            | (PendingCustomer, InProgress)
            // Resolution from any working state
            | (Assigned, Resolved)
            | (InProgress, Resolved)
            | (PendingCustomer, Resolved)
            // Final closure or reopen
            | (Resolved, Closed)
            | (Resolved, InProgress)
    )
}

/// A single applied status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: TicketStatus,
    pub to: TicketStatus,
    pub at: DateTime<Utc>,
}

impl TransitionRecord {
    /// Whether this transition re-opened a resolved ticket
    pub fn is_reopen(&self) -> bool {
        self.from == TicketStatus::Resolved && self.to == TicketStatus::InProgress
    }
}

/// Validate and apply a status change.
///
/// `agent` is required when leaving `open` for `assigned`. On other edges a
/// supplied agent must match the one already on the ticket; changing agents
/// goes through [`apply_reassignment`].
pub fn apply_transition(
    ticket: &Ticket,
    to: TicketStatus,
    agent: Option<AgentId>,
    now: DateTime<Utc>,
) -> EngineResult<(Ticket, TransitionRecord)> {
    let from = ticket.status;
    if !is_legal_transition(from, to) {
        return Err(EngineError::invalid_transition(from, to));
    }

    let mut next = ticket.clone();
    match (from, to) {
        (TicketStatus::Open, TicketStatus::Assigned) => {
            let agent = agent.ok_or_else(|| {
                EngineError::validation("agent_id", "an agent is required to assign a ticket")
            })?;
            next.agent_id = Some(agent);
        }
        _ => {
            if let (Some(requested), Some(current)) = (agent, ticket.agent_id) {
                if requested != current {
                    return Err(EngineError::validation(
                        "agent_id",
                        "agent differs from the assigned agent; reassign instead",
                    ));
                }
            }
        }
    }

    match to {
        TicketStatus::Resolved => {
            // Only the first entry into resolved is stamped
            if next.resolved_at.is_none() {
                next.resolved_at = Some(now);
            }
            next.closed_at = Some(now);
        }
        TicketStatus::Closed | TicketStatus::Cancelled => {
            next.closed_at = Some(now);
        }
        TicketStatus::InProgress if from == TicketStatus::Resolved => {
            next.resolved_at = None;
            next.closed_at = None;
        }
        _ => {}
    }

    next.status = to;
    next.touch(now);

    tracing::debug!(
        ticket_id = %ticket.id,
        from = %from,
        to = %to,
        "State transition"
    );

    Ok((next, TransitionRecord { from, to, at: now }))
}

/// Hand a ticket to a different agent without changing its status.
///
/// Allowed from any non-terminal status once the ticket has an agent.
pub fn apply_reassignment(
    ticket: &Ticket,
    agent: AgentId,
    now: DateTime<Utc>,
) -> EngineResult<Ticket> {
    if ticket.status.is_terminal() {
        return Err(EngineError::invalid_transition(ticket.status, "reassigned"));
    }
    match ticket.agent_id {
        None => Err(EngineError::invalid_transition(ticket.status, "reassigned")),
        Some(current) if current == agent => Err(EngineError::invalid_transition(
            ticket.status,
            "reassigned to the same agent",
        )),
        Some(_) => {
            let mut next = ticket.clone();
            next.agent_id = Some(agent);
            next.touch(now);
            Ok(next)
        }
    }
}

/// Statuses reachable from `from` (reassignment excluded)
pub fn allowed_targets(from: TicketStatus) -> Vec<TicketStatus> {
    TicketStatus::all()
        .iter()
        .copied()
        .filter(|to| is_legal_transition(from, *to))
        .collect()
}
