//! Priority queue over tickets awaiting work
//!
//! There is no stored queue: every read filters the store by the
//! deployment's eligibility rule and sorts by `(rank, created_at, id)`.
//! Urgent and critical share the top rank and are served FIFO together.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{Page, Priority, Ticket};

/// Paging and filtering for a queue read
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueQuery {
    /// 1-based page; defaults to 1
    pub page: Option<usize>,
    /// Page size; defaults to the configured default
    pub limit: Option<usize>,
    /// Narrow the page to one tier. Stats still cover the whole queue.
    pub priority: Option<Priority>,
}

impl QueueQuery {
    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Per-tier counts over the queue-eligible set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_waiting: usize,
    pub critical: usize,
    pub urgent: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl QueueStats {
    pub fn from_tickets<'a>(tickets: impl IntoIterator<Item = &'a Ticket>) -> Self {
        let mut stats = Self::default();
        for ticket in tickets {
            stats.total_waiting += 1;
            match ticket.priority {
                Priority::Critical => stats.critical += 1,
                Priority::Urgent => stats.urgent += 1,
                Priority::High => stats.high += 1,
                Priority::Normal => stats.normal += 1,
                Priority::Low => stats.low += 1,
            }
        }
        stats
    }

    pub fn count(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::Urgent => self.urgent,
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }
}

/// A page of the queue plus stats over everything waiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueView {
    pub tickets: Page<Ticket>,
    pub stats: QueueStats,
}

/// Queue ordering: rank, then oldest first, then id for a total order
pub fn queue_order(a: &Ticket, b: &Ticket) -> Ordering {
    a.priority
        .rank()
        .cmp(&b.priority.rank())
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Build a queue view from the eligible tickets (any order)
pub fn build_view(mut eligible: Vec<Ticket>, query: &QueueQuery, page: usize, limit: usize) -> QueueView {
    let stats = QueueStats::from_tickets(&eligible);
    eligible.sort_by(queue_order);
    if let Some(priority) = query.priority {
        eligible.retain(|ticket| ticket.priority == priority);
    }
    QueueView {
        tickets: Page::from_ordered(eligible, page, limit),
        stats,
    }
}
