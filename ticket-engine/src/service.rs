//! Ticket lifecycle orchestrator
//!
//! `TicketService` is the only entry point callers need. Every mutation
//! follows the same pipeline:
//!
//! 1. take the per-ticket lock
//! 2. load the record and apply the change to a copy
//! 3. recompute SLA fields and persist with a version check
//! 4. run the violation detector and publish events
//!
//! A rejected change returns before step 3, so nothing is written. The
//! per-ticket lock serialises writers inside one process; the store's
//! version check catches writers in other processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::classify;
use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{SharedEventSink, TicketEvent};
use crate::policy::SlaPolicyTable;
use crate::queue::{self, QueueQuery, QueueStats, QueueView};
use crate::report::ComplianceReport;
use crate::sla::{SlaAlert, SlaStatus};
use crate::state_machine::{apply_reassignment, apply_transition, TransitionRecord};
use crate::store::{
    with_deadline, SharedTicketStore, TicketFilter, TicketRecord, ViolationFilter,
};
use crate::types::{
    AgentId, NewTicket, Page, ResponseInput, SlaViolation, Ticket, TicketId, TicketStatus,
    TicketUpdate, TicketView,
};
use crate::violations::ViolationDetector;

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 10_000;
const MAX_TAGS: usize = 20;
const MAX_RATING_COMMENT_CHARS: usize = 2_000;

/// Statuses whose unmet deadlines can still raise alerts
const ALERTABLE: [TicketStatus; 4] = [
    TicketStatus::Open,
    TicketStatus::Assigned,
    TicketStatus::InProgress,
    TicketStatus::PendingCustomer,
];

type TicketLock = Arc<tokio::sync::Mutex<()>>;
type LockRegistry = Mutex<HashMap<TicketId, TicketLock>>;

/// One caller's claim on a ticket's lock registry entry
struct LockLease<'a> {
    locks: &'a LockRegistry,
    id: TicketId,
    lock: TicketLock,
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // The registry and this lease hold the only references
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            locks.remove(&self.id);
        }
    }
}

/// Ticket lifecycle and SLA engine
pub struct TicketService {
    store: SharedTicketStore,
    policies: SlaPolicyTable,
    events: SharedEventSink,
    clock: SharedClock,
    config: EngineConfig,
    detector: ViolationDetector,
    locks: LockRegistry,
}

impl TicketService {
    pub fn new(
        store: SharedTicketStore,
        policies: SlaPolicyTable,
        events: SharedEventSink,
        clock: SharedClock,
        config: EngineConfig,
    ) -> Self {
        let detector = ViolationDetector::new(store.clone(), events.clone(), config.store_timeout());
        Self {
            store,
            policies,
            events,
            clock,
            config,
            detector,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build a service using the policy table carried by `config`
    pub fn from_config(
        store: SharedTicketStore,
        events: SharedEventSink,
        clock: SharedClock,
        config: EngineConfig,
    ) -> Self {
        let policies = config.sla.clone();
        Self::new(store, policies, events, clock, config)
    }

    pub fn policies(&self) -> &SlaPolicyTable {
        &self.policies
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Creation and reads
    // =========================================================================

    /// File a new ticket. Missing category and priority are inferred from
    /// the title and description.
    pub async fn create_ticket(&self, input: NewTicket) -> EngineResult<TicketView> {
        validate_title(&input.title)?;
        validate_description(&input.description)?;
        validate_tags(&input.tags)?;

        let category = input
            .category
            .unwrap_or_else(|| classify::categorize(&input.title, &input.description));
        let priority = input.priority.unwrap_or_else(|| {
            classify::infer_priority(&input.title, &input.description, category)
        });

        let now = self.clock.now();
        let ticket = Ticket::open(&input, category, priority, now);
        let sla = SlaStatus::new(&self.policies, ticket.id, priority, ticket.created_at, now)?;
        let record = TicketRecord::new(ticket, sla);

        with_deadline(self.config.store_timeout(), self.store.create(&record))
            .await
            .map_err(|e| EngineError::from_store("create_ticket", e))?;

        info!(
            ticket_id = %record.id(),
            priority = %priority,
            category = %category,
            "Ticket created"
        );

        Ok(TicketView {
            ticket: record.ticket,
            sla: record.sla,
        })
    }

    /// Ticket with freshly computed SLA remaining times
    pub async fn get_ticket(&self, id: TicketId) -> EngineResult<TicketView> {
        let record = self.load(id, "get_ticket").await?;
        Ok(self.observe(record).await)
    }

    /// SLA status alone
    pub async fn sla_status(&self, id: TicketId) -> EngineResult<SlaStatus> {
        Ok(self.get_ticket(id).await?.sla)
    }

    /// Tickets matching `filter`, newest first
    pub async fn list_tickets(
        &self,
        filter: &TicketFilter,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> EngineResult<Page<TicketView>> {
        let (page, limit) = self.config.queue.page_bounds(page, limit)?;
        let mut records = self.list_records(filter, "list_tickets").await?;
        records.sort_by(|a, b| {
            b.ticket
                .created_at
                .cmp(&a.ticket.created_at)
                .then_with(|| a.id().cmp(&b.id()))
        });

        let page = Page::from_ordered(records, page, limit);
        let mut items = Vec::with_capacity(page.items.len());
        for record in page.items {
            items.push(self.observe(record).await);
        }
        Ok(Page {
            items,
            total: page.total,
            page: page.page,
            limit: page.limit,
            total_pages: page.total_pages,
        })
    }

    /// Recorded violations, oldest detection first
    pub async fn list_violations(
        &self,
        filter: &ViolationFilter,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> EngineResult<Page<SlaViolation>> {
        let (page, limit) = self.config.queue.page_bounds(page, limit)?;
        let violations = with_deadline(
            self.config.store_timeout(),
            self.store.list_violations(filter),
        )
        .await
        .map_err(|e| EngineError::from_store("list_violations", e))?;
        Ok(Page::from_ordered(violations, page, limit))
    }

    // =========================================================================
    // Queue and reporting
    // =========================================================================

    /// Page of tickets awaiting work, in service order
    pub async fn get_queue(&self, query: QueueQuery) -> EngineResult<QueueView> {
        let (page, limit) = self.config.queue.page_bounds(query.page, query.limit)?;
        let eligible = self.eligible_tickets().await?;
        let view = queue::build_view(eligible, &query, page, limit);
        debug!(
            waiting = view.stats.total_waiting,
            page,
            limit,
            "Queue computed"
        );
        Ok(view)
    }

    /// Per-tier counts over the tickets awaiting work
    pub async fn queue_stats(&self) -> EngineResult<QueueStats> {
        let eligible = self.eligible_tickets().await?;
        Ok(QueueStats::from_tickets(&eligible))
    }

    /// Unmet deadlines past their policy's warning threshold, most urgent
    /// first. Nothing is recorded.
    pub async fn sla_alerts(&self) -> EngineResult<Vec<SlaAlert>> {
        let filter = TicketFilter::default().statuses(&ALERTABLE);
        let records = self.list_records(&filter, "sla_alerts").await?;
        let now = self.clock.now();

        let mut alerts = Vec::new();
        for record in &records {
            let policy = self.policies.lookup(record.ticket.priority)?;
            alerts.extend(record.sla.alerts(record.ticket.created_at, &policy, now));
        }
        alerts.sort_by(|a, b| {
            a.time_remaining
                .cmp(&b.time_remaining)
                .then_with(|| a.ticket_id.cmp(&b.ticket_id))
        });
        debug!(active = alerts.len(), "SLA alerts computed");
        Ok(alerts)
    }

    /// Compliance figures across every stored ticket
    pub async fn compliance_report(&self) -> EngineResult<ComplianceReport> {
        let records = self
            .list_records(&TicketFilter::default(), "compliance_report")
            .await?;
        let violations = with_deadline(
            self.config.store_timeout(),
            self.store.list_violations(&ViolationFilter::default()),
        )
        .await
        .map_err(|e| EngineError::from_store("compliance_report", e))?;

        Ok(ComplianceReport::build(
            records.iter().map(|r| (&r.ticket, &r.sla)),
            violations.len(),
            self.clock.now(),
        ))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Edit title, description, category, priority or tags. A priority
    /// change moves both SLA targets; recorded actuals keep their verdicts.
    pub async fn update_ticket(&self, id: TicketId, update: TicketUpdate) -> EngineResult<TicketView> {
        if update.is_empty() {
            return Err(EngineError::validation("update", "no fields to update"));
        }
        if let Some(title) = &update.title {
            validate_title(title)?;
        }
        if let Some(description) = &update.description {
            validate_description(description)?;
        }
        if let Some(tags) = &update.tags {
            validate_tags(tags)?;
        }

        let policies = &self.policies;
        self.mutate(id, "update_ticket", move |record, now| {
            let ticket = &mut record.ticket;
            if ticket.status.is_terminal() {
                return Err(EngineError::invalid_transition(ticket.status, "updated"));
            }
            if let Some(title) = update.title {
                ticket.title = title.trim().to_string();
            }
            if let Some(description) = update.description {
                ticket.description = description;
            }
            if let Some(category) = update.category {
                ticket.category = category;
            }
            if let Some(tags) = update.tags {
                ticket.tags = tags;
            }
            if let Some(priority) = update.priority {
                if priority != ticket.priority {
                    record.sla.retarget(policies, priority, ticket.created_at)?;
                    ticket.priority = priority;
                }
            }
            ticket.touch(now);
            Ok(None)
        })
        .await
    }

    /// Give an open ticket to an agent. Of two concurrent calls on the same
    /// ticket exactly one wins; the other sees `InvalidTransition`.
    pub async fn assign_agent(&self, id: TicketId, agent: AgentId) -> EngineResult<TicketView> {
        self.transition_status(id, TicketStatus::Assigned, Some(agent))
            .await
    }

    /// Hand an already assigned ticket to a different agent
    pub async fn reassign_agent(&self, id: TicketId, agent: AgentId) -> EngineResult<TicketView> {
        self.mutate(id, "reassign_agent", move |record, now| {
            record.ticket = apply_reassignment(&record.ticket, agent, now)?;
            Ok(None)
        })
        .await
    }

    /// Apply any legal status change
    pub async fn transition_status(
        &self,
        id: TicketId,
        to: TicketStatus,
        agent: Option<AgentId>,
    ) -> EngineResult<TicketView> {
        self.mutate(id, "transition_status", move |record, now| {
            let (ticket, transition) = apply_transition(&record.ticket, to, agent, now)?;
            record.ticket = ticket;
            if to == TicketStatus::Resolved {
                record.sla.record_resolution(now);
            }
            Ok(Some(transition))
        })
        .await
    }

    pub async fn start_work(&self, id: TicketId) -> EngineResult<TicketView> {
        self.transition_status(id, TicketStatus::InProgress, None)
            .await
    }

    pub async fn await_customer(&self, id: TicketId) -> EngineResult<TicketView> {
        self.transition_status(id, TicketStatus::PendingCustomer, None)
            .await
    }

    /// Resolve the ticket. Only the first resolution is measured against
    /// the SLA.
    pub async fn resolve(&self, id: TicketId) -> EngineResult<TicketView> {
        self.transition_status(id, TicketStatus::Resolved, None)
            .await
    }

    pub async fn close(&self, id: TicketId) -> EngineResult<TicketView> {
        self.transition_status(id, TicketStatus::Closed, None).await
    }

    pub async fn cancel(&self, id: TicketId) -> EngineResult<TicketView> {
        self.transition_status(id, TicketStatus::Cancelled, None)
            .await
    }

    /// Send a resolved ticket back to work
    pub async fn reopen(&self, id: TicketId) -> EngineResult<TicketView> {
        self.mutate(id, "reopen", |record, now| {
            if record.ticket.status != TicketStatus::Resolved {
                return Err(EngineError::invalid_transition(
                    record.ticket.status,
                    "reopened",
                ));
            }
            let (ticket, transition) =
                apply_transition(&record.ticket, TicketStatus::InProgress, None, now)?;
            record.ticket = ticket;
            Ok(Some(transition))
        })
        .await
    }

    /// Record the first response. Later calls are accepted and change nothing.
    pub async fn record_first_response(&self, id: TicketId) -> EngineResult<TicketView> {
        self.mutate(id, "record_first_response", |record, now| {
            if record.ticket.status.is_terminal() {
                return Err(EngineError::invalid_transition(
                    record.ticket.status,
                    "first_response",
                ));
            }
            record.sla.record_first_response(now);
            Ok(None)
        })
        .await
    }

    /// Count a reply. A public reply from an agent is the first response if
    /// none was recorded yet.
    pub async fn add_response(&self, id: TicketId, response: ResponseInput) -> EngineResult<TicketView> {
        self.mutate(id, "add_response", move |record, now| {
            if record.ticket.status.is_terminal() {
                return Err(EngineError::invalid_transition(
                    record.ticket.status,
                    "responded",
                ));
            }
            record.ticket.response_count = record.ticket.response_count.saturating_add(1);
            record.ticket.touch(now);
            if response.counts_as_first_response() {
                record.sla.record_first_response(now);
            }
            Ok(None)
        })
        .await
    }

    /// Store the requester's satisfaction rating (1 to 5)
    pub async fn rate_ticket(
        &self,
        id: TicketId,
        rating: u8,
        comment: Option<String>,
    ) -> EngineResult<TicketView> {
        if !(1..=5).contains(&rating) {
            return Err(EngineError::validation("rating", "must be between 1 and 5"));
        }
        if let Some(comment) = &comment {
            if comment.chars().count() > MAX_RATING_COMMENT_CHARS {
                return Err(EngineError::validation(
                    "rating_comment",
                    format!("must be at most {} characters", MAX_RATING_COMMENT_CHARS),
                ));
            }
        }

        self.mutate(id, "rate_ticket", move |record, now| {
            let status = record.ticket.status;
            if !matches!(status, TicketStatus::Resolved | TicketStatus::Closed) {
                return Err(EngineError::invalid_transition(status, "rated"));
            }
            record.ticket.satisfaction_rating = Some(rating);
            record.ticket.rating_comment = comment;
            record.ticket.touch(now);
            Ok(None)
        })
        .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Run `apply` against a copy of the stored record and commit it.
    ///
    /// `apply` returns the status transition it performed, if any. A copy
    /// that comes back unchanged is not written.
    async fn mutate<F>(&self, id: TicketId, operation: &'static str, apply: F) -> EngineResult<TicketView>
    where
        F: FnOnce(&mut TicketRecord, DateTime<Utc>) -> EngineResult<Option<TransitionRecord>>,
    {
        let lease = self.lock_for(id);
        let _guard = lease.lock.lock().await;
        self.mutate_locked(id, operation, apply).await
    }

    async fn mutate_locked<F>(
        &self,
        id: TicketId,
        operation: &'static str,
        apply: F,
    ) -> EngineResult<TicketView>
    where
        F: FnOnce(&mut TicketRecord, DateTime<Utc>) -> EngineResult<Option<TransitionRecord>>,
    {
        let stored = self.load(id, operation).await?;
        let now = self.clock.now();

        let mut next = stored.clone();
        let transition = match apply(&mut next, now) {
            Ok(transition) => transition,
            Err(e) => {
                debug!(ticket_id = %id, operation, error = %e, "Mutation rejected");
                return Err(e);
            }
        };

        if next == stored {
            debug!(ticket_id = %id, operation, "No change to persist");
            return Ok(self.observe(stored).await);
        }

        next.version = stored.version + 1;
        with_deadline(
            self.config.store_timeout(),
            self.store.update(&next, stored.version),
        )
        .await
        .map_err(|e| EngineError::from_store(operation, e))?;

        match &transition {
            Some(t) => info!(
                ticket_id = %id,
                operation,
                from = %t.from,
                to = %t.to,
                version = next.version,
                "Ticket status changed"
            ),
            None => info!(ticket_id = %id, operation, version = next.version, "Ticket updated"),
        }

        if let Some(t) = transition {
            self.publish(TicketEvent::status_changed(id, t.from, t.to, t.at));
        }

        Ok(self.observe(next).await)
    }

    /// Refresh remaining times and run the detector for a record about to
    /// be returned. Detection failures are logged; the next read retries.
    async fn observe(&self, record: TicketRecord) -> TicketView {
        let now = self.clock.now();
        let mut sla = record.sla;
        sla.refresh(now);

        if let Err(e) = self.detector.detect(&sla, now).await {
            warn!(ticket_id = %sla.ticket_id, "Violation detection failed: {}", e);
        }

        TicketView {
            ticket: record.ticket,
            sla,
        }
    }

    async fn load(&self, id: TicketId, operation: &'static str) -> EngineResult<TicketRecord> {
        with_deadline(self.config.store_timeout(), self.store.get(id))
            .await
            .map_err(|e| EngineError::from_store(operation, e))?
            .ok_or(EngineError::NotFound { ticket_id: id })
    }

    async fn list_records(
        &self,
        filter: &TicketFilter,
        operation: &'static str,
    ) -> EngineResult<Vec<TicketRecord>> {
        with_deadline(self.config.store_timeout(), self.store.list(filter))
            .await
            .map_err(|e| EngineError::from_store(operation, e))
    }

    async fn eligible_tickets(&self) -> EngineResult<Vec<Ticket>> {
        let filter = TicketFilter::default().statuses(self.config.queue.eligibility.statuses());
        let records = self.list_records(&filter, "get_queue").await?;
        Ok(records.into_iter().map(|r| r.ticket).collect())
    }

    fn publish(&self, event: TicketEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.events.publish(event) {
            warn!(event_type, "Failed to publish event: {}", e);
        }
    }

    /// Lease the per-ticket lock. The registry entry is pruned when the
    /// last lease drops, including when the caller's future is cancelled.
    fn lock_for(&self, id: TicketId) -> LockLease<'_> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let lock = locks.entry(id).or_default().clone();
        LockLease {
            locks: &self.locks,
            id,
            lock,
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

fn validate_title(title: &str) -> EngineResult<()> {
    let title = title.trim();
    if title.is_empty() {
        return Err(EngineError::validation("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(EngineError::validation(
            "title",
            format!("must be at most {} characters", MAX_TITLE_CHARS),
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> EngineResult<()> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(EngineError::validation(
            "description",
            format!("must be at most {} characters", MAX_DESCRIPTION_CHARS),
        ));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> EngineResult<()> {
    if tags.len() > MAX_TAGS {
        return Err(EngineError::validation(
            "tags",
            format!("at most {} tags allowed", MAX_TAGS),
        ));
    }
    if tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(EngineError::validation("tags", "tags must not be blank"));
    }
    Ok(())
}
