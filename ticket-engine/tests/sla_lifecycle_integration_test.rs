//! End-to-end lifecycle tests against the in-memory store.
//!
//! Time is driven by a ManualClock so SLA deadlines can be crossed
//! deterministically.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use ticket_engine::events::EventBusResult;
use ticket_engine::store::StoreResult;
use ticket_engine::{
    Category, EngineConfig, EngineError, EventSink, ManualClock, MemoryTicketStore, NewTicket,
    Priority, QueueEligibility, QueueQuery, SlaPolicyTable, SlaViolation, StoreError,
    TicketEvent, TicketFilter, TicketId, TicketRecord, TicketService, TicketStatus, TicketStore,
    ViolationFilter, ViolationType,
};
use uuid::Uuid;

/// Event sink that records everything it is handed.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<TicketEvent>>,
}

impl RecordingSink {
    fn of_type(&self, event_type: &str) -> Vec<TicketEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: TicketEvent) -> EventBusResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

struct Harness {
    service: Arc<TicketService>,
    store: Arc<MemoryTicketStore>,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 6, 14, 0, 0).unwrap()
}

fn harness_with(config: EngineConfig) -> Harness {
    let store = MemoryTicketStore::new().shared();
    let clock = ManualClock::shared(t0());
    let sink = Arc::new(RecordingSink::default());
    let service = Arc::new(TicketService::from_config(
        store.clone(),
        sink.clone(),
        clock.clone(),
        config,
    ));
    Harness {
        service,
        store,
        clock,
        sink,
    }
}

fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

fn ticket(priority: Priority) -> NewTicket {
    NewTicket::new(Uuid::new_v4(), "Inventory items vanished")
        .with_category(Category::Gameplay)
        .with_priority(priority)
}

#[tokio::test]
async fn test_targets_are_exact_for_every_priority() {
    let h = harness();
    let policies = SlaPolicyTable::default();

    for priority in Priority::all() {
        let view = h.service.create_ticket(ticket(*priority)).await.unwrap();
        let policy = policies.lookup(*priority).unwrap();
        assert_eq!(
            view.sla.first_response_target,
            view.ticket.created_at + policy.first_response()
        );
        assert_eq!(
            view.sla.resolution_target,
            view.ticket.created_at + policy.resolution()
        );
    }
}

#[tokio::test]
async fn test_fresh_urgent_ticket_has_time_left() {
    let h = harness();
    let view = h.service.create_ticket(ticket(Priority::Urgent)).await.unwrap();

    h.clock.advance(TimeDelta::milliseconds(1));
    let sla = h.service.sla_status(view.ticket.id).await.unwrap();
    assert!(sla.time_remaining_to_first_response > 0);
    assert!(sla.time_remaining_to_first_response <= 900);
}

#[tokio::test]
async fn test_late_first_response_records_one_violation() {
    let h = harness();
    let id = h.service.create_ticket(ticket(Priority::High)).await.unwrap().ticket.id;

    h.clock.advance(TimeDelta::minutes(45));
    let view = h.service.record_first_response(id).await.unwrap();
    assert_eq!(view.sla.first_response_met, Some(false));

    // Repeated reads and writes never add a second record
    for _ in 0..3 {
        h.service.get_ticket(id).await.unwrap();
        h.service.record_first_response(id).await.unwrap();
    }

    let violations = h.store.violations_for(id).await.unwrap();
    assert_eq!(violations.len(), 1);
    let violation = &violations[0];
    assert_eq!(violation.violation_type, ViolationType::FirstResponse);
    assert_eq!(violation.violation_duration, 900);
    assert_eq!(violation.priority, Priority::High);
    assert_eq!(violation.target_time, t0() + TimeDelta::minutes(30));
    assert_eq!(violation.actual_time, t0() + TimeDelta::minutes(45));

    assert_eq!(h.sink.of_type("ticket.sla_violated").len(), 1);
}

#[tokio::test]
async fn test_on_time_resolution_has_no_violation() {
    let h = harness();
    let id = h.service.create_ticket(ticket(Priority::Normal)).await.unwrap().ticket.id;

    h.service.assign_agent(id, Uuid::new_v4()).await.unwrap();
    h.service.start_work(id).await.unwrap();
    h.clock.advance(TimeDelta::hours(10));
    let view = h.service.resolve(id).await.unwrap();

    assert_eq!(view.ticket.status, TicketStatus::Resolved);
    assert_eq!(view.sla.resolution_met, Some(true));
    assert_eq!(view.ticket.resolved_at, Some(t0() + TimeDelta::hours(10)));
    assert!(view.ticket.closed_at.is_some());
    assert!(h.store.violations_for(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_late_resolution_is_recorded() {
    let h = harness();
    let id = h.service.create_ticket(ticket(Priority::Urgent)).await.unwrap().ticket.id;
    h.service.assign_agent(id, Uuid::new_v4()).await.unwrap();

    h.clock.advance(TimeDelta::minutes(90));
    h.service.resolve(id).await.unwrap();

    let page = h
        .service
        .list_violations(
            &ViolationFilter::default().kind(ViolationType::Resolution),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].violation_duration, 30 * 60);
}

#[tokio::test]
async fn test_met_at_exact_deadline() {
    let h = harness();
    let id = h.service.create_ticket(ticket(Priority::Low)).await.unwrap().ticket.id;

    h.clock.advance(TimeDelta::hours(4));
    let view = h.service.record_first_response(id).await.unwrap();
    assert_eq!(view.sla.first_response_met, Some(true));
    assert_eq!(view.sla.time_remaining_to_first_response, 0);
}

#[tokio::test]
async fn test_illegal_transition_leaves_ticket_untouched() {
    let h = harness();
    let created = h.service.create_ticket(ticket(Priority::Normal)).await.unwrap();
    let id = created.ticket.id;

    h.clock.advance(TimeDelta::minutes(7));
    let err = h.service.start_work(id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    let after = h.service.get_ticket(id).await.unwrap();
    assert_eq!(after.ticket.status, TicketStatus::Open);
    assert_eq!(after.ticket.updated_at, created.ticket.updated_at);
    assert!(h.sink.of_type("ticket.status_changed").is_empty());
}

#[tokio::test]
async fn test_cancelling_terminal_tickets_is_rejected() {
    let h = harness();

    let cancelled = h.service.create_ticket(ticket(Priority::Low)).await.unwrap().ticket.id;
    h.service.cancel(cancelled).await.unwrap();

    let closed = h.service.create_ticket(ticket(Priority::Low)).await.unwrap().ticket.id;
    h.service.assign_agent(closed, Uuid::new_v4()).await.unwrap();
    h.service.resolve(closed).await.unwrap();
    h.service.close(closed).await.unwrap();

    for id in [cancelled, closed] {
        let before = h.service.get_ticket(id).await.unwrap();
        h.clock.advance(TimeDelta::minutes(1));
        let err = h.service.cancel(id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        let after = h.service.get_ticket(id).await.unwrap();
        assert_eq!(after.ticket, before.ticket);
    }
}

#[tokio::test]
async fn test_concurrent_assignment_has_one_winner() {
    let h = harness();
    let id = h.service.create_ticket(ticket(Priority::High)).await.unwrap().ticket.id;
    let first_agent = Uuid::new_v4();
    let second_agent = Uuid::new_v4();

    let a = {
        let service = h.service.clone();
        tokio::spawn(async move { service.assign_agent(id, first_agent).await })
    };
    let b = {
        let service = h.service.clone();
        tokio::spawn(async move { service.assign_agent(id, second_agent).await })
    };
    let (a, b) = futures::future::join(a, b).await;
    let results = [a.unwrap(), b.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, EngineError::InvalidTransition { .. }));

    let stored = h.service.get_ticket(id).await.unwrap();
    assert_eq!(stored.ticket.status, TicketStatus::Assigned);
    assert_eq!(stored.ticket.agent_id, winners[0].ticket.agent_id);
    assert_eq!(h.sink.of_type("ticket.status_changed").len(), 1);
}

#[tokio::test]
async fn test_queue_orders_by_priority_then_age() {
    let h = harness();
    let mut ids = Vec::new();
    for priority in [
        Priority::Low,
        Priority::High,
        Priority::Normal,
        Priority::Urgent,
        Priority::High,
        Priority::Critical,
    ] {
        let id = h.service.create_ticket(ticket(priority)).await.unwrap().ticket.id;
        ids.push((priority, id));
        h.clock.advance(TimeDelta::seconds(30));
    }
    // A ticket already being worked is not waiting
    let busy = h.service.create_ticket(ticket(Priority::Critical)).await.unwrap().ticket.id;
    h.service.assign_agent(busy, Uuid::new_v4()).await.unwrap();
    h.service.start_work(busy).await.unwrap();

    let view = h.service.get_queue(QueueQuery::default()).await.unwrap();
    let order: Vec<Uuid> = view.tickets.items.iter().map(|t| t.id).collect();
    let expected = vec![ids[3].1, ids[5].1, ids[1].1, ids[4].1, ids[2].1, ids[0].1];
    assert_eq!(order, expected);

    assert_eq!(view.stats.total_waiting, 6);
    assert_eq!(view.stats.high, 2);
    assert_eq!(view.stats.critical, 1);
    assert_eq!(h.service.queue_stats().await.unwrap(), view.stats);
}

#[tokio::test]
async fn test_queue_eligibility_is_configurable() {
    let mut config = EngineConfig::default();
    config.queue.eligibility = QueueEligibility::OpenOnly;
    let h = harness_with(config);

    let open = h.service.create_ticket(ticket(Priority::Normal)).await.unwrap().ticket.id;
    let assigned = h.service.create_ticket(ticket(Priority::Normal)).await.unwrap().ticket.id;
    h.service.assign_agent(assigned, Uuid::new_v4()).await.unwrap();

    let view = h.service.get_queue(QueueQuery::default()).await.unwrap();
    assert_eq!(view.stats.total_waiting, 1);
    assert_eq!(view.tickets.items[0].id, open);

    let default = harness();
    let a = default.service.create_ticket(ticket(Priority::Normal)).await.unwrap().ticket.id;
    default.service.assign_agent(a, Uuid::new_v4()).await.unwrap();
    assert_eq!(default.service.queue_stats().await.unwrap().total_waiting, 1);
}

#[tokio::test]
async fn test_list_tickets_filters_and_orders_newest_first() {
    let h = harness();
    let agent = Uuid::new_v4();
    let older = h.service.create_ticket(ticket(Priority::High)).await.unwrap().ticket.id;
    h.clock.advance(TimeDelta::minutes(1));
    let newer = h.service.create_ticket(ticket(Priority::High)).await.unwrap().ticket.id;
    h.service.create_ticket(ticket(Priority::Low)).await.unwrap();
    h.service.assign_agent(older, agent).await.unwrap();

    let high = h
        .service
        .list_tickets(&TicketFilter::default().priority(Priority::High), None, None)
        .await
        .unwrap();
    let ids: Vec<Uuid> = high.items.iter().map(|v| v.ticket.id).collect();
    assert_eq!(ids, vec![newer, older]);

    let mine = h
        .service
        .list_tickets(&TicketFilter::default().agent(agent), None, None)
        .await
        .unwrap();
    assert_eq!(mine.total, 1);
    assert_eq!(mine.items[0].ticket.id, older);
}

#[tokio::test]
async fn test_compliance_report_summarises_outcomes() {
    let h = harness();
    let on_time = h.service.create_ticket(ticket(Priority::High)).await.unwrap().ticket.id;
    let late = h.service.create_ticket(ticket(Priority::High)).await.unwrap().ticket.id;
    h.service.create_ticket(ticket(Priority::Low)).await.unwrap();

    h.clock.advance(TimeDelta::minutes(20));
    h.service.record_first_response(on_time).await.unwrap();
    h.clock.advance(TimeDelta::minutes(20));
    h.service.record_first_response(late).await.unwrap();

    let report = h.service.compliance_report().await.unwrap();
    assert_eq!(report.overall.total_tickets, 3);
    assert_eq!(report.violations, 1);
    let high = &report.by_priority[&Priority::High];
    assert_eq!(high.first_response.measured, 2);
    assert_eq!(high.first_response.met, 1);
    assert_eq!(high.first_response.breached, 1);
    assert_eq!(high.first_response.compliance_rate, Some(50.0));
}

/// Store where another writer always commits first
struct ConflictingStore {
    inner: Arc<MemoryTicketStore>,
}

#[async_trait]
impl TicketStore for ConflictingStore {
    async fn create(&self, record: &TicketRecord) -> StoreResult<()> {
        self.inner.create(record).await
    }

    async fn get(&self, id: TicketId) -> StoreResult<Option<TicketRecord>> {
        self.inner.get(id).await
    }

    async fn update(&self, record: &TicketRecord, expected_version: u64) -> StoreResult<()> {
        Err(StoreError::VersionConflict {
            key: format!("ticket:{}", record.id()),
            expected: expected_version,
            found: expected_version + 1,
        })
    }

    async fn list(&self, filter: &TicketFilter) -> StoreResult<Vec<TicketRecord>> {
        self.inner.list(filter).await
    }

    async fn insert_violation(&self, violation: &SlaViolation) -> StoreResult<()> {
        self.inner.insert_violation(violation).await
    }

    async fn list_violations(&self, filter: &ViolationFilter) -> StoreResult<Vec<SlaViolation>> {
        self.inner.list_violations(filter).await
    }
}

#[tokio::test]
async fn test_version_conflict_is_retryable_and_commits_nothing() {
    let inner = MemoryTicketStore::new().shared();
    let clock = ManualClock::shared(t0());
    let sink = Arc::new(RecordingSink::default());
    let service = TicketService::from_config(
        Arc::new(ConflictingStore {
            inner: inner.clone(),
        }),
        sink.clone(),
        clock.clone(),
        EngineConfig::default(),
    );
    let id = service
        .create_ticket(ticket(Priority::High))
        .await
        .unwrap()
        .ticket
        .id;

    // Late enough that a committed response would be a violation
    clock.advance(TimeDelta::minutes(45));
    let err = service.record_first_response(id).await.unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable { .. }));
    assert!(err.is_retryable());

    let err = service.assign_agent(id, Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.code(), "STORE_UNAVAILABLE");

    assert!(sink.events.lock().unwrap().is_empty());
    assert!(inner.violations_for(id).await.unwrap().is_empty());

    let stored = inner.get(id).await.unwrap().unwrap();
    assert_eq!(stored.version, 0);
    assert_eq!(stored.ticket.status, TicketStatus::Open);
    assert!(stored.sla.first_response_actual.is_none());
}
