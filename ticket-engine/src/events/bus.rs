//! Event bus for ticket notifications
//!
//! Provides pub/sub messaging using Tokio broadcast channels. Delivery is
//! best-effort: slow subscribers lag and publishing with nobody listening
//! is not an error.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::TicketEvent;
use crate::types::TicketId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Outbound notification collaborator of the ticket service
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Hand an event off for delivery. Errors are logged by the caller and
    /// never roll back the operation that produced the event.
    fn publish(&self, event: TicketEvent) -> EventBusResult<()>;
}

/// Shared reference to an event sink
pub type SharedEventSink = Arc<dyn EventSink>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: TicketEvent) -> EventBusResult<()> {
        Ok(())
    }
}

/// In-process event bus over a broadcast channel
pub struct EventBus {
    sender: broadcast::Sender<TicketEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.sender.subscribe()
    }

    /// Subscribe and only receive events matching `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: TicketEvent) -> EventBusResult<()> {
        let event_type = event.event_type();

        // Broadcast to subscribers (ignore if no receivers)
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
            }
        }
        Ok(())
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by ticket ID
    pub ticket_id: Option<TicketId>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by ticket ID
    pub fn ticket(mut self, ticket_id: TicketId) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &TicketEvent) -> bool {
        if let Some(ticket_id) = self.ticket_id {
            if event.ticket_id() != ticket_id {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<TicketEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Create a new filtered receiver
    pub fn new(receiver: broadcast::Receiver<TicketEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event. Events lost to lag are skipped.
    pub async fn recv(&mut self) -> EventBusResult<TicketEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Filtered receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, SlaViolation, TicketStatus, ViolationType};
    use chrono::Utc;
    use uuid::Uuid;

    fn status_event(ticket_id: TicketId) -> TicketEvent {
        TicketEvent::status_changed(
            ticket_id,
            TicketStatus::Assigned,
            TicketStatus::InProgress,
            Utc::now(),
        )
    }

    fn violation_event(ticket_id: TicketId) -> TicketEvent {
        let now = Utc::now();
        TicketEvent::sla_violated(
            SlaViolation {
                id: Uuid::new_v4(),
                ticket_id,
                priority: Priority::High,
                violation_type: ViolationType::FirstResponse,
                target_time: now,
                actual_time: now,
                violation_duration: 900,
                detected_at: now,
            },
            now,
        )
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(status_event(Uuid::new_v4())).unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "ticket.status_changed");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(violation_event(Uuid::new_v4())).unwrap();

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        assert!(bus.publish(status_event(Uuid::new_v4())).is_ok());
        assert!(NullSink.publish(status_event(Uuid::new_v4())).is_ok());
    }

    #[test]
    fn test_event_filter() {
        let target = Uuid::new_v4();
        let filter = EventFilter::new()
            .ticket(target)
            .types(vec!["ticket.sla_violated"]);

        assert!(filter.matches(&violation_event(target)));
        assert!(!filter.matches(&status_event(target)));
        assert!(!filter.matches(&violation_event(Uuid::new_v4())));
        assert!(EventFilter::new().matches(&status_event(Uuid::new_v4())));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let target = Uuid::new_v4();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().ticket(target));

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(status_event(Uuid::new_v4())).unwrap();
            publisher.publish(violation_event(target)).unwrap();
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.ticket_id(), target);
        assert_eq!(event.event_type(), "ticket.sla_violated");
    }

    #[tokio::test]
    async fn test_filtered_receiver_reports_closed_bus() {
        let bus = EventBus::new();
        let target = Uuid::new_v4();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().ticket(target));

        bus.publish(violation_event(target)).unwrap();
        drop(bus);

        assert_eq!(filtered.recv().await.unwrap().ticket_id(), target);
        assert!(matches!(
            filtered.recv().await,
            Err(EventBusError::ChannelClosed)
        ));
    }
}
