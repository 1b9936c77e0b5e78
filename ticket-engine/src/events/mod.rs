//! Ticket notifications
//!
//! The service publishes through the [`EventSink`] trait and never waits on
//! delivery. Two sinks ship with the crate:
//!
//! 1. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub for in-process
//!    subscribers, with [`EventFilter`] for selective receivers.
//!
//! 2. **Null sink**: drops everything, for embedders that do not care.
//!
//! # Usage
//!
//! ```ignore
//! use ticket_engine::events::{EventBus, EventFilter};
//!
//! let bus = EventBus::new().shared();
//! let mut violations = bus.subscribe_filtered(
//!     EventFilter::new().types(vec!["ticket.sla_violated"]),
//! );
//! let service = TicketService::new(store, policies, bus.clone(), clock, config);
//!
//! let event = violations.recv().await?;
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusResult, EventFilter, EventSink, FilteredReceiver, NullSink,
    SharedEventBus, SharedEventSink,
};
pub use types::TicketEvent;

#[cfg(test)]
pub use bus::MockEventSink;
