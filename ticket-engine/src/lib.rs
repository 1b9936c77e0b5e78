//! Ticket Engine Library
//!
//! This library provides:
//! - A ticket state machine with explicit, guarded status transitions
//! - Priority-driven SLA deadlines for first response and resolution
//! - Idempotent recording of deadline breaches
//! - A live priority queue of tickets awaiting work
//!
//! # Components
//!
//! ## Core
//! - [`policy`]: priority → SLA durations, loaded from configuration
//! - [`sla`]: deadline arithmetic (targets, remaining time, met check,
//!   warning-threshold alerts)
//! - [`state_machine`]: legal transitions and timestamp stamping
//! - [`violations`]: breach detection with per-(ticket, type) uniqueness
//! - [`queue`]: ordering, eligibility and per-tier stats
//! - [`service`]: [`TicketService`], the orchestrator callers talk to
//!
//! ## Collaborators
//! - [`store`]: `TicketStore` trait with in-memory and RocksDB (`persistent`
//!   feature) implementations
//! - [`events`]: `EventSink` trait with a broadcast `EventBus`
//! - [`clock`]: injectable time source
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use ticket_engine::{EngineConfig, MemoryTicketStore, NewTicket, NullSink, SystemClock, TicketService};
//!
//! let service = TicketService::from_config(
//!     MemoryTicketStore::new().shared(),
//!     Arc::new(NullSink),
//!     Arc::new(SystemClock),
//!     EngineConfig::default(),
//! );
//! let view = service.create_ticket(NewTicket::new(requester, "Cannot log in")).await?;
//! service.assign_agent(view.ticket.id, agent).await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod policy;
pub mod queue;
pub mod report;
pub mod service;
pub mod sla;
pub mod state_machine;
pub mod store;
pub mod types;
pub mod violations;

// Re-export key types
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigError, EngineConfig, QueueConfig, QueueEligibility};
pub use error::{EngineError, EngineResult};
pub use events::{EventBus, EventFilter, EventSink, NullSink, SharedEventSink, TicketEvent};
pub use policy::{SlaPolicy, SlaPolicyTable};
pub use queue::{QueueQuery, QueueStats, QueueView};
pub use report::{ComplianceReport, DeadlineCompliance, PriorityCompliance};
pub use service::TicketService;
pub use sla::{AlertKind, SlaAlert, SlaStatus};
pub use state_machine::TransitionRecord;
pub use store::{
    MemoryTicketStore, SharedTicketStore, StoreError, TicketFilter, TicketRecord, TicketStore,
    ViolationFilter,
};
#[cfg(feature = "persistent")]
pub use store::RocksTicketStore;
pub use types::{
    AgentId, AuthorKind, Category, NewTicket, Page, Priority, ResponseInput, SlaViolation, Ticket,
    TicketId, TicketStatus, TicketUpdate, TicketView, ViolationType,
};
pub use violations::ViolationDetector;
