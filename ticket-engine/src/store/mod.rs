//! Ticket store collaborator
//!
//! The engine talks to persistence only through the [`TicketStore`] trait:
//! versioned ticket records (ticket + SLA status) and an append-only
//! violation log with a uniqueness constraint on (ticket, violation type).
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryTicketStore`]: in-process maps, used by tests and embedders
//! - `RocksTicketStore` (feature `persistent`): RocksDB column families
//!
//! # Usage
//!
//! ```ignore
//! use ticket_engine::store::{MemoryTicketStore, TicketFilter};
//!
//! let store = MemoryTicketStore::new().shared();
//! let open = store.list(&TicketFilter::default().status(TicketStatus::Open)).await?;
//! ```

pub mod memory;
#[cfg(feature = "persistent")]
pub mod rocks;
#[cfg(feature = "persistent")]
pub mod schema;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sla::SlaStatus;
use crate::types::{
    AgentId, Category, Priority, SlaViolation, Ticket, TicketId, TicketStatus, ViolationType,
};

pub use memory::MemoryTicketStore;
#[cfg(feature = "persistent")]
pub use rocks::RocksTicketStore;

/// Error type for ticket store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[cfg(feature = "persistent")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Version conflict on {key}: expected {expected}, found {found}")]
    VersionConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("Timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Store task failed: {0}")]
    Task(String),

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

/// Result type for ticket store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a ticket store
pub type SharedTicketStore = Arc<dyn TicketStore>;

/// A ticket with its SLA status and optimistic-concurrency version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub ticket: Ticket,
    pub sla: SlaStatus,
    /// Bumped by one on every successful update
    pub version: u64,
}

impl TicketRecord {
    pub fn new(ticket: Ticket, sla: SlaStatus) -> Self {
        Self {
            ticket,
            sla,
            version: 0,
        }
    }

    pub fn id(&self) -> TicketId {
        self.ticket.id
    }
}

/// Filter for ticket queries. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketFilter {
    /// Match any of these statuses; empty matches all
    pub statuses: Vec<TicketStatus>,
    pub priority: Option<Priority>,
    pub agent_id: Option<AgentId>,
    pub category: Option<Category>,
    pub requester_id: Option<Uuid>,
}

impl TicketFilter {
    pub fn status(mut self, status: TicketStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn statuses(mut self, statuses: &[TicketStatus]) -> Self {
        self.statuses.extend_from_slice(statuses);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn requester(mut self, requester_id: Uuid) -> Self {
        self.requester_id = Some(requester_id);
        self
    }

    /// Check if a ticket matches this filter
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&ticket.status) {
            return false;
        }
        if let Some(priority) = self.priority {
            if ticket.priority != priority {
                return false;
            }
        }
        if let Some(agent_id) = self.agent_id {
            if ticket.agent_id != Some(agent_id) {
                return false;
            }
        }
        if let Some(category) = self.category {
            if ticket.category != category {
                return false;
            }
        }
        if let Some(requester_id) = self.requester_id {
            if ticket.requester_id != requester_id {
                return false;
            }
        }
        true
    }
}

/// Filter for violation queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViolationFilter {
    pub ticket_id: Option<TicketId>,
    pub priority: Option<Priority>,
    pub violation_type: Option<ViolationType>,
}

impl ViolationFilter {
    pub fn ticket(mut self, ticket_id: TicketId) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn kind(mut self, violation_type: ViolationType) -> Self {
        self.violation_type = Some(violation_type);
        self
    }

    pub fn matches(&self, violation: &SlaViolation) -> bool {
        self.ticket_id.map_or(true, |id| violation.ticket_id == id)
            && self.priority.map_or(true, |p| violation.priority == p)
            && self
                .violation_type
                .map_or(true, |kind| violation.violation_type == kind)
    }
}

/// Persistence contract consumed by the engine.
///
/// Implementations must make `update` a compare-and-set on `version` and
/// `insert_violation` unique on `(ticket_id, violation_type)`, reporting
/// [`StoreError::VersionConflict`] and [`StoreError::Duplicate`] respectively.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a new record; fails with `Duplicate` if the id exists
    async fn create(&self, record: &TicketRecord) -> StoreResult<()>;

    /// Fetch a record by ticket id
    async fn get(&self, id: TicketId) -> StoreResult<Option<TicketRecord>>;

    /// Replace a record if the stored version equals `expected_version`
    async fn update(&self, record: &TicketRecord, expected_version: u64) -> StoreResult<()>;

    /// All records whose ticket matches the filter, in no particular order
    async fn list(&self, filter: &TicketFilter) -> StoreResult<Vec<TicketRecord>>;

    /// Append a violation; fails with `Duplicate` if one of the same type exists
    async fn insert_violation(&self, violation: &SlaViolation) -> StoreResult<()>;

    /// Violations matching the filter, oldest detection first
    async fn list_violations(&self, filter: &ViolationFilter) -> StoreResult<Vec<SlaViolation>>;

    /// All violations recorded for one ticket
    async fn violations_for(&self, ticket_id: TicketId) -> StoreResult<Vec<SlaViolation>> {
        self.list_violations(&ViolationFilter::default().ticket(ticket_id))
            .await
    }
}

/// Bound a store call by `limit`; expiry becomes [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
