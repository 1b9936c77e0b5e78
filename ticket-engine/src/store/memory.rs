//! In-memory ticket store
//!
//! Keeps records in a `RwLock`-guarded map. Every write runs its check and
//! its mutation under the same write guard, which is what gives `update` its
//! compare-and-set semantics and `insert_violation` its uniqueness.
//!
//! The lock is `tokio::sync::RwLock`: a caller waiting on a contended store
//! yields to the runtime, so the engine's store deadline can fire.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    StoreError, StoreResult, TicketFilter, TicketRecord, TicketStore, ViolationFilter,
};
use crate::types::{SlaViolation, TicketId, ViolationType};

#[derive(Debug, Default)]
struct MemoryState {
    tickets: HashMap<TicketId, TicketRecord>,
    violations: Vec<SlaViolation>,
    violation_keys: HashSet<(TicketId, ViolationType)>,
}

/// In-process ticket store
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    state: RwLock<MemoryState>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of stored tickets
    pub async fn ticket_count(&self) -> usize {
        self.state.read().await.tickets.len()
    }

    /// Hold the write lock for `duration`, starving every other caller
    #[cfg(test)]
    pub(crate) async fn hold_exclusive(&self, duration: std::time::Duration) {
        let _state = self.state.write().await;
        tokio::time::sleep(duration).await;
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn create(&self, record: &TicketRecord) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.tickets.contains_key(&record.id()) {
            return Err(StoreError::Duplicate(format!("ticket:{}", record.id())));
        }
        state.tickets.insert(record.id(), record.clone());
        Ok(())
    }

    async fn get(&self, id: TicketId) -> StoreResult<Option<TicketRecord>> {
        let state = self.state.read().await;
        Ok(state.tickets.get(&id).cloned())
    }

    async fn update(&self, record: &TicketRecord, expected_version: u64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let key = format!("ticket:{}", record.id());
        let stored = state
            .tickets
            .get_mut(&record.id())
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                key,
                expected: expected_version,
                found: stored.version,
            });
        }
        *stored = record.clone();
        Ok(())
    }

    async fn list(&self, filter: &TicketFilter) -> StoreResult<Vec<TicketRecord>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .values()
            .filter(|record| filter.matches(&record.ticket))
            .cloned()
            .collect())
    }

    async fn insert_violation(&self, violation: &SlaViolation) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let key = (violation.ticket_id, violation.violation_type);
        if !state.violation_keys.insert(key) {
            return Err(StoreError::Duplicate(format!(
                "violation:{}:{}",
                violation.ticket_id, violation.violation_type
            )));
        }
        state.violations.push(violation.clone());
        Ok(())
    }

    async fn list_violations(&self, filter: &ViolationFilter) -> StoreResult<Vec<SlaViolation>> {
        let state = self.state.read().await;
        let mut violations: Vec<SlaViolation> = state
            .violations
            .iter()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect();
        violations.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
        Ok(violations)
    }
}
