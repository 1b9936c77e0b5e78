//! SLA policy table: priority → deadline durations
//!
//! The table is configuration: it is deserialised from the engine config and
//! injected into [`crate::TicketService`]. A priority with no entry is a
//! configuration error and is never papered over with a default.

use std::collections::BTreeMap;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::Priority;

/// Fraction of a deadline's window after which an open deadline is flagged
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;

fn default_warning_threshold() -> f64 {
    DEFAULT_WARNING_THRESHOLD
}

/// Deadlines for one priority tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaPolicy {
    /// Time allowed until the first public agent reply
    pub first_response_minutes: i64,
    /// Time allowed until the ticket is resolved
    pub resolution_minutes: i64,
    /// Elapsed share of a window, in (0, 1], at which an alert is raised
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

impl SlaPolicy {
    pub fn new(first_response_minutes: i64, resolution_minutes: i64) -> Self {
        Self {
            first_response_minutes,
            resolution_minutes,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }

    pub fn with_warning_threshold(mut self, warning_threshold: f64) -> Self {
        self.warning_threshold = warning_threshold;
        self
    }

    pub fn first_response(&self) -> TimeDelta {
        TimeDelta::minutes(self.first_response_minutes)
    }

    pub fn resolution(&self) -> TimeDelta {
        TimeDelta::minutes(self.resolution_minutes)
    }
}

/// Priority → policy mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlaPolicyTable {
    policies: BTreeMap<Priority, SlaPolicy>,
}

impl SlaPolicyTable {
    /// Empty table; every lookup fails until policies are inserted
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    /// Set the policy for a priority
    pub fn with_policy(mut self, priority: Priority, policy: SlaPolicy) -> Self {
        self.policies.insert(priority, policy);
        self
    }

    pub fn insert(&mut self, priority: Priority, policy: SlaPolicy) {
        self.policies.insert(priority, policy);
    }

    /// Look up the policy for a priority
    pub fn lookup(&self, priority: Priority) -> EngineResult<SlaPolicy> {
        self.policies
            .get(&priority)
            .copied()
            .ok_or(EngineError::PolicyNotFound { priority })
    }

    /// Check that every priority has a policy with positive durations and
    /// a warning threshold in (0, 1].
    ///
    /// Run once at startup so a broken deployment fails before it serves
    /// a single ticket.
    pub fn ensure_complete(&self) -> EngineResult<()> {
        for priority in Priority::all() {
            let policy = self.lookup(*priority)?;
            if policy.first_response_minutes <= 0 || policy.resolution_minutes <= 0 {
                return Err(EngineError::validation(
                    format!("sla.{}", priority),
                    "durations must be positive",
                ));
            }
            let threshold = policy.warning_threshold;
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(EngineError::validation(
                    format!("sla.{}.warning_threshold", priority),
                    format!("must be in (0, 1], got {}", threshold),
                ));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Priority, &SlaPolicy)> {
        self.policies.iter()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for SlaPolicyTable {
    /// Reference values: urgent/critical 15m/1h, high 30m/4h, normal 1h/24h, low 4h/72h
    fn default() -> Self {
        Self::empty()
            .with_policy(Priority::Critical, SlaPolicy::new(15, 60))
            .with_policy(Priority::Urgent, SlaPolicy::new(15, 60))
            .with_policy(Priority::High, SlaPolicy::new(30, 4 * 60))
            .with_policy(Priority::Normal, SlaPolicy::new(60, 24 * 60))
            .with_policy(Priority::Low, SlaPolicy::new(4 * 60, 72 * 60))
    }
}
