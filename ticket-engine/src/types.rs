//! Core ticket types
//!
//! These types are persisted by the ticket store and returned to callers.
//! Stored shapes avoid `skip_serializing_if` and internally tagged enums so
//! they round-trip through non-self-describing encodings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::sla::SlaStatus;

/// Ticket identifier
pub type TicketId = Uuid;

/// Support agent identifier
pub type AgentId = Uuid;

/// Priority tier, driving both SLA durations and queue rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
    Critical,
}

impl Priority {
    /// Queue rank: lower is served first. Urgent and critical share a tier.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Urgent | Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        }
    }

    /// All priorities, highest first
    pub fn all() -> &'static [Priority] {
        &[
            Priority::Critical,
            Priority::Urgent,
            Priority::High,
            Priority::Normal,
            Priority::Low,
        ]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" | "medium" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            "critical" => Ok(Self::Critical),
            other => Err(EngineError::validation(
                "priority",
                format!("unknown priority '{}'", other),
            )),
        }
    }
}

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Assigned,
    InProgress,
    PendingCustomer,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    /// Closed and cancelled tickets accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    /// Statuses for which `closed_at` must be set
    pub fn is_closed_like(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::PendingCustomer => "pending_customer",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn all() -> &'static [TicketStatus] {
        &[
            TicketStatus::Open,
            TicketStatus::Assigned,
            TicketStatus::InProgress,
            TicketStatus::PendingCustomer,
            TicketStatus::Resolved,
            TicketStatus::Closed,
            TicketStatus::Cancelled,
        ]
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        TicketStatus::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| EngineError::validation("status", format!("unknown status '{}'", s)))
    }
}

/// Ticket category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Account,
    Billing,
    BugReport,
    Gameplay,
    Technical,
    FeatureRequest,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Billing => "billing",
            Self::BugReport => "bug_report",
            Self::Gameplay => "gameplay",
            Self::Technical => "technical",
            Self::FeatureRequest => "feature_request",
            Self::Other => "other",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Account,
            Category::Billing,
            Category::BugReport,
            Category::Gameplay,
            Category::Technical,
            Category::FeatureRequest,
            Category::Other,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::all()
            .iter()
            .copied()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| {
                EngineError::validation("category", format!("unknown category '{}'", s))
            })
    }
}

/// A support ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub requester_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: TicketStatus,
    /// Set on first assignment, never cleared afterwards
    pub agent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Set iff status is resolved, closed or cancelled
    pub closed_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub response_count: u32,
    pub satisfaction_rating: Option<u8>,
    pub rating_comment: Option<String>,
}

impl Ticket {
    /// Build a fresh open ticket from validated input
    pub fn open(input: &NewTicket, category: Category, priority: Priority, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id: input.requester_id,
            title: input.title.trim().to_string(),
            description: input.description.clone(),
            category,
            priority,
            status: TicketStatus::Open,
            agent_id: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            closed_at: None,
            tags: input.tags.clone(),
            response_count: 0,
            satisfaction_rating: None,
            rating_comment: None,
        }
    }

    /// Touch the ticket to update last activity
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Input for creating a ticket. Missing category/priority are inferred.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTicket {
    pub requester_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewTicket {
    pub fn new(requester_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            requester_id,
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Partial update of the mutable ticket fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
    }
}

/// Who wrote a reply on a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    Requester,
    Agent,
    System,
}

/// Metadata of a reply posted to a ticket. Reply content lives elsewhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResponseInput {
    pub author: AuthorKind,
    pub is_internal: bool,
}

impl ResponseInput {
    /// Whether this reply counts as the ticket's first response
    pub fn counts_as_first_response(&self) -> bool {
        self.author == AuthorKind::Agent && !self.is_internal
    }
}

/// Kind of SLA deadline that was breached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    FirstResponse,
    Resolution,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstResponse => "FIRST_RESPONSE",
            Self::Resolution => "RESOLUTION",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "FIRST_RESPONSE" => Ok(Self::FirstResponse),
            "RESOLUTION" => Ok(Self::Resolution),
            _ => Err(EngineError::validation(
                "violation_type",
                format!("unknown violation type '{}'", s),
            )),
        }
    }
}

/// Append-only record of a breached SLA deadline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaViolation {
    pub id: Uuid,
    pub ticket_id: TicketId,
    pub priority: Priority,
    pub violation_type: ViolationType,
    pub target_time: DateTime<Utc>,
    pub actual_time: DateTime<Utc>,
    /// Seconds past the target, always > 0
    pub violation_duration: i64,
    pub detected_at: DateTime<Utc>,
}

/// Ticket together with its live SLA status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketView {
    pub ticket: Ticket,
    pub sla: SlaStatus,
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Slice an already ordered result set. `page` is 1-based.
    pub fn from_ordered(all: Vec<T>, page: usize, limit: usize) -> Self {
        let total = all.len();
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        let offset = page.saturating_sub(1).saturating_mul(limit);
        let items = all.into_iter().skip(offset).take(limit).collect();
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }

    /// Whether more items exist past this page
    pub fn has_more(&self) -> bool {
        self.page.saturating_mul(self.limit) < self.total
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}
