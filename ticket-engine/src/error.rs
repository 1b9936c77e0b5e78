//! Engine error types
//!
//! `EngineError` is what callers of [`crate::TicketService`] see. Collaborator
//! failures (`StoreError`) are folded into it at the service boundary so the
//! caller only has to reason about five outcomes: not found, illegal
//! transition, bad input, transient store failure and broken configuration.

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;
use crate::types::Priority;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the ticket lifecycle engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unknown ticket id
    #[error("Ticket not found: {ticket_id}")]
    NotFound { ticket_id: Uuid },

    /// The state machine rejected the requested change; nothing was written
    #[error("Invalid transition: {from} → {to}")]
    InvalidTransition { from: String, to: String },

    /// Malformed input, rejected before any persistence attempt
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    /// Transient collaborator failure (timeout, I/O, version conflict)
    #[error("Ticket store unavailable during {operation}: {reason}")]
    StoreUnavailable { operation: String, reason: String },

    /// No SLA policy configured for a priority
    #[error("No SLA policy configured for priority {priority}")]
    PolicyNotFound { priority: Priority },
}

impl EngineError {
    /// Build a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build an invalid-transition error from anything displayable
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Map a store failure for the named operation
    pub fn from_store(operation: &str, err: StoreError) -> Self {
        Self::StoreUnavailable {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Self::PolicyNotFound { .. } => "POLICY_NOT_FOUND",
        }
    }

    /// Whether the whole operation can be retried as-is.
    ///
    /// Only store failures qualify: mutations are all-or-nothing, so a
    /// retry after `StoreUnavailable` cannot double-apply anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
