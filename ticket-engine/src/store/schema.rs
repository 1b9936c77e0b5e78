//! Column family definitions for the RocksDB ticket store

/// Column family for ticket records (ticket + SLA status + version)
pub const CF_TICKETS: &str = "tickets";

/// Column family for the append-only violation log
pub const CF_VIOLATIONS: &str = "violations";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_TICKETS, CF_VIOLATIONS];

/// Key prefixes for compound keys
pub mod keys {
    use crate::types::ViolationType;
    use uuid::Uuid;

    pub const TICKET_PREFIX: &str = "ticket:";
    pub const VIOLATION_PREFIX: &str = "violation:";

    /// Create a ticket key
    pub fn ticket(ticket_id: &Uuid) -> String {
        format!("{}{}", TICKET_PREFIX, ticket_id)
    }

    /// Create a violation key. One key per (ticket, type) is what makes the
    /// violation log unique.
    pub fn violation(ticket_id: &Uuid, kind: ViolationType) -> String {
        format!("{}{}:{}", VIOLATION_PREFIX, ticket_id, kind)
    }
}
