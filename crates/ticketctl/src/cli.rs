//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ticket_engine::{AuthorKind, Category, Priority, TicketStatus, ViolationType};
use uuid::Uuid;

/// Operate the ticket lifecycle and SLA engine against a local state directory
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Engine config file (.toml, .yaml or .yml). Defaults plus environment
    /// overrides when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to RocksDB state directory
    #[arg(long, global = true, default_value = "./ticket-state")]
    pub state_path: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// File a new ticket
    Create {
        #[arg(long)]
        requester: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Inferred from the text when omitted
        #[arg(long)]
        category: Option<Category>,
        /// Inferred from the text when omitted
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Show a ticket with its live SLA status
    Show { id: Uuid },

    /// Edit ticket fields
    Update {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        priority: Option<Priority>,
        /// Replaces all tags
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
    },

    /// Assign an open ticket to an agent
    Assign {
        id: Uuid,
        #[arg(long)]
        agent: Uuid,
    },

    /// Move an assigned ticket to a different agent
    Reassign {
        id: Uuid,
        #[arg(long)]
        agent: Uuid,
    },

    /// Apply a raw status transition
    Status {
        id: Uuid,
        status: TicketStatus,
        #[arg(long)]
        agent: Option<Uuid>,
    },

    /// Count a reply on the ticket
    Respond {
        id: Uuid,
        #[arg(long, value_enum)]
        author: Author,
        /// Internal note, invisible to the requester
        #[arg(long, default_value_t = false)]
        internal: bool,
    },

    /// Record the first response explicitly
    FirstResponse { id: Uuid },

    /// Start working on an assigned ticket
    Start { id: Uuid },

    /// Wait for the requester
    Await { id: Uuid },

    Resolve { id: Uuid },

    Close { id: Uuid },

    Cancel { id: Uuid },

    /// Send a resolved ticket back to work
    Reopen { id: Uuid },

    /// Record a satisfaction rating (1-5)
    Rate {
        id: Uuid,
        rating: u8,
        #[arg(long)]
        comment: Option<String>,
    },

    /// List tickets, newest first
    List {
        #[arg(long = "status")]
        statuses: Vec<TicketStatus>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        agent: Option<Uuid>,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        requester: Option<Uuid>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the work queue
    Queue {
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
        /// Print only per-tier counts
        #[arg(long, default_value_t = false)]
        stats_only: bool,
    },

    /// List recorded SLA violations
    Violations {
        #[arg(long)]
        ticket: Option<Uuid>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        kind: Option<ViolationType>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Open deadlines past their warning threshold
    Alerts,

    /// SLA compliance summary
    Report,

    /// Print the active SLA policy table
    Policy,
}

/// Reply author as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Author {
    Requester,
    Agent,
    System,
}

impl From<Author> for AuthorKind {
    fn from(author: Author) -> Self {
        match author {
            Author::Requester => AuthorKind::Requester,
            Author::Agent => AuthorKind::Agent,
            Author::System => AuthorKind::System,
        }
    }
}
