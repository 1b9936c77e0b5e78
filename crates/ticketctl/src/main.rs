mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use ticket_engine::{
    EngineConfig, EventBus, NewTicket, QueueQuery, ResponseInput, RocksTicketStore,
    SystemClock, TicketEvent, TicketFilter, TicketService, TicketUpdate, ViolationFilter,
};
use tokio::sync::broadcast;
use tracing::info;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::from_env().context("Invalid engine configuration")?,
    };

    let store = RocksTicketStore::open(&cli.state_path)
        .with_context(|| format!("Failed to open ticket store at {}", cli.state_path.display()))?
        .shared();
    info!(state_path = %cli.state_path.display(), "Ticket store opened");

    let bus = EventBus::new().shared();
    let mut events = bus.subscribe();
    let service = TicketService::from_config(store, bus, Arc::new(SystemClock), config);

    let output = execute(&service, cli.command).await?;
    log_events(&mut events);

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to render output")?
    );
    Ok(())
}

/// Run one subcommand and return its JSON rendering
async fn execute(service: &TicketService, command: Command) -> Result<Value> {
    let value = match command {
        Command::Create {
            requester,
            title,
            description,
            category,
            priority,
            tags,
        } => {
            let mut input = NewTicket::new(requester, title)
                .with_description(description)
                .with_tags(tags);
            input.category = category;
            input.priority = priority;
            to_json(service.create_ticket(input).await?)?
        }
        Command::Show { id } => to_json(service.get_ticket(id).await?)?,
        Command::Update {
            id,
            title,
            description,
            category,
            priority,
            tags,
        } => {
            let update = TicketUpdate {
                title,
                description,
                category,
                priority,
                tags,
            };
            to_json(service.update_ticket(id, update).await?)?
        }
        Command::Assign { id, agent } => to_json(service.assign_agent(id, agent).await?)?,
        Command::Reassign { id, agent } => to_json(service.reassign_agent(id, agent).await?)?,
        Command::Status { id, status, agent } => {
            to_json(service.transition_status(id, status, agent).await?)?
        }
        Command::Respond {
            id,
            author,
            internal,
        } => {
            let response = ResponseInput {
                author: author.into(),
                is_internal: internal,
            };
            to_json(service.add_response(id, response).await?)?
        }
        Command::FirstResponse { id } => to_json(service.record_first_response(id).await?)?,
        Command::Start { id } => to_json(service.start_work(id).await?)?,
        Command::Await { id } => to_json(service.await_customer(id).await?)?,
        Command::Resolve { id } => to_json(service.resolve(id).await?)?,
        Command::Close { id } => to_json(service.close(id).await?)?,
        Command::Cancel { id } => to_json(service.cancel(id).await?)?,
        Command::Reopen { id } => to_json(service.reopen(id).await?)?,
        Command::Rate {
            id,
            rating,
            comment,
        } => to_json(service.rate_ticket(id, rating, comment).await?)?,
        Command::List {
            statuses,
            priority,
            agent,
            category,
            requester,
            page,
            limit,
        } => {
            let filter = TicketFilter {
                statuses,
                priority,
                agent_id: agent,
                category,
                requester_id: requester,
            };
            to_json(service.list_tickets(&filter, page, limit).await?)?
        }
        Command::Queue {
            priority,
            page,
            limit,
            stats_only,
        } => {
            if stats_only {
                to_json(service.queue_stats().await?)?
            } else {
                let query = QueueQuery {
                    page,
                    limit,
                    priority,
                };
                to_json(service.get_queue(query).await?)?
            }
        }
        Command::Violations {
            ticket,
            priority,
            kind,
            page,
            limit,
        } => {
            let filter = ViolationFilter {
                ticket_id: ticket,
                priority,
                violation_type: kind,
            };
            to_json(service.list_violations(&filter, page, limit).await?)?
        }
        Command::Alerts => to_json(service.sla_alerts().await?)?,
        Command::Report => to_json(service.compliance_report().await?)?,
        Command::Policy => to_json(service.policies())?,
    };
    Ok(value)
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize result")
}

/// Log whatever the command emitted; delivery is best-effort
fn log_events(events: &mut broadcast::Receiver<TicketEvent>) {
    while let Ok(event) = events.try_recv() {
        info!(
            event_type = event.event_type(),
            ticket_id = %event.ticket_id(),
            "Event emitted"
        );
    }
}
