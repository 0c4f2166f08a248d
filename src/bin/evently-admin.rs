use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evently::config::Config;
use evently::events::{AdminAction, EventService, UpdateEventAdmin};
use evently::stats::{StatsAggregator, StatsQuery};
use evently::storage;

#[derive(Parser)]
#[command(name = "evently-admin")]
#[command(about = "Evently moderation and statistics CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a pending event
    Publish {
        event_id: i64,
    },
    /// Reject a pending event
    Reject {
        event_id: i64,
    },
    /// Create an event category
    Category {
        name: String,
    },
    /// Print hit counts per (app, uri)
    Stats {
        /// Range start in the configured timestamp format
        #[arg(long)]
        start: String,
        /// Range end in the configured timestamp format
        #[arg(long)]
        end: String,
        /// Restrict to these uris
        #[arg(long, value_delimiter = ',')]
        uris: Vec<String>,
        /// Count distinct client addresses
        #[arg(long)]
        unique: bool,
    },
}

async fn moderate(service: &EventService, event_id: i64, action: AdminAction) -> Result<()> {
    let event = service
        .admin_update(
            event_id,
            UpdateEventAdmin {
                state_action: Some(action),
                ..Default::default()
            },
        )
        .await
        .with_context(|| format!("Failed to {action} for event {event_id}"))?;
    println!("✓ Event {} '{}' is now {}", event.id, event.title, event.state);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let format = config.timestamp_format();
    let backends = storage::connect(&config.database).await?;

    match cli.command {
        Commands::Publish { event_id } => {
            let service = EventService::new(backends.events, format);
            moderate(&service, event_id, AdminAction::PublishEvent).await?;
        }
        Commands::Reject { event_id } => {
            let service = EventService::new(backends.events, format);
            moderate(&service, event_id, AdminAction::RejectEvent).await?;
        }
        Commands::Category { name } => {
            let service = EventService::new(backends.events, format);
            let category = service.create_category(&name).await?;
            println!("✓ Created category {} '{}'", category.id, category.name);
        }
        Commands::Stats {
            start,
            end,
            uris,
            unique,
        } => {
            let uris = if uris.is_empty() { None } else { Some(uris) };
            let query = StatsQuery::parse(&start, &end, uris, unique, &format)?;
            let entries = StatsAggregator::new(backends.hits).query(&query).await?;

            if entries.is_empty() {
                println!("No hits in range.");
            } else {
                println!("{:<24} {:<40} {}", "App", "URI", "Hits");
                println!("{}", "-".repeat(72));
                for entry in entries {
                    println!("{:<24} {:<40} {}", entry.app, entry.uri, entry.hits);
                }
            }
        }
    }

    Ok(())
}
