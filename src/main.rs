use anyhow::Context;
use clap::{Parser, Subcommand};
use event_aggregator::{
    Aggregator, EventManager, EventPipeline, EventStatus, EventStore, EventbriteSource,
    FetchConfig, PageFetcher,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "event-aggregator",
    about = "Scrapes public event listings and reconciles them into the events database"
)]
struct Cli {
    /// SQLite database location
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite://events.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scrape-and-reconcile pipeline
    Run {
        /// Repeat forever, sleeping this many seconds between runs
        #[arg(long)]
        every: Option<u64>,
    },
    /// List events by lifecycle status
    List {
        /// Statuses to include (defaults to the publicly visible set)
        #[arg(long, value_delimiter = ',', default_values_t = vec![EventStatus::Imported, EventStatus::Updated])]
        status: Vec<EventStatus>,
    },
    /// Mark one event as imported
    Import {
        id: Uuid,
        /// Curator identity stamped on the record
        #[arg(long)]
        by: String,
    },
    /// Mark every event as imported
    ImportAll {
        /// Curator identity stamped on the records
        #[arg(long)]
        by: String,
    },
    /// Backfill the placeholder image onto records missing one
    BackfillImages,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let manager = EventManager::connect(&cli.database_url)
        .await
        .with_context(|| format!("failed to open events database at {}", cli.database_url))?;

    match cli.command {
        Command::Run { every } => {
            let config = FetchConfig::default();
            let fetcher = Arc::new(PageFetcher::new(&config));
            let aggregator = Aggregator::new(Duration::from_secs(config.source_timeout_seconds))
                .with_source(Box::new(EventbriteSource::sydney(fetcher)));
            let pipeline = EventPipeline::new(aggregator, Arc::new(manager));

            loop {
                let summary = pipeline.run().await;
                println!("{}", serde_json::to_string_pretty(&summary)?);

                if summary.failed_writes > 0 {
                    error!("{} record write(s) failed this run", summary.failed_writes);
                }

                match every {
                    Some(seconds) => {
                        info!("Sleeping {}s until the next run", seconds);
                        tokio::time::sleep(Duration::from_secs(seconds)).await;
                    }
                    None => break,
                }
            }
        }
        Command::List { status } => {
            let events = manager.query_by_status(&status).await?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        Command::Import { id, by } => {
            let record = manager.mark_imported(id, &by).await?;
            info!("Imported '{}' ({})", record.title, record.id);
        }
        Command::ImportAll { by } => {
            let count = manager.import_all(&by).await?;
            info!("Imported {} events", count);
        }
        Command::BackfillImages => {
            let count = manager.backfill_images().await?;
            info!("Backfilled images on {} events", count);
        }
    }

    Ok(())
}
