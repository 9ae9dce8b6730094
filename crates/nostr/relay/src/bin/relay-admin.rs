//! relay-admin - inspect and load a relay store

use anyhow::{Context, Result};
use clap::Parser;
use nostr::{Admission, Event, Filter, SchemaRegistry, UnknownKindPolicy};
use nostr_relay::{RelayStore, StoreConfig};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "relay-admin")]
#[command(about = "Query, count and import events in a relay store", long_about = None)]
struct Cli {
    /// Database file (defaults to RELAY_DB_PATH, then relay.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Reject kinds that have no validation rule
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print matching events as JSON lines, newest first
    Query {
        /// Filters as JSON objects; matched if any filter matches
        #[arg(required = true)]
        filters: Vec<String>,
    },
    /// Count matching events
    Count {
        #[arg(required = true)]
        filters: Vec<String>,
    },
    /// Print one event by id
    Get { id: String },
    /// Submit newline-delimited events through the normal write path
    Import {
        /// NDJSON file, or "-" for stdin
        path: PathBuf,
    },
    /// Print store statistics as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = StoreConfig::from_env();
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    let policy = if cli.strict {
        UnknownKindPolicy::Reject
    } else {
        UnknownKindPolicy::Accept
    };
    let registry = SchemaRegistry::standard().with_policy(policy);
    let store = RelayStore::open(config, Arc::new(registry))
        .context("failed to open relay store")?;

    match cli.command {
        Commands::Query { filters } => {
            for event in store.query(&parse_filters(&filters)?)? {
                println!("{}", event.to_json()?);
            }
        }
        Commands::Count { filters } => {
            println!("{}", store.count(&parse_filters(&filters)?)?);
        }
        Commands::Get { id } => match store.get_event(&id)? {
            Some(event) => println!("{}", event.to_json()?),
            None => anyhow::bail!("event {} not found", id),
        },
        Commands::Import { path } => {
            let summary = import(&store, &path).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn parse_filters(raw: &[String]) -> Result<Vec<Filter>> {
    raw.iter()
        .map(|json| serde_json::from_str(json).with_context(|| format!("invalid filter {}", json)))
        .collect()
}

#[derive(Debug, Default, serde::Serialize)]
struct ImportSummary {
    admitted: u64,
    replaced: u64,
    duplicate: u64,
    superseded: u64,
    rejected: u64,
}

async fn import(store: &RelayStore, path: &Path) -> Result<ImportSummary> {
    let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut summary = ImportSummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let event = match Event::from_json(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!(line = index + 1, "Skipping unparseable event: {}", err);
                summary.rejected += 1;
                continue;
            }
        };

        match store.submit(event).await {
            Ok(Admission::Admitted) => summary.admitted += 1,
            Ok(Admission::Replaced { .. }) => summary.replaced += 1,
            Ok(Admission::Duplicate) => summary.duplicate += 1,
            Ok(Admission::Superseded { .. }) => summary.superseded += 1,
            Err(err) if err.is_retryable() => {
                return Err(err).with_context(|| format!("storage failure at line {}", index + 1));
            }
            Err(err) => {
                warn!(line = index + 1, "Rejected event: {}", err);
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}
