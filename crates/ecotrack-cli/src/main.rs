use anyhow::Result;
use clap::{Parser, Subcommand};
use ecotrack_ingest::{IngestRunSummary, SourceStatus};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ecotrack")]
#[command(about = "EcoTrack environmental indicator ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Print the run summary as JSON instead of one line per source.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch every configured source once and store new readings.
    Ingest,
    /// Create or upgrade the database schema and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Ingest) {
        Commands::Ingest => {
            let summary = ecotrack_ingest::run_ingest_once_from_env().await?;
            if cli.json {
                println!("{}", summary.to_json_pretty()?);
            } else {
                print_summary(&summary);
            }
        }
        Commands::Migrate => {
            ecotrack_ingest::migrate_from_env().await?;
            info!("migrations applied");
        }
    }

    Ok(())
}

fn print_summary(summary: &IngestRunSummary) {
    for zone in &summary.zones {
        for source in &zone.sources {
            let state = match &source.status {
                SourceStatus::Completed => "ok".to_string(),
                SourceStatus::Failed { error } => format!("failed ({error})"),
                SourceStatus::Skipped { reason } => format!("skipped ({reason})"),
            };
            println!(
                "{zone} {source_id}: {state} fetched={} rejected={} inserted={} duplicates={}",
                source.fetched,
                source.rejected,
                source.inserted,
                source.duplicates,
                zone = zone.zone_name,
                source_id = source.source_id,
            );
        }
    }
    println!(
        "ingest complete: run_id={} inserted={} duplicates={} failed_sources={}",
        summary.run_id,
        summary.inserted(),
        summary.duplicates(),
        summary.failed_sources()
    );
}
