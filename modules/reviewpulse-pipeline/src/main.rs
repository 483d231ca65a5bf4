use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use review_feed_client::ReviewFeedClient;
use reviewpulse_common::{Config, TopicRegistry};
use reviewpulse_pipeline::fetcher::{today_in, trailing_window};
use reviewpulse_pipeline::infra::{openai_from_config, OpenAiEmbedder, OpenAiGenerator};
use reviewpulse_pipeline::{
    BatchIngestor, FetchSettings, MemoryTopicRegistry, ReviewFetcher, TopicConsolidator,
    TopicExtractor, TopicPipeline,
};
use reviewpulse_store::{ProgressStore, ReviewStore, SqliteTopicRegistry};

#[derive(Parser)]
#[command(name = "reviewpulse", about = "Daily review ingestion and topic extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch recent reviews and store every unprocessed day.
    Ingest {
        /// Days to look back, today included.
        #[arg(long)]
        days: Option<u32>,
        /// Reviews kept per day.
        #[arg(long)]
        per_day: Option<usize>,
    },
    /// Extract and consolidate topics for stored days.
    Topics {
        #[arg(long)]
        days: Option<u32>,
        /// Re-extract days that already have topics.
        #[arg(long)]
        force: bool,
        /// Keep canonical topics in memory only for this run.
        #[arg(long)]
        ephemeral_registry: bool,
    },
    /// Show ingest progress.
    Status,
    /// Show stored review statistics.
    Stats,
    /// Write every stored review to a JSON-lines file.
    Export { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.log_redacted();

    let run_id = Uuid::new_v4();
    run(cli.command, config)
        .instrument(info_span!("run", %run_id))
        .await
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("reviewpulse=info".parse()?);

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Ingest { days, per_day } => {
            let days = days.unwrap_or(config.days_range);
            let per_day = per_day.unwrap_or(config.reviews_per_day);
            ingest(&config, days, per_day).await
        }
        Command::Topics {
            days,
            force,
            ephemeral_registry,
        } => {
            let days = days.unwrap_or(config.days_range);
            topics(&config, days, force, ephemeral_registry).await
        }
        Command::Status => status(&config),
        Command::Stats => stats(&config).await,
        Command::Export { path } => {
            let store = ReviewStore::connect(&config.database_url).await?;
            let count = store.export_jsonl(&path).await?;
            println!("Exported {count} reviews to {}", path.display());
            Ok(())
        }
    }
}

async fn ingest(config: &Config, days: u32, per_day: usize) -> Result<()> {
    info!(days, per_day, "Starting ingest run");

    let progress = ProgressStore::load(&config.progress_path)
        .context("progress file must be readable before ingesting")?;
    let store = ReviewStore::connect(&config.database_url).await?;

    let mut client = ReviewFeedClient::with_timeout(&config.feed_base_url, config.feed_timeout)?;
    if let Some(key) = &config.feed_api_key {
        client = client.with_api_key(key);
    }
    let fetcher = ReviewFetcher::new(Arc::new(client), FetchSettings::from_config(config)?);

    let mut ingestor = BatchIngestor::new(fetcher, Arc::new(store), progress);
    let summary = ingestor.run(days, per_day).await;
    println!("{summary}");
    Ok(())
}

async fn topics(config: &Config, days: u32, force: bool, ephemeral_registry: bool) -> Result<()> {
    if config.llm_api_key.is_empty() && config.llm_base_url.is_none() {
        anyhow::bail!("LLM_API_KEY (or OPENAI_API_KEY) or LLM_BASE_URL must be set");
    }

    let store = ReviewStore::connect(&config.database_url).await?;
    let registry: Arc<dyn TopicRegistry> = if ephemeral_registry {
        Arc::new(MemoryTopicRegistry::new())
    } else {
        Arc::new(SqliteTopicRegistry::load(store.pool().clone()).await?)
    };

    let ai = openai_from_config(config);
    let extractor = TopicExtractor::new(
        Arc::new(OpenAiGenerator::new(ai.clone())),
        config.extraction_chunk_size,
    );
    let consolidator = TopicConsolidator::new(
        Arc::new(OpenAiEmbedder::new(ai)),
        registry,
        config.similarity_threshold,
    );

    let window = trailing_window(today_in(config.feed_utc_offset()?), days);
    info!(days, force, "Starting topic run");

    let mut pipeline = TopicPipeline::new(store, extractor, consolidator, config.reviews_per_day);
    let summary = pipeline.run(&window, force).await;
    println!("{summary}");
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let progress = ProgressStore::load(&config.progress_path)?;
    let summary = progress.summary();

    println!("\n=== Ingest Progress ===");
    println!("Progress file:      {}", progress.path().display());
    println!("Days processed:     {}", summary.total_processed);
    println!("Total batches:      {}", summary.total_batches);
    match summary.last_processed_date {
        Some(date) => println!("Last processed:     {date}"),
        None => println!("Last processed:     never"),
    }
    for (date, stats) in &progress.state().batch_stats {
        println!(
            "  {date}: {} reviews at {}",
            stats.review_count,
            stats.processed_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let store = ReviewStore::connect(&config.database_url).await?;
    let stats = store.stats().await?;

    println!("\n=== Stored Reviews ===");
    println!("Total reviews:      {}", stats.total_reviews);
    println!("Batch dates:        {}", stats.total_batches);
    if let (Some(min), Some(max)) = (stats.min_date, stats.max_date) {
        println!("Date range:         {min} .. {max}");
    }
    for (app_id, count) in &stats.reviews_per_app {
        println!("  {app_id}: {count}");
    }
    Ok(())
}
