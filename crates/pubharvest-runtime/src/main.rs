//! pubharvest — incremental bibliographic harvester.
//! Entry point for the CLI binary.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pubharvest_common::net::GuardedClient;
use pubharvest_common::records::{AccessTier, ReviewStatus};
use pubharvest_common::Config;
use pubharvest_ingestion::acquire::AcquisitionChain;
use pubharvest_ingestion::run::{HarvestContext, RunController};
use pubharvest_ingestion::sources::entrez::EntrezClient;
use pubharvest_ingestion::sources::openaccess::OaClient;
use pubharvest_ingestion::tags::NgramSuggester;
use pubharvest_store::sqlite::SqliteStore;
use pubharvest_store::HarvestStore;

#[derive(Parser)]
#[command(name = "pubharvest")]
#[command(version, about = "Incremental bibliographic record and PDF harvester")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file path (default: pubharvest.toml, or PUBHARVEST_CONFIG)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one harvest sweep over the configured keywords
    Harvest {
        /// Override the per-keyword dispatch concurrency
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Create store partitions and indexes without running a sweep
    Init,
    /// Print store-level counts and the last completed run
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_directives = if cli.debug {
        "pubharvest=debug,debug"
    } else {
        "pubharvest=debug,info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directives)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let store = SqliteStore::open(&config.store.uri).await?;
    store.ensure_schema().await?;

    match cli.command {
        Commands::Init => {
            info!(uri = %config.store.uri, "Store schema and indexes ready");
            Ok(())
        }
        Commands::Stats => print_stats(&store).await,
        Commands::Harvest { workers } => run_harvest(config, store, workers).await,
    }
}

async fn run_harvest(
    mut config: Config,
    store: SqliteStore,
    workers: Option<usize>,
) -> Result<()> {
    if let Some(workers) = workers {
        config.harvest.workers = workers;
    }

    let client = GuardedClient::new()?;
    let source = Arc::new(EntrezClient::new(client.clone(), config.entrez.clone()));
    let resolver = Arc::new(OaClient::new(client.clone()));
    let chain = Arc::new(AcquisitionChain::new(
        client,
        resolver,
        config.harvest.pdf_dir.clone(),
    ));

    let controller = RunController::new(HarvestContext {
        config,
        store: Arc::new(store),
        source,
        chain,
        suggester: Arc::new(NgramSuggester::new()),
    });

    let summary = controller.execute().await?;

    println!("Run {} completed", summary.run_id);
    println!("  keywords:       {}", summary.keywords);
    println!("  processed:      {}", summary.articles_processed);
    println!("  skipped:        {}", summary.skipped);
    println!("  record errors:  {}", summary.record_errors);
    println!("  citation files: {}", summary.citation_files.len());
    match &summary.export_file {
        Some(path) => println!("  export:         {}", path.display()),
        None => println!("  export:         (nothing new this run)"),
    }
    Ok(())
}

async fn print_stats(store: &SqliteStore) -> Result<()> {
    let total = store.article_count().await?;
    let pending = store.count_by_review_status(ReviewStatus::Pending).await?;
    let approved = store.count_by_review_status(ReviewStatus::Approved).await?;
    let rejected = store.count_by_review_status(ReviewStatus::Rejected).await?;
    let free = store.count_by_access(AccessTier::Free).await?;
    let paid = store.count_by_access(AccessTier::Paid).await?;
    let with_pdf = store.count_with_pdf().await?;

    println!("articles:  {total}");
    println!("  pending:  {pending}");
    println!("  approved: {approved}");
    println!("  rejected: {rejected}");
    println!("access:");
    println!("  free:     {free}");
    println!("  paid:     {paid}");
    if total > 0 {
        println!(
            "pdfs:      {with_pdf} downloaded, {} missing ({:.1}%)",
            total - with_pdf,
            (with_pdf as f64 / total as f64) * 100.0
        );
    } else {
        println!("pdfs:      0 downloaded");
    }
    match store.last_completed_run().await? {
        Some(run) => {
            let end = run
                .end_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            println!(
                "last run:  {} ({} processed)",
                end, run.articles_processed
            );
        }
        None => println!("last run:  none"),
    }
    Ok(())
}
