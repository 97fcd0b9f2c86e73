use anyhow::{bail, Context};
use booking_scraper::ai::{build_artist_extractor, build_text_generator};
use booking_scraper::apis::factory::{create_adapter, supported_kinds};
use booking_scraper::config::Config;
use booking_scraper::constants::{DEFAULT_CONFIG_PATH, DEFAULT_STORE_PATH};
use booking_scraper::logging;
use booking_scraper::notify::build_notifier;
use booking_scraper::pipeline::{
    EventNormalizer, LocalIdentityIssuer, RunReport, RunStatus, ScrapeRunCoordinator,
};
use booking_scraper::storage::{InMemoryStorage, Storage};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "booking_scraper")]
#[command(about = "Venue event scraper that materializes performers, bookings and reviews")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one or more sources
    Run {
        /// Source ids to run (comma-separated); all configured sources when omitted
        #[arg(long)]
        source: Option<String>,
        /// List, extract and normalize without writing anything or notifying
        #[arg(long)]
        dry_run: bool,
        /// JSON snapshot the store is loaded from and saved back to
        #[arg(long, default_value = DEFAULT_STORE_PATH)]
        store: PathBuf,
    },
    /// Show the latest successful run of every configured source
    Latest {
        #[arg(long, default_value = DEFAULT_STORE_PATH)]
        store: PathBuf,
    },
    /// List configured sources
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Run {
            source,
            dry_run,
            store,
        } => run_sources(&config, source.as_deref(), dry_run, &store).await,
        Commands::Latest { store } => show_latest(&config, &store).await,
        Commands::Sources => {
            println!("📚 Configured sources:");
            for source in &config.sources {
                println!("   {} ({}) [{}] {}", source.id, source.name, source.kind, source.url);
            }
            println!("   adapter kinds: {}", supported_kinds().join(", "));
            Ok(())
        }
    }
}

async fn run_sources(
    config: &Config,
    source_list: Option<&str>,
    dry_run: bool,
    store_path: &Path,
) -> anyhow::Result<()> {
    let ids: Vec<String> = match source_list {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => config.sources.iter().map(|s| s.id.clone()).collect(),
    };
    if ids.is_empty() {
        bail!("no sources to run");
    }

    let store = Arc::new(InMemoryStorage::load_snapshot(store_path)?);
    let storage: Arc<dyn Storage> = store.clone();

    let normalizer = EventNormalizer::new(
        build_artist_extractor(&config.ai)?,
        Duration::from_secs(config.pipeline.nlu_timeout_secs),
    );
    let coordinator = ScrapeRunCoordinator::new(
        storage,
        normalizer,
        build_text_generator(&config.ai)?,
        Arc::new(LocalIdentityIssuer::new(&config.pipeline.identity_email_domain)),
        build_notifier(&config.notifications),
        config.pipeline.clone(),
    );

    if dry_run {
        println!("🧪 Dry run: nothing will be written");
    }

    let mut reports = Vec::new();
    for id in &ids {
        let Some(source) = config.source(id) else {
            println!("⚠️  Unknown source: {}", id);
            continue;
        };

        let adapter = match create_adapter(source) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!("Failed to build adapter for {}: {}", id, e);
                println!("❌ {}: {}", id, e);
                continue;
            }
        };

        let result = coordinator.run(source, adapter.as_ref(), !dry_run).await;
        if let Ok(outcome) = &result {
            println!("\n📊 Run results for {}:", source.name);
            println!("   Run id: {}", outcome.run_id);
            println!("   Candidates: {}", outcome.candidates);
            println!("   Produced: {}", outcome.produced);
            println!("   Rejected: {}", outcome.rejected);
            println!("   Failed: {}", outcome.failed);
            println!("   Bookings created: {}", outcome.bookings_created);
            println!("   Reviews created: {}", outcome.reviews_created);
            if !outcome.unresolved_artists.is_empty() {
                println!("\n⚠️  Unresolved artists:");
                for name in &outcome.unresolved_artists {
                    println!("   - {}", name);
                }
            }
            if !outcome.failed_artists.is_empty() {
                println!("\n❌ Bookings that failed to write:");
                for name in &outcome.failed_artists {
                    println!("   - {}", name);
                }
            }
        }
        reports.push(RunReport::from_result(id, &result));
    }

    if !dry_run {
        store.save_snapshot(store_path)?;
        info!("Saved store snapshot to {}", store_path.display());
    }

    println!("\n🏁 Summary:");
    for report in &reports {
        let icon = if report.status == RunStatus::Ok { "✅" } else { "❌" };
        println!("   {} {}: {} ({} events)", icon, report.source_id, report.status, report.produced);
    }
    Ok(())
}

async fn show_latest(config: &Config, store_path: &Path) -> anyhow::Result<()> {
    let store = InMemoryStorage::load_snapshot(store_path)?;
    println!("🕒 Latest successful runs:");
    for source in &config.sources {
        match store.get_latest_successful_run(&source.id).await? {
            Some(run) => {
                let results = store.get_scrape_results(&source.id, &run.id).await?;
                println!(
                    "   {}: {} started {} ({} events)",
                    source.id,
                    run.id,
                    run.start_time.to_rfc3339(),
                    results.len()
                );
            }
            None => println!("   {}: never", source.id),
        }
    }
    Ok(())
}
